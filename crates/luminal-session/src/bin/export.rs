//! Export every chunk (including soft-deleted ones) from a store to a JSON
//! file, for backup or migration.

use std::path::PathBuf;

use luminal_core::Storage;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: luminal-export <store.sqlite3> <output.json>");
        std::process::exit(1);
    }

    let store_path = PathBuf::from(&args[1]);
    let output_path = PathBuf::from(&args[2]);

    println!("Opening store: {}", store_path.display());
    let storage = Storage::open(&store_path)?;

    let export = storage.export_all()?;
    println!(
        "Exporting {} chunks, counter at position {} / turn {}",
        export.chunks.len(),
        export.counter_state.next_position,
        export.counter_state.next_turn
    );

    let json = serde_json::to_string_pretty(&export)?;
    std::fs::write(&output_path, json)?;

    println!("Wrote {}", output_path.display());
    Ok(())
}
