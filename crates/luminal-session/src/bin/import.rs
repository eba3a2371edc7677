//! Bulk-load a backup produced by `luminal-export` into a (possibly fresh)
//! store, restoring both its chunks and its counter state so ids reserved
//! afterward never collide with the imported range.

use std::path::PathBuf;

use luminal_core::{ExportedStore, Storage};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: luminal-import <backup.json> <store.sqlite3>");
        std::process::exit(1);
    }

    let backup_path = PathBuf::from(&args[1]);
    let store_path = PathBuf::from(&args[2]);

    println!("Reading backup: {}", backup_path.display());
    let backup_content = std::fs::read_to_string(&backup_path)?;
    let export: ExportedStore = serde_json::from_str(&backup_content)?;
    println!("Found {} chunks to import", export.chunks.len());

    println!("Opening store: {}", store_path.display());
    let storage = Storage::open(&store_path)?;

    let chunk_count = export.chunks.len();
    storage.import_all(&export)?;

    println!("Imported {} chunks, counter advanced to position {}", chunk_count, export.counter_state.next_position);
    Ok(())
}
