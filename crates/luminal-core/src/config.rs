//! Engine configuration: plain structs with `Default` impls. No external
//! config-file parser — loading from TOML/env is a caller concern outside
//! this crate's scope.

/// Aggregation policy across layers and heads for one attention step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationPolicy {
    #[default]
    Mean,
    Max,
    LastLayer,
    WeightedLayers,
}

/// How brightness accumulates across generation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreMode {
    #[default]
    Cumulative,
    Voting,
}

/// Decay applied in cumulative mode after each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecayMode {
    Additive,
    Exponential,
    #[default]
    None,
}

/// How weight falls off with distance from the generation head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMode {
    None,
    #[default]
    Threshold,
    Linear,
    Logarithmic,
    SquareRoot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrightnessConfig {
    pub mode: ScoreMode,
    pub aggregation: AggregationPolicy,
    pub decay_rate: f64,
    pub decay_mode: DecayMode,
    pub distance_mode: DistanceMode,
    pub min_distance: usize,
    pub distance_scale: f64,
    pub initial_floor: f64,
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self {
            mode: ScoreMode::default(),
            aggregation: AggregationPolicy::default(),
            decay_rate: 0.01,
            decay_mode: DecayMode::default(),
            distance_mode: DistanceMode::default(),
            min_distance: 4,
            distance_scale: 1.0,
            initial_floor: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionConfig {
    pub enabled: bool,
    pub min_inactivity_ms: u64,
    pub min_messages: u32,
    pub max_tokens: u32,
    pub prompt: String,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_inactivity_ms: 5 * 60 * 1000,
            min_messages: 5,
            max_tokens: 256,
            prompt: "Write a concise summary of the current context".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResurrectionConfig {
    pub top_k: usize,
}

impl Default for ResurrectionConfig {
    fn default() -> Self {
        Self { top_k: 32 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub model_tag: String,
    pub dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_tag: "hash-embedder-v1-384d".to_string(),
            dim: 384,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub context_limit: usize,
    pub max_generation: usize,
    pub overhead: usize,
    pub safety_margin: usize,
    pub brightness: BrightnessConfig,
    pub reflection: ReflectionConfig,
    pub resurrection: ResurrectionConfig,
    pub embedding: EmbeddingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context_limit: 32_000,
            max_generation: 1_024,
            overhead: 64,
            safety_margin: 32,
            brightness: BrightnessConfig::default(),
            reflection: ReflectionConfig::default(),
            resurrection: ResurrectionConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}
