//! Brightness Scorer: converts per-token attention streams into durable
//! importance scores. Stateless over tokens — it reads and
//! writes `Token::brightness` in place on whatever slice the Working Set
//! hands it; the Working Set alone owns the token sequence.

use crate::config::{AggregationPolicy, BrightnessConfig, DecayMode, DistanceMode, ScoreMode};
use crate::types::{Token, TurnId};

/// One generation step's attention tensor, shaped `[layers][heads][context_length]`.
#[derive(Debug, Clone)]
pub struct AttentionStep {
    pub layers: Vec<Vec<Vec<f32>>>,
}

impl AttentionStep {
    pub fn new(layers: Vec<Vec<Vec<f32>>>) -> Self {
        Self { layers }
    }

    fn context_len(&self) -> usize {
        self.layers
            .first()
            .and_then(|heads| heads.first())
            .map(|ctx| ctx.len())
            .unwrap_or(0)
    }

    /// Collapse `[L][H][C]` to a single `[C]` vector per the configured policy.
    fn aggregate(&self, policy: AggregationPolicy) -> Vec<f32> {
        let c = self.context_len();
        if c == 0 || self.layers.is_empty() {
            return Vec::new();
        }

        match policy {
            AggregationPolicy::LastLayer => {
                let last = self.layers.last().expect("non-empty layers");
                mean_over_heads(last, c)
            }
            AggregationPolicy::Mean => {
                let mut acc = vec![0.0f32; c];
                for layer in &self.layers {
                    let per_layer = mean_over_heads(layer, c);
                    for (a, v) in acc.iter_mut().zip(per_layer.iter()) {
                        *a += v;
                    }
                }
                let n = self.layers.len() as f32;
                acc.iter_mut().for_each(|v| *v /= n);
                acc
            }
            AggregationPolicy::Max => {
                let mut acc = vec![f32::MIN; c];
                for layer in &self.layers {
                    for head in layer {
                        for (a, v) in acc.iter_mut().zip(head.iter()) {
                            *a = a.max(*v);
                        }
                    }
                }
                acc
            }
            AggregationPolicy::WeightedLayers => {
                let l = self.layers.len() as f32;
                let weight_sum: f32 = (1..=self.layers.len()).map(|i| i as f32).sum();
                let mut acc = vec![0.0f32; c];
                for (idx, layer) in self.layers.iter().enumerate() {
                    let layer_weight = (idx as f32 + 1.0) / weight_sum.max(1.0) * l / l;
                    let per_layer = mean_over_heads(layer, c);
                    for (a, v) in acc.iter_mut().zip(per_layer.iter()) {
                        *a += v * layer_weight;
                    }
                }
                acc
            }
        }
    }
}

fn mean_over_heads(layer: &[Vec<f32>], c: usize) -> Vec<f32> {
    if layer.is_empty() {
        return vec![0.0; c];
    }
    let mut acc = vec![0.0f32; c];
    for head in layer {
        for (a, v) in acc.iter_mut().zip(head.iter()) {
            *a += v;
        }
    }
    let n = layer.len() as f32;
    acc.iter_mut().for_each(|v| *v /= n);
    acc
}

/// Converts per-token attention into durable brightness, per the
/// configured aggregation/distance/score modes.
#[derive(Debug, Clone)]
pub struct BrightnessScorer {
    config: BrightnessConfig,
}

impl BrightnessScorer {
    pub fn new(config: BrightnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrightnessConfig {
        &self.config
    }

    /// Weight for a token at index distance `d ≥ 1` from the generation head.
    fn distance_weight(&self, d: usize) -> f64 {
        let d = d as f64;
        let min_d = self.config.min_distance as f64;
        match self.config.distance_mode {
            DistanceMode::None => 1.0,
            DistanceMode::Threshold => {
                if d < min_d {
                    0.0
                } else {
                    1.0
                }
            }
            DistanceMode::Linear => {
                if d < min_d {
                    0.0
                } else {
                    ((d - min_d + 1.0) * self.config.distance_scale).min(1.0)
                }
            }
            DistanceMode::Logarithmic => {
                if d < min_d {
                    0.0
                } else {
                    ((d - min_d + 1.0).ln().max(0.0) * self.config.distance_scale).min(1.0)
                }
            }
            DistanceMode::SquareRoot => {
                if d < min_d {
                    0.0
                } else {
                    ((d - min_d + 1.0).sqrt() * self.config.distance_scale).min(1.0)
                }
            }
        }
    }

    /// Initial brightness for a freshly admitted token.
    pub fn initial_brightness(&self, mean_brightness: f64) -> f64 {
        self.config.initial_floor.max(mean_brightness)
    }

    /// Initial brightness for a resurrected token, respecting earned
    /// reputation from before it was pruned.
    pub fn resurrection_brightness(&self, mean_brightness: f64, brightness_at_deletion: Option<f64>) -> f64 {
        let mut floor = self.config.initial_floor.max(mean_brightness);
        if let Some(prior) = brightness_at_deletion {
            floor = floor.max(prior);
        }
        floor
    }

    /// Apply one generation step's attention tensor to `tokens`, which must
    /// be aligned 1:1 with the attention context (`tokens.len() ==
    /// attention context_length`). Tokens belonging to `current_turn`
    /// (the turn currently being generated) are immune.
    pub fn apply_step(&self, tokens: &mut [Token], step: &AttentionStep, current_turn: TurnId) {
        let aggregate = step.aggregate(self.config.aggregation);
        let c = tokens.len();
        if aggregate.len() != c || c == 0 {
            return;
        }

        let eligible: Vec<bool> = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| {
                if t.turn_id == current_turn {
                    return false;
                }
                let distance = c - i;
                self.distance_weight(distance) > 0.0
            })
            .collect();

        match self.config.mode {
            ScoreMode::Cumulative => {
                for (i, token) in tokens.iter_mut().enumerate() {
                    if !eligible[i] {
                        continue;
                    }
                    let distance = c - i;
                    let w = self.distance_weight(distance);
                    let contribution = aggregate[i] as f64 * w;
                    match self.config.decay_mode {
                        DecayMode::Additive => {
                            token.brightness += contribution - self.config.decay_rate;
                        }
                        DecayMode::Exponential => {
                            token.brightness =
                                token.brightness * (1.0 - self.config.decay_rate) + contribution;
                        }
                        DecayMode::None => {
                            token.brightness += contribution;
                        }
                    }
                }
            }
            ScoreMode::Voting => {
                let eligible_values: Vec<f32> = aggregate
                    .iter()
                    .zip(eligible.iter())
                    .filter_map(|(v, e)| e.then_some(*v))
                    .collect();
                if eligible_values.is_empty() {
                    return;
                }
                let mean = eligible_values.iter().sum::<f32>() / eligible_values.len() as f32;
                for (i, token) in tokens.iter_mut().enumerate() {
                    if eligible[i] && aggregate[i] > mean {
                        token.brightness += 1.0;
                    }
                }
            }
        }
    }

    /// Max brightness among a sentence's tokens.
    pub fn peak(tokens: &[Token]) -> f64 {
        tokens.iter().map(|t| t.brightness).fold(f64::MIN, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, Role};

    fn token(pos: u128, turn: u128, brightness: f64) -> Token {
        let mut t = Token::new(Position(pos), 1, "x", TurnId(turn), 0, Role::Assistant, 0.0);
        t.brightness = brightness;
        t
    }

    fn uniform_step(c: usize, value: f32) -> AttentionStep {
        AttentionStep::new(vec![vec![vec![value; c]]])
    }

    #[test]
    fn current_turn_tokens_are_immune() {
        let scorer = BrightnessScorer::new(BrightnessConfig {
            min_distance: 0,
            distance_mode: DistanceMode::None,
            ..BrightnessConfig::default()
        });
        let mut tokens = vec![token(0, 1, 0.0), token(1, 2, 0.0)];
        let current_turn = TurnId(2);
        scorer.apply_step(&mut tokens, &uniform_step(2, 1.0), current_turn);
        assert!(tokens[0].brightness > 0.0);
        assert_eq!(tokens[1].brightness, 0.0);
    }

    #[test]
    fn threshold_distance_zeroes_nearby_tokens() {
        let scorer = BrightnessScorer::new(BrightnessConfig {
            min_distance: 3,
            distance_mode: DistanceMode::Threshold,
            decay_mode: DecayMode::None,
            ..BrightnessConfig::default()
        });
        let mut tokens = vec![token(0, 1, 0.0), token(1, 1, 0.0), token(2, 1, 0.0)];
        scorer.apply_step(&mut tokens, &uniform_step(3, 1.0), TurnId(99));
        // distances are 3, 2, 1 -> only index 0 (distance 3) passes min_distance=3
        assert!(tokens[0].brightness > 0.0);
        assert_eq!(tokens[1].brightness, 0.0);
        assert_eq!(tokens[2].brightness, 0.0);
    }

    #[test]
    fn voting_mode_rewards_above_mean_tokens() {
        let scorer = BrightnessScorer::new(BrightnessConfig {
            mode: ScoreMode::Voting,
            min_distance: 0,
            distance_mode: DistanceMode::None,
            ..BrightnessConfig::default()
        });
        let mut tokens = vec![token(0, 1, 0.0), token(1, 1, 0.0)];
        let step = AttentionStep::new(vec![vec![vec![0.1, 0.9]]]);
        scorer.apply_step(&mut tokens, &step, TurnId(99));
        assert_eq!(tokens[0].brightness, 0.0);
        assert_eq!(tokens[1].brightness, 1.0);
    }

    #[test]
    fn initial_brightness_respects_floor_and_mean() {
        let scorer = BrightnessScorer::new(BrightnessConfig {
            initial_floor: 0.1,
            ..BrightnessConfig::default()
        });
        assert_eq!(scorer.initial_brightness(0.02), 0.1);
        assert_eq!(scorer.initial_brightness(0.5), 0.5);
    }

    #[test]
    fn resurrection_brightness_respects_prior_reputation() {
        let scorer = BrightnessScorer::new(BrightnessConfig {
            initial_floor: 0.1,
            ..BrightnessConfig::default()
        });
        assert_eq!(scorer.resurrection_brightness(0.05, Some(0.8)), 0.8);
        assert_eq!(scorer.resurrection_brightness(0.05, None), 0.1);
    }

    #[test]
    fn peak_returns_max_brightness() {
        let tokens = vec![token(0, 1, 0.2), token(1, 1, 0.9), token(2, 1, 0.5)];
        assert_eq!(BrightnessScorer::peak(&tokens), 0.9);
    }
}
