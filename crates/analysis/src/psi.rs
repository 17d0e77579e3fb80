//! The Streaming Analyzer (§4.9): incremental per-turn state over the
//! accumulated `(texts, agents, embeddings)` of a session.

use std::collections::HashMap;

use circle_domain::model::{BasinHistory, BasinLabel, Psi, TrajectoryBuffer};

use crate::affective::{affective_substrate, hedging_density};
use crate::basins::{self, CoherencePattern, DialogueContext};
use crate::metrics::{coefficient_of_variation, dfa_alpha, entropy_shift, local_curvature_mean, semantic_velocity, variance};

/// Size of the rolling window used for the window-local `(Δκ, ΔH, α)` trail
/// (§4.9 step 1).
pub const ROLLING_WINDOW: usize = 5;

/// Reference centers and scales for standardizing `(Δκ, ΔH, α)` into
/// `psi_semantic` (§4.9 step 3).
const PSI_SEMANTIC_CENTERS: (f64, f64, f64) = (0.15, 0.15, 0.8);
const PSI_SEMANTIC_SCALES: (f64, f64, f64) = (0.15, 0.15, 0.3);

#[derive(Debug, Clone, Copy, Default)]
pub struct RawMetrics {
    pub delta_kappa: f64,
    pub delta_h: f64,
    pub alpha: f64,
}

/// Full per-turn output of the Streaming Analyzer, matching the `metrics`
/// wire event's inner fields (§6.2) plus the trajectory derivatives used
/// only internally.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct TurnState {
    pub turn_number: u64,
    pub basin: BasinLabel,
    pub basin_confidence: f64,
    pub psi: Psi,
    pub voice_distinctiveness: f64,
    pub velocity_magnitude: Option<f64>,
}

/// Owns the rolling window trail and the Ψ trajectory ring buffer across a
/// session's turns. One instance per session, held by the generation loop
/// alongside the `SessionLog` (§3: arena+index ring, not a pointer chain).
pub struct StreamingAnalyzer {
    window_metrics: Vec<RawMetrics>,
    trajectory: TrajectoryBuffer,
    seed: u64,
}

impl StreamingAnalyzer {
    pub fn new(trajectory_capacity: usize, seed: u64) -> Self {
        Self {
            window_metrics: Vec::new(),
            trajectory: TrajectoryBuffer::new(trajectory_capacity),
            seed,
        }
    }

    fn current_metrics(&self, embeddings: &[Vec<f32>]) -> RawMetrics {
        if embeddings.len() < 4 {
            return RawMetrics { delta_kappa: 0.0, delta_h: 0.0, alpha: 0.5 };
        }
        let delta_kappa = local_curvature_mean(embeddings).unwrap_or(0.0);
        let mid = embeddings.len() / 2;
        let delta_h = entropy_shift(&embeddings[..mid], &embeddings[mid..], self.seed);
        let velocities = semantic_velocity(embeddings);
        let (alpha, _) = dfa_alpha(&velocities);
        RawMetrics { delta_kappa, delta_h, alpha }
    }

    fn psi_semantic(metrics: RawMetrics) -> f64 {
        let std_kappa = (metrics.delta_kappa - PSI_SEMANTIC_CENTERS.0) / PSI_SEMANTIC_SCALES.0;
        let std_h = (metrics.delta_h - PSI_SEMANTIC_CENTERS.1) / PSI_SEMANTIC_SCALES.1;
        let std_alpha = (metrics.alpha - PSI_SEMANTIC_CENTERS.2) / PSI_SEMANTIC_SCALES.2;
        let weight = 1.0 / 3f64.sqrt();
        (weight * (std_kappa + std_h + std_alpha)).tanh()
    }

    fn psi_temporal(&self) -> f64 {
        if self.window_metrics.len() < 3 {
            return 0.5;
        }
        let trail: Vec<f64> = self.window_metrics.iter().map(|m| m.delta_kappa).collect();
        1.0 / (1.0 + coefficient_of_variation(&trail))
    }

    /// Processes the latest turn given the full accumulated history.
    /// `texts`/`agents`/`embeddings` must be the same length and ordered by
    /// turn number; `texts[i]`/`agents[i]` are the speaker and content of
    /// the turn whose embedding is `embeddings[i]`.
    pub fn process_turn(
        &mut self,
        turn_number: u64,
        texts: &[String],
        agents: &[String],
        embeddings: &[Vec<f32>],
        basin_history: &mut BasinHistory,
    ) -> TurnState {
        if embeddings.len() >= ROLLING_WINDOW {
            let window = &embeddings[embeddings.len() - ROLLING_WINDOW..];
            self.window_metrics.push(self.current_metrics(window));
        }

        let raw = self.current_metrics(embeddings);
        let psi_semantic = Self::psi_semantic(raw);
        let psi_temporal = self.psi_temporal();
        let psi_affective = affective_substrate(texts);
        let psi = Psi { semantic: psi_semantic, temporal: psi_temporal, affective: psi_affective };

        let ctx = self.dialogue_context(texts, agents, embeddings);
        let (basin, basin_confidence) = basins::classify(turn_number, psi, raw.delta_kappa, &ctx, basin_history);
        basin_history.push(turn_number, basin, basin_confidence);

        self.trajectory.push(psi);
        let velocity_magnitude = self.trajectory_speed();

        TurnState {
            turn_number,
            basin,
            basin_confidence,
            psi,
            voice_distinctiveness: ctx.voice_distinctiveness,
            velocity_magnitude,
        }
    }

    fn trajectory_speed(&self) -> Option<f64> {
        let points = self.trajectory.as_slice_vec();
        if points.len() < 2 {
            return None;
        }
        let a = points[points.len() - 2];
        let b = points[points.len() - 1];
        let dv = [b.semantic - a.semantic, b.temporal - a.temporal, b.affective - a.affective];
        Some((dv[0] * dv[0] + dv[1] * dv[1] + dv[2] * dv[2]).sqrt())
    }

    /// Acceleration magnitude and local curvature of the Ψ trajectory
    /// (§4.9 step 6); `None` until the ring buffer holds at least 3 points.
    pub fn trajectory_acceleration_and_curvature(&self) -> Option<(f64, f64)> {
        let points = self.trajectory.as_slice_vec();
        if points.len() < 3 {
            return None;
        }
        let n = points.len();
        let v = |i: usize| {
            [
                points[i + 1].semantic - points[i].semantic,
                points[i + 1].temporal - points[i].temporal,
                points[i + 1].affective - points[i].affective,
            ]
        };
        let v_prev = v(n - 3);
        let v_curr = v(n - 2);
        let a = [v_curr[0] - v_prev[0], v_curr[1] - v_prev[1], v_curr[2] - v_prev[2]];
        let norm = |x: &[f64; 3]| (x[0] * x[0] + x[1] * x[1] + x[2] * x[2]).sqrt();
        let v_norm = norm(&v_curr);
        let accel_mag = norm(&a);
        if v_norm <= 1e-12 {
            return Some((accel_mag, 0.0));
        }
        let v_unit = [v_curr[0] / v_norm, v_curr[1] / v_norm, v_curr[2] / v_norm];
        let proj = a[0] * v_unit[0] + a[1] * v_unit[1] + a[2] * v_unit[2];
        let a_perp = [a[0] - proj * v_unit[0], a[1] - proj * v_unit[1], a[2] - proj * v_unit[2]];
        let kappa = norm(&a_perp) / (v_norm * v_norm);
        Some((accel_mag, kappa))
    }

    fn dialogue_context(&self, texts: &[String], agents: &[String], embeddings: &[Vec<f32>]) -> DialogueContext {
        let hedging = hedging_density(texts);
        let turn_length_variance = per_agent_mean_word_count_variance(texts, agents);
        let delta_kappa_variance = {
            let trail: Vec<f64> = self.window_metrics.iter().map(|m| m.delta_kappa).collect();
            variance(&trail)
        };
        let voice_distinctiveness = voice_distinctiveness(agents, embeddings);
        let coherence_pattern = self.coherence_pattern(embeddings);

        DialogueContext {
            hedging_density: hedging,
            turn_length_variance,
            delta_kappa_variance,
            voice_distinctiveness,
            coherence_pattern,
        }
    }

    fn coherence_pattern(&self, embeddings: &[Vec<f32>]) -> CoherencePattern {
        let velocity = semantic_velocity(embeddings);
        let ac1 = lag1_autocorrelation(&velocity);
        let velocity_variance = variance(&velocity);
        CoherencePattern::classify(ac1, velocity_variance)
    }

    /// The coherence pattern classified for the current embedding trail
    /// (§4.9 step 4), exposed so callers accumulating a
    /// `coherence_pattern_distribution` for the offline summarizer (§4.12)
    /// don't need to duplicate the autocorrelation/variance computation.
    pub fn current_coherence_pattern(&self, embeddings: &[Vec<f32>]) -> CoherencePattern {
        self.coherence_pattern(embeddings)
    }
}

fn lag1_autocorrelation(series: &[f64]) -> f64 {
    if series.len() < 3 {
        return 0.0;
    }
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..series.len() - 1 {
        num += (series[i] - mean) * (series[i + 1] - mean);
    }
    for v in series {
        den += (v - mean) * (v - mean);
    }
    if den.abs() < 1e-12 {
        0.0
    } else {
        num / den
    }
}

fn per_agent_mean_word_count_variance(texts: &[String], agents: &[String]) -> f64 {
    let mut totals: HashMap<&str, (usize, usize)> = HashMap::new();
    for (text, agent) in texts.iter().zip(agents.iter()) {
        let entry = totals.entry(agent.as_str()).or_insert((0, 0));
        entry.0 += text.split_whitespace().count();
        entry.1 += 1;
    }
    let means: Vec<f64> = totals.values().map(|(sum, n)| *sum as f64 / (*n).max(1) as f64).collect();
    variance(&means)
}

pub(crate) fn voice_distinctiveness(agents: &[String], embeddings: &[Vec<f32>]) -> f64 {
    let mut sums: HashMap<&str, (Vec<f64>, usize)> = HashMap::new();
    for (agent, emb) in agents.iter().zip(embeddings.iter()) {
        let entry = sums.entry(agent.as_str()).or_insert_with(|| (vec![0.0; emb.len()], 0));
        for (i, v) in emb.iter().enumerate() {
            entry.0[i] += *v as f64;
        }
        entry.1 += 1;
    }
    let means: Vec<Vec<f64>> = sums
        .values()
        .map(|(sum, n)| sum.iter().map(|x| x / (*n).max(1) as f64).collect())
        .collect();

    if means.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..means.len() {
        for j in (i + 1)..means.len() {
            let dot: f64 = means[i].iter().zip(means[j].iter()).map(|(a, b)| a * b).sum();
            let na: f64 = means[i].iter().map(|x| x * x).sum::<f64>().sqrt();
            let nb: f64 = means[j].iter().map(|x| x * x).sum::<f64>().sqrt();
            let cosine_distance = if na <= 1e-12 || nb <= 1e-12 { 1.0 } else { 1.0 - dot / (na * nb) };
            total += cosine_distance;
            pairs += 1;
        }
    }
    total / pairs.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let n: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / n).collect()
    }

    #[test]
    fn process_turn_populates_basin_history() {
        let mut analyzer = StreamingAnalyzer::new(ROLLING_WINDOW, 7);
        let mut history = BasinHistory::default();
        let texts: Vec<String> = (0..5).map(|i| format!("Turn {i} says something plain.")).collect();
        let agents: Vec<String> = vec!["a".into(), "b".into(), "a".into(), "b".into(), "a".into()];
        let embeddings: Vec<Vec<f32>> = (0..5).map(|i| unit(vec![i as f32 + 1.0, 1.0, 0.5])).collect();

        let state = analyzer.process_turn(5, &texts, &agents, &embeddings, &mut history);
        assert_eq!(state.turn_number, 5);
        assert!((0.0..=1.0).contains(&state.basin_confidence));
        assert_eq!(history.entries.len(), 1);
    }

    #[test]
    fn trajectory_speed_requires_two_points() {
        let analyzer = StreamingAnalyzer::new(ROLLING_WINDOW, 1);
        assert!(analyzer.trajectory_speed().is_none());
    }

    #[test]
    fn voice_distinctiveness_is_zero_for_single_agent() {
        let agents = vec!["a".to_string(), "a".to_string()];
        let embeddings = vec![unit(vec![1.0, 0.0]), unit(vec![0.0, 1.0])];
        assert_eq!(voice_distinctiveness(&agents, &embeddings), 0.0);
    }
}
