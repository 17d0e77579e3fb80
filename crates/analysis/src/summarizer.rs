//! Offline Session Summarizer (§4.12): whole-session aggregates plus
//! optional bootstrap confidence intervals over the full embedding
//! trajectory, run once after a session ends.

use std::collections::HashMap;

use circle_domain::model::{BasinHistory, BasinLabel};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::basins::CoherencePattern;
use crate::metrics::{
    dfa_alpha, entropy_shift, local_curvatures, norm, semantic_velocity, sub, to_f64, variance,
};

const DELTA_KAPPA_THRESHOLD: f64 = 0.35;
const ALPHA_RANGE: (f64, f64) = (0.70, 0.90);
const DELTA_H_THRESHOLD: f64 = 0.12;

/// High/low-integrity basin groupings used to compute `integrity_score`.
/// Not specified by a formula upstream; resolved by analogy to the
/// explicitly-specified inquiry-vs-mimicry ratio (see DESIGN.md).
const HIGH_INTEGRITY_BASINS: [BasinLabel; 4] = [
    BasinLabel::DeepResonance,
    BasinLabel::CollaborativeInquiry,
    BasinLabel::GenerativeConflict,
    BasinLabel::CreativeDilation,
];
const LOW_INTEGRITY_BASINS: [BasinLabel; 4] = [
    BasinLabel::CognitiveMimicry,
    BasinLabel::ReflexivePerformance,
    BasinLabel::SycophanticConvergence,
    BasinLabel::Dissociation,
];

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Interval {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConfidenceIntervals {
    pub delta_kappa: Interval,
    pub alpha: Interval,
    pub delta_h: Interval,
    pub delta_kappa_p_value: f64,
    pub alpha_r_squared: f64,
    pub delta_h_stability: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ThresholdFlags {
    pub delta_kappa_high: bool,
    pub alpha_in_range: bool,
    pub delta_h_high: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub delta_kappa: f64,
    pub alpha: f64,
    pub delta_h: f64,
    pub velocity_mean: f64,
    pub velocity_variance: f64,
    pub path_length: f64,
    pub displacement: f64,
    pub tortuosity: f64,
    pub integrity_score: f64,
    pub integrity_label: String,
    pub basin_distribution: HashMap<String, u64>,
    pub dominant_basin: Option<BasinLabel>,
    pub dominant_basin_percentage: f64,
    pub transition_count: u64,
    pub voice_distinctiveness: f64,
    pub coherence_pattern_distribution: HashMap<String, u64>,
    pub inquiry_mimicry_ratio: f64,
    pub threshold_flags: ThresholdFlags,
    pub confidence_intervals: Option<ConfidenceIntervals>,
}

fn coherence_label(pattern: CoherencePattern) -> &'static str {
    match pattern {
        CoherencePattern::Breathing => "breathing",
        CoherencePattern::Locked => "locked",
        CoherencePattern::Fragmented => "fragmented",
        CoherencePattern::Transitional => "transitional",
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn bootstrap_ci<F>(resamples: usize, sample_len: usize, rng: &mut ChaCha8Rng, statistic: F) -> Interval
where
    F: Fn(&[usize]) -> Option<f64>,
{
    if sample_len == 0 {
        return Interval::default();
    }
    let mut values = Vec::with_capacity(resamples);
    for _ in 0..resamples {
        let indices: Vec<usize> = (0..sample_len).map(|_| rng.gen_range(0..sample_len)).collect();
        if let Some(v) = statistic(&indices) {
            values.push(v);
        }
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Interval { low: percentile(&values, 0.025), high: percentile(&values, 0.975) }
}

fn path_length_and_displacement(embeddings: &[Vec<f32>]) -> (f64, f64) {
    if embeddings.len() < 2 {
        return (0.0, 0.0);
    }
    let es: Vec<Vec<f64>> = embeddings.iter().map(|e| to_f64(e)).collect();
    let path_length: f64 = es.windows(2).map(|w| norm(&sub(&w[1], &w[0]))).sum();
    let displacement = norm(&sub(&es[es.len() - 1], &es[0]));
    (path_length, displacement)
}

/// Computes the offline session summary (§4.12). `coherence_patterns` and
/// `basin_history` are the full per-turn streams accumulated during the
/// session; `agents`/`embeddings` are aligned by index.
pub fn summarize(
    embeddings: &[Vec<f32>],
    agents: &[String],
    basin_history: &BasinHistory,
    coherence_patterns: &[CoherencePattern],
    seed: u64,
    compute_ci: bool,
    bootstrap_resamples: usize,
    permutations: usize,
) -> SessionSummary {
    let n_turns = basin_history.entries.len().max(embeddings.len()).max(1);

    let delta_kappa = local_curvatures(embeddings).map(|k| mean(&k)).unwrap_or(0.0);
    let velocities = semantic_velocity(embeddings);
    let (alpha, alpha_r_squared) = dfa_alpha(&velocities);
    let mid = embeddings.len() / 2;
    let delta_h = if embeddings.len() >= 4 {
        entropy_shift(&embeddings[..mid], &embeddings[mid..], seed)
    } else {
        0.0
    };

    let velocity_mean = mean(&velocities);
    let velocity_variance = variance(&velocities);
    let (path_length, displacement) = path_length_and_displacement(embeddings);
    let tortuosity = if displacement > 1e-9 { path_length / displacement } else { 0.0 };

    let mut basin_distribution: HashMap<String, u64> = HashMap::new();
    let mut high_count = 0u64;
    let mut low_count = 0u64;
    let mut inquiry_count = 0u64;
    let mut mimicry_count = 0u64;
    for entry in &basin_history.entries {
        *basin_distribution.entry(entry.label.as_str().to_string()).or_insert(0) += 1;
        if HIGH_INTEGRITY_BASINS.contains(&entry.label) {
            high_count += 1;
        }
        if LOW_INTEGRITY_BASINS.contains(&entry.label) {
            low_count += 1;
        }
        if entry.label.as_str() == BasinLabel::CollaborativeInquiry.as_str() {
            inquiry_count += 1;
        }
        if entry.label.as_str() == BasinLabel::CognitiveMimicry.as_str() {
            mimicry_count += 1;
        }
    }

    let (dominant_basin, dominant_count) = basin_distribution
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(label, count)| (label_from_str(label), *count))
        .unwrap_or((None, 0));
    let dominant_basin_percentage = dominant_count as f64 / n_turns as f64;

    let integrity_score = if high_count + low_count > 0 {
        high_count as f64 / (high_count + low_count) as f64
    } else {
        0.5
    };
    let integrity_label = if integrity_score >= 0.7 {
        "high"
    } else if integrity_score >= 0.4 {
        "moderate"
    } else {
        "low"
    }
    .to_string();

    let inquiry_mimicry_ratio = if inquiry_count + mimicry_count > 0 {
        inquiry_count as f64 / (inquiry_count + mimicry_count) as f64
    } else {
        0.5
    };

    let voice_distinctiveness = crate::psi::voice_distinctiveness(agents, embeddings);

    let mut coherence_pattern_distribution: HashMap<String, u64> = HashMap::new();
    for pattern in coherence_patterns {
        *coherence_pattern_distribution.entry(coherence_label(*pattern).to_string()).or_insert(0) += 1;
    }

    let threshold_flags = ThresholdFlags {
        delta_kappa_high: delta_kappa >= DELTA_KAPPA_THRESHOLD,
        alpha_in_range: alpha >= ALPHA_RANGE.0 && alpha <= ALPHA_RANGE.1,
        delta_h_high: delta_h >= DELTA_H_THRESHOLD,
    };

    let confidence_intervals = if compute_ci {
        Some(compute_confidence_intervals(
            embeddings,
            &velocities,
            delta_kappa,
            alpha_r_squared,
            seed,
            bootstrap_resamples,
            permutations,
        ))
    } else {
        None
    };

    SessionSummary {
        delta_kappa,
        alpha,
        delta_h,
        velocity_mean,
        velocity_variance,
        path_length,
        displacement,
        tortuosity,
        integrity_score,
        integrity_label,
        basin_distribution,
        dominant_basin,
        dominant_basin_percentage,
        transition_count: basin_history.transition_count,
        voice_distinctiveness,
        coherence_pattern_distribution,
        inquiry_mimicry_ratio,
        threshold_flags,
        confidence_intervals,
    }
}

fn label_from_str(s: &str) -> Option<BasinLabel> {
    [
        BasinLabel::DeepResonance,
        BasinLabel::CollaborativeInquiry,
        BasinLabel::CognitiveMimicry,
        BasinLabel::ReflexivePerformance,
        BasinLabel::SycophanticConvergence,
        BasinLabel::CreativeDilation,
        BasinLabel::GenerativeConflict,
        BasinLabel::Dissociation,
        BasinLabel::Transitional,
    ]
    .into_iter()
    .find(|l| l.as_str() == s)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[allow(clippy::too_many_arguments)]
fn compute_confidence_intervals(
    embeddings: &[Vec<f32>],
    velocities: &[f64],
    observed_delta_kappa: f64,
    alpha_r_squared: f64,
    seed: u64,
    bootstrap_resamples: usize,
    permutations: usize,
) -> ConfidenceIntervals {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let kappas = local_curvatures(embeddings).unwrap_or_default();
    let delta_kappa_ci = bootstrap_ci(bootstrap_resamples, kappas.len(), &mut rng, |indices| {
        Some(mean(&indices.iter().map(|&i| kappas[i]).collect::<Vec<_>>()))
    });

    let alpha_ci = bootstrap_ci(bootstrap_resamples, velocities.len(), &mut rng, |indices| {
        let resampled: Vec<f64> = indices.iter().map(|&i| velocities[i]).collect();
        Some(dfa_alpha(&resampled).0)
    });

    let mid = embeddings.len() / 2;
    let (pre, post) = embeddings.split_at(mid.min(embeddings.len()));
    let (delta_h_ci, delta_h_stability) = if pre.len() < 2 || post.len() < 2 {
        (Interval::default(), 0.0)
    } else {
        let mut values = Vec::with_capacity(bootstrap_resamples);
        for _ in 0..bootstrap_resamples {
            let resampled_pre: Vec<Vec<f32>> =
                (0..pre.len()).map(|_| pre[rng.gen_range(0..pre.len())].clone()).collect();
            let resampled_post: Vec<Vec<f32>> =
                (0..post.len()).map(|_| post[rng.gen_range(0..post.len())].clone()).collect();
            values.push(entropy_shift(&resampled_pre, &resampled_post, seed));
        }
        // 1 - std/mean of the bootstrap distribution itself (§4.12), not the
        // CI half-width -- the CI endpoints understate std whenever the
        // distribution isn't symmetric around its mean.
        let h_mean = mean(&values);
        let h_std = variance(&values).sqrt();
        let stability = if h_mean.abs() > 1e-9 { (1.0 - h_std / h_mean.abs()).clamp(0.0, 1.0) } else { 0.0 };

        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let ci = Interval { low: percentile(&values, 0.025), high: percentile(&values, 0.975) };
        (ci, stability)
    };

    let mut null_means = Vec::with_capacity(permutations);
    for _ in 0..permutations {
        let mut shuffled: Vec<Vec<f32>> = embeddings.to_vec();
        shuffled.shuffle(&mut rng);
        if let Some(k) = local_curvatures(&shuffled) {
            null_means.push(mean(&k));
        }
    }
    let delta_kappa_p_value = if null_means.is_empty() {
        1.0
    } else {
        null_means.iter().filter(|&&m| m >= observed_delta_kappa).count() as f64 / null_means.len() as f64
    };

    ConfidenceIntervals {
        delta_kappa: delta_kappa_ci,
        alpha: alpha_ci,
        delta_h: delta_h_ci,
        delta_kappa_p_value,
        alpha_r_squared,
        delta_h_stability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let n: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / n).collect()
    }

    #[test]
    fn inquiry_mimicry_ratio_defaults_to_half_when_neither_appeared() {
        let history = BasinHistory::default();
        let summary = summarize(&[], &[], &history, &[], 1, false, 50, 20);
        assert_eq!(summary.inquiry_mimicry_ratio, 0.5);
    }

    #[test]
    fn dominant_basin_percentage_matches_max_share() {
        let mut history = BasinHistory::default();
        history.push(1, BasinLabel::Transitional, 0.3);
        history.push(2, BasinLabel::Transitional, 0.3);
        history.push(3, BasinLabel::DeepResonance, 0.8);
        let summary = summarize(&[], &[], &history, &[], 1, false, 50, 20);
        let max_count = *summary.basin_distribution.values().max().unwrap();
        assert_eq!(summary.dominant_basin_percentage, max_count as f64 / 3.0);
    }

    #[test]
    fn threshold_flags_reflect_observed_values() {
        let embeddings: Vec<Vec<f32>> = (0..20).map(|i| unit(vec![i as f32 + 1.0, 1.0, 0.3])).collect();
        let history = BasinHistory::default();
        let summary = summarize(&embeddings, &[], &history, &[], 42, true, 50, 20);
        assert_eq!(summary.threshold_flags.alpha_in_range, summary.alpha >= 0.70 && summary.alpha <= 0.90);
        assert!(summary.confidence_intervals.is_some());
    }
}
