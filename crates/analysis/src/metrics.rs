//! Numeric contracts shared by the streaming analyzer and the offline
//! summarizer (§4.13). Implemented directly in plain `f64` vectors; no
//! numerical crate in the reference stack covers clustering or DFA, so
//! both are hand-rolled here rather than importing something disproportionate.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

pub(crate) fn to_f64(v: &[f32]) -> Vec<f64> {
    v.iter().map(|x| *x as f64).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

pub(crate) fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

fn cosine(a: &[f64], b: &[f64]) -> Option<f64> {
    let (na, nb) = (norm(a), norm(b));
    if na <= 1e-12 || nb <= 1e-12 {
        return None;
    }
    Some(dot(a, b) / (na * nb))
}

/// `v_i = 1 - cos(e_{i-1}, e_i)`; zero-norm pairs yield velocity 1.0.
pub fn semantic_velocity(embeddings: &[Vec<f32>]) -> Vec<f64> {
    let mut out = Vec::new();
    for window in embeddings.windows(2) {
        let a = to_f64(&window[0]);
        let b = to_f64(&window[1]);
        let v = match cosine(&a, &b) {
            Some(c) => 1.0 - c,
            None => 1.0,
        };
        out.push(v);
    }
    out
}

/// Local Frenet-Serret curvature on the embedding trajectory. Requires
/// `n >= 4`; returns `None` otherwise. Zero-velocity steps contribute 0 to
/// the mean.
pub fn local_curvature_mean(embeddings: &[Vec<f32>]) -> Option<f64> {
    let kappas = local_curvatures(embeddings)?;
    if kappas.is_empty() {
        return Some(0.0);
    }
    Some(kappas.iter().sum::<f64>() / kappas.len() as f64)
}

/// Per-step κ_i values underlying [`local_curvature_mean`]; exposed
/// separately so the offline summarizer can bootstrap over them.
pub fn local_curvatures(embeddings: &[Vec<f32>]) -> Option<Vec<f64>> {
    if embeddings.len() < 4 {
        return None;
    }
    let es: Vec<Vec<f64>> = embeddings.iter().map(|e| to_f64(e)).collect();
    let velocities: Vec<Vec<f64>> = es.windows(2).map(|w| sub(&w[1], &w[0])).collect();
    let accelerations: Vec<Vec<f64>> = velocities.windows(2).map(|w| sub(&w[1], &w[0])).collect();

    let mut kappas = Vec::with_capacity(accelerations.len());
    for (i, a_i) in accelerations.iter().enumerate() {
        let v_i = &velocities[i];
        let v_norm = norm(v_i);
        if v_norm <= 1e-12 {
            kappas.push(0.0);
            continue;
        }
        let v_unit: Vec<f64> = v_i.iter().map(|x| x / v_norm).collect();
        let proj = dot(a_i, &v_unit);
        let a_perp: Vec<f64> = a_i
            .iter()
            .zip(v_unit.iter())
            .map(|(a, vu)| a - proj * vu)
            .collect();
        let kappa = norm(&a_perp) / (v_norm * v_norm);
        kappas.push(kappa);
    }
    Some(kappas)
}

/// Detrended Fluctuation Analysis scaling exponent α, plus the R² of the
/// `log10(F) vs log10(s)` regression used to produce it. Fewer than 2 valid
/// scales (including any signal shorter than 8 samples) yields `(0.5, 0.0)`.
pub fn dfa_alpha(signal: &[f64]) -> (f64, f64) {
    let n = signal.len();
    if n < 8 {
        return (0.5, 0.0);
    }

    let mean = signal.iter().sum::<f64>() / n as f64;
    let mut y = Vec::with_capacity(n);
    let mut acc = 0.0;
    for x in signal {
        acc += x - mean;
        y.push(acc);
    }

    let min_scale = 4usize;
    let max_scale = ((min_scale + 1) as f64).max((n as f64 * 0.25).min(n as f64 / 2.0)) as usize;
    let max_scale = max_scale.max(min_scale + 1);

    let scales = log_spaced_scales(min_scale, max_scale, 16);

    let mut log_s = Vec::new();
    let mut log_f = Vec::new();
    for s in scales {
        if s < 2 || s > n {
            continue;
        }
        let n_segments = n / s;
        if n_segments == 0 {
            continue;
        }
        let mut sq_sum = 0.0;
        for seg in 0..n_segments {
            let start = seg * s;
            let segment = &y[start..start + s];
            let residual = linear_detrend_rms(segment);
            sq_sum += residual * residual;
        }
        let f = (sq_sum / n_segments as f64).sqrt();
        if f > 0.0 {
            log_s.push((s as f64).log10());
            log_f.push(f.log10());
        }
    }

    if log_s.len() < 2 {
        return (0.5, 0.0);
    }

    let (slope, r_squared) = linear_regression(&log_s, &log_f);
    (slope, r_squared)
}

fn log_spaced_scales(min_scale: usize, max_scale: usize, count: usize) -> Vec<usize> {
    let lo = (min_scale as f64).ln();
    let hi = (max_scale as f64).ln();
    let mut scales: Vec<usize> = (0..count)
        .map(|i| {
            let t = if count <= 1 {
                0.0
            } else {
                i as f64 / (count - 1) as f64
            };
            let v = (lo + t * (hi - lo)).exp();
            v.round() as usize
        })
        .collect();
    scales.sort_unstable();
    scales.dedup();
    scales
}

fn linear_detrend_rms(segment: &[f64]) -> f64 {
    let n = segment.len() as f64;
    let xs: Vec<f64> = (0..segment.len()).map(|i| i as f64).collect();
    let (slope, intercept) = fit_line(&xs, segment);
    let mut sq_sum = 0.0;
    for (x, y) in xs.iter().zip(segment.iter()) {
        let trend = slope * x + intercept;
        let resid = y - trend;
        sq_sum += resid * resid;
    }
    (sq_sum / n).sqrt()
}

fn fit_line(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        num += (x - x_mean) * (y - y_mean);
        den += (x - x_mean) * (x - x_mean);
    }
    if den.abs() < 1e-12 {
        return (0.0, y_mean);
    }
    let slope = num / den;
    let intercept = y_mean - slope * x_mean;
    (slope, intercept)
}

/// Returns `(slope, r_squared)` of the ordinary least-squares fit of `ys`
/// on `xs`.
fn linear_regression(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let (slope, intercept) = fit_line(xs, ys);
    let y_mean = ys.iter().sum::<f64>() / ys.len() as f64;
    let mut ss_tot = 0.0;
    let mut ss_res = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        let pred = slope * x + intercept;
        ss_res += (y - pred) * (y - pred);
        ss_tot += (y - y_mean) * (y - y_mean);
    }
    let r_squared = if ss_tot.abs() < 1e-12 { 0.0 } else { 1.0 - ss_res / ss_tot };
    (slope, r_squared)
}

/// A minimal seeded k-means, used only to bucket embeddings into clusters
/// for the Jensen-Shannon entropy-shift metric below.
fn kmeans(points: &[Vec<f64>], k: usize, n_init: usize, seed: u64) -> Vec<usize> {
    let k = k.min(points.len()).max(1);
    let dim = points.first().map(|p| p.len()).unwrap_or(0);

    let mut best_assignment = vec![0usize; points.len()];
    let mut best_inertia = f64::INFINITY;

    for init in 0..n_init {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(init as u64));
        let mut indices: Vec<usize> = (0..points.len()).collect();
        indices.shuffle(&mut rng);
        let mut centroids: Vec<Vec<f64>> = indices.iter().take(k).map(|&i| points[i].clone()).collect();
        while centroids.len() < k {
            centroids.push(vec![0.0; dim]);
        }

        let mut assignment = vec![0usize; points.len()];
        for _ in 0..25 {
            let mut changed = false;
            for (i, p) in points.iter().enumerate() {
                let mut best = 0usize;
                let mut best_dist = f64::INFINITY;
                for (c_idx, c) in centroids.iter().enumerate() {
                    let d = norm(&sub(p, c));
                    if d < best_dist {
                        best_dist = d;
                        best = c_idx;
                    }
                }
                if assignment[i] != best {
                    changed = true;
                }
                assignment[i] = best;
            }
            for c_idx in 0..k {
                let members: Vec<&Vec<f64>> = points
                    .iter()
                    .zip(assignment.iter())
                    .filter(|(_, &a)| a == c_idx)
                    .map(|(p, _)| p)
                    .collect();
                if members.is_empty() {
                    continue;
                }
                let mut mean = vec![0.0; dim];
                for m in &members {
                    for d in 0..dim {
                        mean[d] += m[d];
                    }
                }
                for v in mean.iter_mut() {
                    *v /= members.len() as f64;
                }
                centroids[c_idx] = mean;
            }
            if !changed {
                break;
            }
        }

        let inertia: f64 = points
            .iter()
            .zip(assignment.iter())
            .map(|(p, &a)| {
                let d = norm(&sub(p, &centroids[a]));
                d * d
            })
            .sum();

        if inertia < best_inertia {
            best_inertia = inertia;
            best_assignment = assignment;
        }
    }

    best_assignment
}

fn cluster_distribution(assignments: &[usize], k: usize) -> Vec<f64> {
    let mut counts = vec![0.0; k];
    for &a in assignments {
        counts[a] += 1.0;
    }
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return counts;
    }
    counts.iter().map(|c| c / total).collect()
}

const JS_EPSILON: f64 = 1e-12;

/// Jensen-Shannon divergence in bits between two discrete distributions of
/// the same length, with an `epsilon` floor to avoid `log(0)`.
fn jensen_shannon_divergence(p: &[f64], q: &[f64]) -> f64 {
    let floor = |v: f64| v.max(JS_EPSILON);
    let m: Vec<f64> = p.iter().zip(q.iter()).map(|(a, b)| (a + b) / 2.0).collect();

    let kl = |a: &[f64], b: &[f64]| -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(ai, bi)| {
                let ai = floor(*ai);
                let bi = floor(*bi);
                if ai <= JS_EPSILON {
                    0.0
                } else {
                    ai * (ai / bi).log2()
                }
            })
            .sum()
    };

    0.5 * kl(p, &m) + 0.5 * kl(q, &m)
}

/// Entropy shift ΔH between the first and second halves of a session's
/// embeddings (§4.13). `n_pre < 2 || n_post < 2` yields `0.0`.
pub fn entropy_shift(pre: &[Vec<f32>], post: &[Vec<f32>], seed: u64) -> f64 {
    if pre.len() < 2 || post.len() < 2 {
        return 0.0;
    }
    let n_clusters = (pre.len() + post.len()).min(8);
    let mut points: Vec<Vec<f64>> = pre.iter().map(|e| to_f64(e)).collect();
    points.extend(post.iter().map(|e| to_f64(e)));

    let assignments = kmeans(&points, n_clusters, 10, seed);
    let (pre_assign, post_assign) = assignments.split_at(pre.len());

    let p = cluster_distribution(pre_assign, n_clusters);
    let q = cluster_distribution(post_assign, n_clusters);

    jensen_shannon_divergence(&p, &q).clamp(0.0, 1.0)
}

pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean.abs() < 1e-12 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / mean
}

pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let n: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / n).collect()
    }

    #[test]
    fn identical_embeddings_have_zero_velocity() {
        let e = unit(vec![1.0, 0.0, 0.0]);
        let velocities = semantic_velocity(&[e.clone(), e]);
        assert!(velocities[0].abs() < 1e-9);
    }

    #[test]
    fn curvature_requires_at_least_four_points() {
        let e = unit(vec![1.0, 0.0]);
        assert!(local_curvature_mean(&[e.clone(), e.clone(), e]).is_none());
    }

    #[test]
    fn dfa_default_for_short_signal() {
        let (alpha, _) = dfa_alpha(&[0.1, 0.2, 0.1]);
        assert_eq!(alpha, 0.5);
    }

    #[test]
    fn entropy_shift_is_zero_for_undersized_halves() {
        let pre = vec![unit(vec![1.0, 0.0])];
        let post = vec![unit(vec![0.0, 1.0]), unit(vec![0.0, 1.0])];
        assert_eq!(entropy_shift(&pre, &post, 42), 0.0);
    }

    #[test]
    fn entropy_shift_is_within_unit_range() {
        let pre: Vec<Vec<f32>> = (0..5).map(|i| unit(vec![i as f32 + 1.0, 1.0])).collect();
        let post: Vec<Vec<f32>> = (0..5).map(|i| unit(vec![1.0, i as f32 + 1.0])).collect();
        let dh = entropy_shift(&pre, &post, 7);
        assert!((0.0..=1.0).contains(&dh));
    }

    #[test]
    fn entropy_shift_is_symmetric() {
        let pre: Vec<Vec<f32>> = (0..5).map(|i| unit(vec![i as f32 + 1.0, 1.0])).collect();
        let post: Vec<Vec<f32>> = (0..5).map(|i| unit(vec![1.0, i as f32 + 1.0])).collect();
        let forward = entropy_shift(&pre, &post, 7);
        let backward = entropy_shift(&post, &pre, 7);
        assert!((forward - backward).abs() < 1e-9);
    }
}
