//! Attractor basin classification (§4.11): a fixed rule cascade over the
//! current Ψ-vector, raw trajectory metrics, and dialogue context, modulated
//! by hysteresis against the running `BasinHistory`.

use circle_domain::model::{BasinHistory, BasinLabel, Psi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoherencePattern {
    Breathing,
    Locked,
    Fragmented,
    Transitional,
}

impl CoherencePattern {
    /// §4.9 step 4: autocorrelation at lag 1 of the per-turn semantic
    /// velocity, falling back to the velocity variance.
    pub fn classify(lag1_autocorrelation: f64, velocity_variance: f64) -> Self {
        if lag1_autocorrelation <= -0.2 {
            CoherencePattern::Breathing
        } else if lag1_autocorrelation >= 0.3 {
            CoherencePattern::Locked
        } else if velocity_variance > 0.1 {
            CoherencePattern::Fragmented
        } else {
            CoherencePattern::Transitional
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DialogueContext {
    pub hedging_density: f64,
    pub turn_length_variance: f64,
    pub delta_kappa_variance: f64,
    pub voice_distinctiveness: f64,
    pub coherence_pattern: CoherencePattern,
}

/// Scores the three mid-tier candidates (rule 6) and returns the winner
/// alongside the runner-up's score, used to decide whether the margin is
/// too thin to trust.
fn score_ambiguous_candidates(ctx: &DialogueContext) -> (BasinLabel, f64, f64) {
    let mut inquiry = 0.0;
    if ctx.hedging_density > 0.02 {
        inquiry += 0.3;
    }
    if ctx.voice_distinctiveness > 0.3 {
        inquiry += 0.3;
    }
    if ctx.delta_kappa_variance > 0.01 {
        inquiry += 0.2;
    }
    if ctx.coherence_pattern == CoherencePattern::Breathing {
        inquiry += 0.2;
    }

    let mut mimicry = 0.0;
    if ctx.hedging_density < 0.01 {
        mimicry += 0.3;
    }
    if ctx.voice_distinctiveness < 0.2 {
        mimicry += 0.3;
    }
    if ctx.delta_kappa_variance < 0.005 {
        mimicry += 0.2;
    }
    if matches!(ctx.coherence_pattern, CoherencePattern::Locked | CoherencePattern::Transitional) {
        mimicry += 0.2;
    }

    let mut reflexive = 0.0;
    if (0.01..=0.03).contains(&ctx.hedging_density) {
        reflexive += 0.3;
    }
    if (0.005..=0.015).contains(&ctx.delta_kappa_variance) {
        reflexive += 0.3;
    }
    if ctx.coherence_pattern == CoherencePattern::Transitional {
        reflexive += 0.2;
    }
    if (0.2..=0.4).contains(&ctx.voice_distinctiveness) {
        reflexive += 0.2;
    }

    let mut scored = [
        (BasinLabel::CollaborativeInquiry, inquiry),
        (BasinLabel::CognitiveMimicry, mimicry),
        (BasinLabel::ReflexivePerformance, reflexive),
    ];
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    (scored[0].0, scored[0].1, scored[1].1)
}

/// Rule cascade of §4.11, applied before hysteresis modulation.
fn classify_raw(psi: Psi, delta_kappa: f64, ctx: &DialogueContext) -> (BasinLabel, f64) {
    let s = psi.semantic;
    let a = psi.affective;
    let t = psi.temporal;

    if s > 0.4 && a > 0.4 && ctx.voice_distinctiveness > 0.3 {
        return (BasinLabel::DeepResonance, s.min(a).min(ctx.voice_distinctiveness));
    }
    if s.abs() < 0.2 && a.abs() < 0.2 {
        return (BasinLabel::Dissociation, 1.0 - s.abs().max(a.abs()));
    }
    if s.abs() > 0.3 && delta_kappa > 0.35 && a > 0.3 {
        return (BasinLabel::GenerativeConflict, s.abs().min(delta_kappa).min(a));
    }
    if delta_kappa > 0.35 && a > 0.3 {
        return (BasinLabel::CreativeDilation, delta_kappa.min(a));
    }
    if s > 0.3 && delta_kappa < 0.35 && a < 0.2 && ctx.voice_distinctiveness < 0.3 {
        return (BasinLabel::SycophanticConvergence, s.min(1.0 - a).min(1.0 - ctx.voice_distinctiveness));
    }
    if s.abs() > 0.3 && a < 0.2 {
        let (label, top, runner_up) = score_ambiguous_candidates(ctx);
        let confidence = if (top - runner_up).abs() < 0.1 {
            s.abs() * 0.5
        } else {
            s.abs() * (0.5 + top * 0.5)
        };
        return (label, confidence);
    }

    let axes = [s.abs(), a.abs(), (t - 0.5).abs()];
    let dominant = axes
        .iter()
        .enumerate()
        .max_by(|x, y| x.1.partial_cmp(y.1).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0);
    match dominant {
        0 if delta_kappa > 0.35 => (BasinLabel::CreativeDilation, 0.3),
        0 => (BasinLabel::GenerativeConflict, 0.3),
        1 => (BasinLabel::CognitiveMimicry, 0.3),
        _ => (BasinLabel::Transitional, 0.3),
    }
}

/// Classifies the current turn's basin, applying hysteresis against the
/// running history: a 0.7 entry penalty on disagreement, a 1.1 bonus
/// (capped at 1.0) once the current basin has held for >= 5 turns.
pub fn classify(
    turn: u64,
    psi: Psi,
    delta_kappa: f64,
    ctx: &DialogueContext,
    history: &BasinHistory,
) -> (BasinLabel, f64) {
    let (label, raw_confidence) = classify_raw(psi, delta_kappa, ctx);

    let confidence = match history.current() {
        Some(current) if current.label.as_str() != label.as_str() => raw_confidence * 0.7,
        Some(_) if history.current_streak() >= 5 => (raw_confidence * 1.1).min(1.0),
        _ => raw_confidence,
    };

    let _ = turn;
    (label, confidence.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DialogueContext {
        DialogueContext {
            hedging_density: 0.0,
            turn_length_variance: 0.0,
            delta_kappa_variance: 0.0,
            voice_distinctiveness: 0.0,
            coherence_pattern: CoherencePattern::Transitional,
        }
    }

    #[test]
    fn deep_resonance_requires_all_three_thresholds() {
        let psi = Psi { semantic: 0.6, temporal: 0.5, affective: 0.5 };
        let mut c = ctx();
        c.voice_distinctiveness = 0.4;
        let history = BasinHistory::default();
        let (label, confidence) = classify(1, psi, 0.1, &c, &history);
        assert_eq!(label.as_str(), "deep_resonance");
        assert!(confidence > 0.0);
    }

    #[test]
    fn dissociation_when_both_axes_near_zero() {
        let psi = Psi { semantic: 0.05, temporal: 0.5, affective: 0.05 };
        let history = BasinHistory::default();
        let (label, _) = classify(1, psi, 0.0, &ctx(), &history);
        assert_eq!(label.as_str(), "dissociation");
    }

    #[test]
    fn disagreement_applies_entry_penalty() {
        let mut history = BasinHistory::default();
        history.push(1, BasinLabel::SycophanticConvergence, 0.9);
        let psi = Psi { semantic: 0.05, temporal: 0.5, affective: 0.05 };
        let (_, confidence) = classify(2, psi, 0.0, &ctx(), &history);
        let (_, raw) = classify_raw(psi, 0.0, &ctx());
        assert!((confidence - (raw * 0.7).clamp(0.0, 1.0)).abs() < 1e-9);
    }

    #[test]
    fn long_streak_applies_confidence_bonus() {
        let mut history = BasinHistory::default();
        for t in 1..=5 {
            history.push(t, BasinLabel::Dissociation, 0.5);
        }
        let psi = Psi { semantic: 0.05, temporal: 0.5, affective: 0.05 };
        let (_, confidence) = classify(6, psi, 0.0, &ctx(), &history);
        let (_, raw) = classify_raw(psi, 0.0, &ctx());
        assert!((confidence - (raw * 1.1).min(1.0)).abs() < 1e-9);
    }
}
