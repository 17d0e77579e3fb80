//! Lexicon-based affective substrate, ψ_affective (§4.10). No VADER crate
//! appears anywhere in the reference stack, so sentiment is scored with a
//! small hand-rolled valence lexicon rather than importing a dedicated
//! sentiment-analysis dependency.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::metrics::variance;

static HEDGING: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\b(I think|I guess|I suppose|maybe|perhaps|possibly|probably|might|could be|seems like|sort of|kind of)\b",
        r"(?i)\b(I'm not sure|I wonder|I feel like|it appears|it seems)\b",
        r"(?i)\b(arguably|presumably|apparently|seemingly)\b",
    ])
});

static VULNERABILITY: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\b(I feel|I'm feeling|I felt)\b",
        r"(?i)\b(I'm|I am)\s+(scared|worried|afraid|anxious|nervous|uncertain|confused|overwhelmed)\b",
        r"(?i)\b(my|I)\s+(fear|worry|concern|anxiety|doubt)\b",
        r"(?i)\b(honestly|to be honest|truthfully|frankly)\b",
        r"(?i)\b(I don't know|I'm struggling|I'm not sure|I'm uncertain)\b",
    ])
});

static CONFIDENCE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\b(definitely|certainly|absolutely|clearly|obviously|undoubtedly)\b",
        r"(?i)\b(I'm certain|I'm sure|I know|without doubt|no question)\b",
        r"(?i)\b(always|never|must|will)\b",
    ])
});

const EMOTION_WORDS: &[&str] = &[
    "afraid", "angry", "anxious", "confused", "disappointed", "excited", "frustrated",
    "grateful", "happy", "hopeful", "lonely", "sad", "scared", "surprised", "uncertain",
    "worried",
];

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "wonderful", "fascinating", "insightful", "agree",
    "brilliant", "helpful", "clear", "interesting", "hope", "grateful", "happy", "love",
    "appreciate", "right", "yes", "resonates",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "wrong", "confusing", "disagree", "worried", "afraid", "frustrated", "sad",
    "concern", "doubt", "fear", "no", "never", "struggle", "overwhelmed", "lonely",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).expect("static pattern")).collect()
}

fn count_matches(text: &str, patterns: &[Regex]) -> usize {
    patterns.iter().map(|re| re.find_iter(text).count()).sum()
}

fn count_emotion_words(text_lower: &str) -> usize {
    EMOTION_WORDS
        .iter()
        .filter(|w| {
            let pattern = format!(r"\b{}\b", w);
            Regex::new(&pattern).map(|re| re.is_match(text_lower)).unwrap_or(false)
        })
        .count()
}

/// Lexicon valence in `[-1, 1]`: `(positive_hits - negative_hits) / word_count`,
/// clamped.
fn sentiment_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let pos = words.iter().filter(|w| POSITIVE_WORDS.contains(w)).count() as f64;
    let neg = words.iter().filter(|w| NEGATIVE_WORDS.contains(w)).count() as f64;
    ((pos - neg) / words.len() as f64 * 4.0).clamp(-1.0, 1.0)
}

/// Proportion of hedging-regex matches to total words across `texts` (§4.9's
/// `hedging_density`, reused verbatim by the affective composite below).
pub fn hedging_density(texts: &[String]) -> f64 {
    let mut total_words = 0usize;
    let mut total_hedging = 0usize;
    for text in texts {
        total_words += text.split_whitespace().count();
        total_hedging += count_matches(text, &HEDGING);
    }
    total_hedging as f64 / total_words.max(1) as f64
}

/// ψ_affective over the accumulated turn texts so far (§4.10).
pub fn affective_substrate(texts: &[String]) -> f64 {
    if texts.is_empty() {
        return 0.0;
    }

    let mut sentiment_trajectory = Vec::with_capacity(texts.len());
    let mut confidence_densities = Vec::with_capacity(texts.len());
    let mut total_words = 0usize;
    let mut total_vulnerability = 0usize;

    for text in texts {
        let words = text.split_whitespace().count();
        total_words += words;
        sentiment_trajectory.push(sentiment_score(text));

        let lower = text.to_lowercase();
        total_vulnerability += count_matches(text, &VULNERABILITY) + count_emotion_words(&lower);

        let conf_count = count_matches(text, &CONFIDENCE);
        confidence_densities.push(conf_count as f64 / words.max(1) as f64);
    }

    let sentiment_variance = variance(&sentiment_trajectory);
    let hedging = hedging_density(texts);
    let vulnerability_score = total_vulnerability as f64 / total_words.max(1) as f64;
    let confidence_variance = variance(&confidence_densities);

    let sentiment_norm = (sentiment_variance / 0.5).min(1.0);
    let hedging_norm = (hedging / 0.1).min(1.0);
    let vulnerability_norm = (vulnerability_score / 0.05).min(1.0);
    let confidence_norm = (confidence_variance / 0.01).min(1.0);

    let psi_raw =
        0.3 * sentiment_norm + 0.3 * hedging_norm + 0.3 * vulnerability_norm + 0.1 * confidence_norm;
    (2.0 * (psi_raw - 0.5)).tanh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_texts_yield_neutral_affect() {
        assert_eq!(affective_substrate(&[]), 0.0);
    }

    #[test]
    fn hedging_heavy_text_raises_density() {
        let texts = vec!["I think maybe perhaps this could be wrong, I guess.".to_string()];
        assert!(hedging_density(&texts) > 0.0);
    }

    #[test]
    fn affective_substrate_stays_within_unit_range() {
        let texts = vec![
            "I'm scared and worried, honestly I don't know.".to_string(),
            "Definitely! This is absolutely certain and clear.".to_string(),
        ];
        let score = affective_substrate(&texts);
        assert!((-1.0..=1.0).contains(&score));
    }
}
