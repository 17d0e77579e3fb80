use serde::{Deserialize, Serialize};

/// Five-trait OCEAN personality vector, each component in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub openness: f64,
    pub conscientiousness: f64,
    pub extraversion: f64,
    pub agreeableness: f64,
    pub neuroticism: f64,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            openness: 0.5,
            conscientiousness: 0.5,
            extraversion: 0.5,
            agreeableness: 0.5,
            neuroticism: 0.5,
        }
    }
}

impl Personality {
    pub fn clamp_unit(&self) -> Self {
        let c = |v: f64| v.clamp(0.0, 1.0);
        Self {
            openness: c(self.openness),
            conscientiousness: c(self.conscientiousness),
            extraversion: c(self.extraversion),
            agreeableness: c(self.agreeableness),
            neuroticism: c(self.neuroticism),
        }
    }

    /// Overlays any fields present in `over` onto `self`, field by field.
    pub fn merged_with(&self, over: &PersonalityOverride) -> Self {
        Self {
            openness: over.openness.unwrap_or(self.openness),
            conscientiousness: over.conscientiousness.unwrap_or(self.conscientiousness),
            extraversion: over.extraversion.unwrap_or(self.extraversion),
            agreeableness: over.agreeableness.unwrap_or(self.agreeableness),
            neuroticism: over.neuroticism.unwrap_or(self.neuroticism),
        }
        .clamp_unit()
    }

    /// Sampling-parameter overlay derived from this personality (§4.2).
    pub fn sampling_overlay(&self) -> (f64, f64, f64) {
        let temperature = 0.4 + 0.6 * self.openness;
        let top_p = 0.95 - 0.25 * self.conscientiousness;
        let repeat_penalty = 1.0 + 0.3 * self.neuroticism;
        (temperature, top_p, repeat_penalty)
    }
}

/// Partial OCEAN vector as read from a persona or template document; each
/// component independently overrides the base it is merged onto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityOverride {
    #[serde(default)]
    pub openness: Option<f64>,
    #[serde(default)]
    pub conscientiousness: Option<f64>,
    #[serde(default)]
    pub extraversion: Option<f64>,
    #[serde(default)]
    pub agreeableness: Option<f64>,
    #[serde(default)]
    pub neuroticism: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_neutral() {
        let p = Personality::default();
        assert_eq!(p.openness, 0.5);
        assert_eq!(p.neuroticism, 0.5);
    }

    #[test]
    fn merge_overrides_only_set_fields() {
        let base = Personality::default();
        let over = PersonalityOverride {
            openness: Some(0.9),
            ..Default::default()
        };
        let merged = base.merged_with(&over);
        assert_eq!(merged.openness, 0.9);
        assert_eq!(merged.conscientiousness, 0.5);
    }

    #[test]
    fn merge_clamps_out_of_range_values() {
        let base = Personality::default();
        let over = PersonalityOverride {
            agreeableness: Some(1.4),
            ..Default::default()
        };
        let merged = base.merged_with(&over);
        assert_eq!(merged.agreeableness, 1.0);
    }

    #[test]
    fn sampling_overlay_matches_formulas() {
        let p = Personality {
            openness: 1.0,
            conscientiousness: 1.0,
            extraversion: 0.5,
            agreeableness: 0.5,
            neuroticism: 1.0,
        };
        let (temperature, top_p, repeat_penalty) = p.sampling_overlay();
        assert!((temperature - 1.0).abs() < 1e-9);
        assert!((top_p - 0.70).abs() < 1e-9);
        assert!((repeat_penalty - 1.3).abs() < 1e-9);
    }
}
