use serde::{Deserialize, Serialize};

use super::personality::{Personality, PersonalityOverride};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceGuidance {
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub register: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub avoid: Vec<String>,
}

/// A reusable epistemic lens and voice archetype, as loaded from a template
/// YAML document (§6.5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemplateDoc {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub epistemic_lens: String,
    #[serde(default)]
    pub voice_guidance: VoiceGuidance,
    #[serde(default)]
    pub default_personality: PersonalityOverride,
}

/// A named persona instance as loaded from its YAML document, before
/// resolution against the template it references.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonaDoc {
    pub id: String,
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub personality: Option<PersonalityOverride>,
    #[serde(default)]
    pub signature_phrases: Vec<String>,
    #[serde(default)]
    pub prompt_additions: String,
}

/// An immutable, fully resolved persona: template-derived fields folded in
/// once at Persona Store construction time.
#[derive(Debug, Clone, Serialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub color: String,
    pub template_id: String,
    pub epistemic_lens: String,
    pub voice_guidance: VoiceGuidance,
    pub personality: Personality,
    pub signature_phrases: Vec<String>,
    pub prompt_additions: String,
    pub character: String,
}

impl Persona {
    /// Resolves a raw persona document against its template: the template
    /// supplies `epistemic_lens`, `voice_guidance`, and a base personality;
    /// the persona's own `personality`, if present, overrides the
    /// template's default field-by-field.
    pub fn resolve(doc: &PersonaDoc, template: &TemplateDoc) -> Self {
        let base = Personality::default().merged_with(&template.default_personality);
        let personality = match &doc.personality {
            Some(over) => base.merged_with(over),
            None => base,
        };
        Self {
            id: doc.id.clone(),
            name: doc.name.clone(),
            color: doc.color.clone(),
            template_id: template.id.clone(),
            epistemic_lens: template.epistemic_lens.clone(),
            voice_guidance: template.voice_guidance.clone(),
            personality,
            signature_phrases: doc.signature_phrases.clone(),
            prompt_additions: doc.prompt_additions.clone(),
            character: doc.character.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> TemplateDoc {
        TemplateDoc {
            id: "skeptic".into(),
            name: "Skeptic".into(),
            description: String::new(),
            epistemic_lens: "doubts first principles".into(),
            voice_guidance: VoiceGuidance {
                style: "terse".into(),
                register: "formal".into(),
                patterns: vec![],
                avoid: vec![],
            },
            default_personality: PersonalityOverride {
                openness: Some(0.3),
                ..Default::default()
            },
        }
    }

    #[test]
    fn resolve_inherits_template_lens() {
        let doc = PersonaDoc {
            id: "orin".into(),
            name: "Orin".into(),
            template: "skeptic".into(),
            description: String::new(),
            color: "#fff".into(),
            character: String::new(),
            personality: None,
            signature_phrases: vec![],
            prompt_additions: String::new(),
        };
        let persona = Persona::resolve(&doc, &template());
        assert_eq!(persona.epistemic_lens, "doubts first principles");
        assert_eq!(persona.personality.openness, 0.3);
    }

    #[test]
    fn resolve_persona_override_wins_over_template_default() {
        let doc = PersonaDoc {
            id: "orin".into(),
            name: "Orin".into(),
            template: "skeptic".into(),
            description: String::new(),
            color: "#fff".into(),
            character: String::new(),
            personality: Some(PersonalityOverride {
                openness: Some(0.8),
                ..Default::default()
            }),
            signature_phrases: vec![],
            prompt_additions: String::new(),
        };
        let persona = Persona::resolve(&doc, &template());
        assert_eq!(persona.personality.openness, 0.8);
        // untouched component still comes from the global default, not the template override
        assert_eq!(persona.personality.conscientiousness, 0.5);
    }
}
