//! Context Builder (§4.3): layered persona+template+ensemble prompt
//! composition. Produces an ordered list of `(role, content)` pairs, not a
//! raw string — the list is the contract with the LLM client (§9 design
//! note).

use circle_domain::model::Persona;
use circle_llm::{ChatMessage, ChatRole};

/// One entry of dialogue history, in chronological order, as consumed by
/// the context builder. Mirrors the distinction between a normal turn and a
/// researcher interjection (§4.4 `inject`).
pub enum HistoryItem<'a> {
    Turn {
        speaker_display: &'a str,
        content: &'a str,
    },
    Interjection { content: &'a str },
}

fn ocean_sentence(persona: &Persona) -> String {
    let p = &persona.personality;
    format!(
        "Your disposition: openness {:.1}, conscientiousness {:.1}, extraversion {:.1}, \
         agreeableness {:.1}, neuroticism {:.1} (each on a 0-1 scale) -- let it shape your \
         tone without naming these traits directly.",
        p.openness, p.conscientiousness, p.extraversion, p.agreeableness, p.neuroticism
    )
}

fn circle_block(persona_name: &str, other_participants: &[String]) -> String {
    let others = if other_participants.is_empty() {
        "no one else yet".to_string()
    } else {
        other_participants.join(", ")
    };
    format!(
        "You are {persona_name}, one voice in a circle alongside: {others}. Use @Name to \
         address a specific participant; never @yourself. Never prefix your reply with your \
         own name. Respond in 2-3 sentences. Build on what was said -- do not summarize it."
    )
}

const DIALECTICAL_NORMS: &str = "Dialectical norms: declare disagreement plainly when you feel \
it, ask refuting questions, name the tensions you notice, and acknowledge uncertainty rather \
than papering over it.";

/// Builds the ordered message list for one turn (§4.3).
pub fn build_context(
    persona: &Persona,
    provocation: &str,
    history: &[HistoryItem<'_>],
    other_participants: &[String],
    context_window: usize,
) -> Vec<ChatMessage> {
    let mut system = String::new();
    system.push_str(&persona.epistemic_lens);
    system.push('\n');

    let vg = &persona.voice_guidance;
    if !vg.style.is_empty() || !vg.register.is_empty() {
        system.push_str(&format!("Voice: {} register, {} style.\n", vg.register, vg.style));
    }
    if !vg.patterns.is_empty() {
        system.push_str(&format!("Favor patterns like: {}.\n", vg.patterns.join("; ")));
    }
    if !vg.avoid.is_empty() {
        system.push_str(&format!("Avoid: {}.\n", vg.avoid.join("; ")));
    }
    if !persona.prompt_additions.is_empty() {
        system.push_str(&persona.prompt_additions);
        system.push('\n');
    }
    system.push_str(&ocean_sentence(persona));
    system.push('\n');
    if !persona.signature_phrases.is_empty() {
        system.push_str(&format!(
            "Phrases you favor (use sparingly, don't force them): {}.\n",
            persona.signature_phrases.join("; ")
        ));
    }
    system.push_str(&circle_block(&persona.name, other_participants));
    system.push('\n');
    system.push_str(DIALECTICAL_NORMS);

    let mut messages = vec![ChatMessage {
        role: ChatRole::System,
        content: system,
    }];

    let window_start = history.len().saturating_sub(context_window);
    for item in &history[window_start..] {
        let content = match item {
            HistoryItem::Turn { speaker_display, content } => {
                format!("[{speaker_display}]: {content}")
            }
            HistoryItem::Interjection { content } => format!("[Interjection]: {content}"),
        };
        messages.push(ChatMessage {
            role: ChatRole::User,
            content,
        });
    }

    let closing = if history.is_empty() {
        format!(
            "Opening question: {provocation}\nShare your perspective briefly (2-3 sentences)."
        )
    } else {
        "Respond briefly (2-3 sentences). Speak only as yourself.".to_string()
    };
    messages.push(ChatMessage {
        role: ChatRole::User,
        content: closing,
    });

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use circle_domain::model::{Persona, Personality, VoiceGuidance};

    fn persona() -> Persona {
        Persona {
            id: "orin".into(),
            name: "Orin".into(),
            color: "#112233".into(),
            template_id: "skeptic".into(),
            epistemic_lens: "doubts premises".into(),
            voice_guidance: VoiceGuidance::default(),
            personality: Personality::default(),
            signature_phrases: vec![],
            prompt_additions: String::new(),
            character: String::new(),
        }
    }

    #[test]
    fn empty_history_uses_opening_closing_prompt() {
        let messages = build_context(&persona(), "why does anything exist?", &[], &[], 10);
        let last = messages.last().unwrap();
        assert!(last.content.contains("Opening question"));
    }

    #[test]
    fn non_empty_history_uses_brief_closing_prompt() {
        let history = vec![HistoryItem::Turn {
            speaker_display: "Vex",
            content: "I think causality loops.",
        }];
        let messages = build_context(&persona(), "why?", &history, &["Vex".into()], 10);
        let last = messages.last().unwrap();
        assert!(last.content.contains("Speak only as yourself"));
    }

    #[test]
    fn context_window_truncates_old_history() {
        let history: Vec<HistoryItem> = (0..5)
            .map(|i| HistoryItem::Turn {
                speaker_display: "Vex",
                content: if i == 4 { "last one" } else { "filler" },
            })
            .collect();
        let messages = build_context(&persona(), "why?", &history, &[], 2);
        // 1 system + 2 windowed history + 1 closing = 4
        assert_eq!(messages.len(), 4);
        assert!(messages[2].content.contains("last one"));
    }
}
