//! Turn Scheduler (§4.1): a deterministic, seeded chooser of the next
//! speaker from a fixed roster, honoring mentions, cooldown, and
//! least-recently-spoken weighting.

use std::collections::{HashMap, VecDeque};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use regex::Regex;

/// The roster slot used for the optional human participant.
pub const HUMAN_SLOT: &str = "human";

/// Deterministic, seeded chooser of the next speaker (§4.1). All randomness
/// flows from the one RNG stream owned here; no hash-map iteration order is
/// consulted for a decision.
pub struct TurnScheduler {
    /// The full ordered roster of speaker slots, including `"human"` when
    /// `include_human` was set at construction.
    roster: Vec<String>,
    cooldown: usize,
    human_aliases: Vec<String>,
    turn_counts: HashMap<String, u64>,
    recent_speakers: VecDeque<String>,
    rng: ChaCha8Rng,
    mention_re: Regex,
}

impl TurnScheduler {
    /// `agents` is the ordered roster of agent ids (human slot excluded).
    /// `human_handle` is the operator-configured alias for the human
    /// participant (e.g. a first name), in addition to the fixed aliases
    /// `human` and `you`.
    pub fn new(
        agents: Vec<String>,
        seed: u64,
        cooldown: u32,
        include_human: bool,
        human_handle: Option<String>,
    ) -> Self {
        let mut roster = agents;
        if include_human {
            roster.push(HUMAN_SLOT.to_string());
        }
        let mut human_aliases = vec!["human".to_string(), "you".to_string()];
        if let Some(handle) = human_handle {
            if !handle.is_empty() {
                human_aliases.push(handle.to_lowercase());
            }
        }
        Self {
            roster,
            cooldown: cooldown as usize,
            human_aliases,
            turn_counts: HashMap::new(),
            recent_speakers: VecDeque::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            // `@` followed by one or more word characters; case-folded below.
            mention_re: Regex::new(r"@(\w+)").expect("mention regex is valid"),
        }
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn turn_count(&self, agent_id: &str) -> u64 {
        self.turn_counts.get(agent_id).copied().unwrap_or(0)
    }

    /// Resolves a bare token (no `@`) to a roster slot, following the human
    /// aliases first, then exact (case-insensitive) agent id match.
    fn resolve_alias(&self, token_lower: &str) -> Option<&str> {
        if self.human_aliases.iter().any(|a| a == token_lower) {
            if self.roster.iter().any(|r| r == HUMAN_SLOT) {
                return Some(HUMAN_SLOT);
            }
            return None;
        }
        self.roster
            .iter()
            .find(|r| r.to_lowercase() == token_lower)
            .map(|s| s.as_str())
    }

    /// Mention detection (§4.1 step 3). Preserved deliberately as a
    /// case-folded substring test for the bare-name pass (§9 open
    /// question): an agent id can match inside an unrelated word.
    fn detect_mentions(&self, last_content: &str) -> Vec<String> {
        let lower = last_content.to_lowercase();
        let mut ordered = Vec::new();
        let mut seen = std::collections::HashSet::new();

        // Explicit `@name` tokens, in order of appearance.
        for cap in self.mention_re.captures_iter(&lower) {
            let token = cap[1].to_string();
            if let Some(slot) = self.resolve_alias(&token) {
                if seen.insert(slot.to_string()) {
                    ordered.push(slot.to_string());
                }
            }
        }

        // Bare-name substring mentions: human aliases first, then agent ids,
        // both in roster order.
        for alias in &self.human_aliases {
            if lower.contains(alias.as_str()) {
                if let Some(slot) = self.resolve_alias(alias) {
                    if seen.insert(slot.to_string()) {
                        ordered.push(slot.to_string());
                    }
                }
            }
        }
        for candidate in &self.roster {
            if candidate == HUMAN_SLOT {
                continue;
            }
            if lower.contains(&candidate.to_lowercase()) && seen.insert(candidate.clone()) {
                ordered.push(candidate.clone());
            }
        }

        ordered
    }

    fn eligible(&self) -> Vec<String> {
        let window = if self.cooldown == 0 {
            0
        } else {
            self.cooldown.min(self.recent_speakers.len())
        };
        let in_cooldown: std::collections::HashSet<&String> = self
            .recent_speakers
            .iter()
            .rev()
            .take(window)
            .collect();
        let filtered: Vec<String> = self
            .roster
            .iter()
            .filter(|a| !in_cooldown.contains(a))
            .cloned()
            .collect();
        if filtered.is_empty() {
            self.roster.clone()
        } else {
            filtered
        }
    }

    fn record_selection(&mut self, agent_id: &str) {
        *self.turn_counts.entry(agent_id.to_string()).or_insert(0) += 1;
        self.recent_speakers.push_back(agent_id.to_string());
        let cap = self.cooldown.max(1) + 1;
        while self.recent_speakers.len() > cap {
            self.recent_speakers.pop_front();
        }
    }

    /// §4.1 `select_next`. `force` bypasses all rules if it names a roster
    /// member; otherwise it is silently ignored (scheduler operations never
    /// fail).
    pub fn select_next(&mut self, last_content: Option<&str>, force: Option<&str>) -> String {
        if let Some(f) = force {
            if self.roster.iter().any(|r| r == f) {
                self.record_selection(f);
                return f.to_string();
            }
        }

        let eligible = self.eligible();

        if let Some(content) = last_content {
            let mentions = self.detect_mentions(content);
            if let Some(hit) = mentions.iter().find(|m| eligible.contains(m)) {
                let hit = hit.clone();
                self.record_selection(&hit);
                return hit;
            }
        }

        let max_count = eligible
            .iter()
            .map(|a| self.turn_count(a))
            .max()
            .unwrap_or(0);
        let weights: Vec<f64> = eligible
            .iter()
            .map(|a| (max_count + 1 - self.turn_count(a) + 1) as f64)
            .collect();
        let total: f64 = weights.iter().sum();
        let mut pick = self.rng.gen_range(0.0..total);
        let mut chosen = eligible.last().cloned().unwrap_or_default();
        for (agent, weight) in eligible.iter().zip(weights.iter()) {
            if pick < *weight {
                chosen = agent.clone();
                break;
            }
            pick -= weight;
        }
        self.record_selection(&chosen);
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(seed: u64, cooldown: u32) -> TurnScheduler {
        TurnScheduler::new(
            vec!["a".into(), "b".into(), "c".into()],
            seed,
            cooldown,
            false,
            None,
        )
    }

    #[test]
    fn deterministic_given_identical_seed_and_inputs() {
        let mut s1 = scheduler(42, 1);
        let mut s2 = scheduler(42, 1);
        let seq1: Vec<String> = (0..10).map(|_| s1.select_next(None, None)).collect();
        let seq2: Vec<String> = (0..10).map(|_| s2.select_next(None, None)).collect();
        assert_eq!(seq1, seq2);
    }

    #[test]
    fn no_consecutive_repeats_with_cooldown_one() {
        let mut s = scheduler(7, 1);
        let seq: Vec<String> = (0..20).map(|_| s.select_next(None, None)).collect();
        for window in seq.windows(2) {
            assert_ne!(window[0], window[1]);
        }
    }

    #[test]
    fn force_bypasses_rules() {
        let mut s = scheduler(1, 1);
        let picked = s.select_next(None, Some("c"));
        assert_eq!(picked, "c");
    }

    #[test]
    fn unknown_force_falls_through() {
        let mut s = scheduler(1, 1);
        let picked = s.select_next(None, Some("zzz"));
        assert!(s.roster().contains(&picked));
    }

    #[test]
    fn explicit_mention_selects_named_agent() {
        let mut s = scheduler(1, 1);
        let picked = s.select_next(Some("hey @c, thoughts?"), None);
        assert_eq!(picked, "c");
    }

    #[test]
    fn mention_to_ineligible_agent_falls_back_to_weighting() {
        let mut s = scheduler(1, 1);
        let first = s.select_next(None, None);
        // Mention the agent that just spoke (in cooldown) -- should not win.
        let content = format!("@{first} again?");
        let second = s.select_next(Some(&content), None);
        assert_ne!(second, first);
    }
}
