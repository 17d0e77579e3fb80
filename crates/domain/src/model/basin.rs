use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// The nine canonical attractor labels (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasinLabel {
    DeepResonance,
    CollaborativeInquiry,
    CognitiveMimicry,
    ReflexivePerformance,
    SycophanticConvergence,
    CreativeDilation,
    GenerativeConflict,
    Dissociation,
    Transitional,
}

impl BasinLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BasinLabel::DeepResonance => "deep_resonance",
            BasinLabel::CollaborativeInquiry => "collaborative_inquiry",
            BasinLabel::CognitiveMimicry => "cognitive_mimicry",
            BasinLabel::ReflexivePerformance => "reflexive_performance",
            BasinLabel::SycophanticConvergence => "sycophantic_convergence",
            BasinLabel::CreativeDilation => "creative_dilation",
            BasinLabel::GenerativeConflict => "generative_conflict",
            BasinLabel::Dissociation => "dissociation",
            BasinLabel::Transitional => "transitional",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BasinHistoryEntry {
    pub turn: u64,
    pub label: BasinLabel,
    pub confidence: f64,
}

/// Ordered record of basin classifications across a session, with a
/// running transition count (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasinHistory {
    pub entries: Vec<BasinHistoryEntry>,
    pub transition_count: u64,
}

impl BasinHistory {
    pub fn current(&self) -> Option<&BasinHistoryEntry> {
        self.entries.last()
    }

    /// Consecutive turns the current basin has held, used by the hysteresis
    /// modulation in §4.11.
    pub fn current_streak(&self) -> u64 {
        let Some(last) = self.entries.last() else {
            return 0;
        };
        self.entries
            .iter()
            .rev()
            .take_while(|e| e.label.as_str() == last.label.as_str())
            .count() as u64
    }

    pub fn push(&mut self, turn: u64, label: BasinLabel, confidence: f64) {
        if let Some(prev) = self.entries.last() {
            if prev.label.as_str() != label.as_str() {
                self.transition_count += 1;
            }
        }
        self.entries.push(BasinHistoryEntry {
            turn,
            label,
            confidence,
        });
    }

    /// Invariant: transition_count equals the number of adjacent differing
    /// labels in the sequence (§3).
    pub fn transition_count_is_consistent(&self) -> bool {
        let recomputed = self
            .entries
            .windows(2)
            .filter(|w| w[0].label.as_str() != w[1].label.as_str())
            .count() as u64;
        recomputed == self.transition_count
    }
}

/// The Ψ-vector: `(psi_semantic, psi_temporal, psi_affective)`, each
/// roughly in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Psi {
    pub semantic: f64,
    pub temporal: f64,
    pub affective: f64,
}

/// Fixed-capacity ring buffer of recent Ψ-vectors, owned by the Streaming
/// Analyzer (§3, §9: arena+index ring, not a pointer chain).
#[derive(Debug, Clone)]
pub struct TrajectoryBuffer {
    capacity: usize,
    buf: VecDeque<Psi>,
}

impl TrajectoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buf: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, psi: Psi) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(psi);
    }

    pub fn as_slice_vec(&self) -> Vec<Psi> {
        self.buf.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_count_increments_on_label_change() {
        let mut history = BasinHistory::default();
        history.push(1, BasinLabel::Transitional, 0.3);
        history.push(2, BasinLabel::Transitional, 0.3);
        history.push(3, BasinLabel::DeepResonance, 0.8);
        assert_eq!(history.transition_count, 1);
        assert!(history.transition_count_is_consistent());
    }

    #[test]
    fn current_streak_counts_consecutive_same_label() {
        let mut history = BasinHistory::default();
        history.push(1, BasinLabel::Transitional, 0.3);
        history.push(2, BasinLabel::Transitional, 0.3);
        history.push(3, BasinLabel::Transitional, 0.3);
        assert_eq!(history.current_streak(), 3);
    }

    #[test]
    fn trajectory_buffer_evicts_oldest_beyond_capacity() {
        let mut buf = TrajectoryBuffer::new(2);
        buf.push(Psi { semantic: 1.0, temporal: 0.0, affective: 0.0 });
        buf.push(Psi { semantic: 2.0, temporal: 0.0, affective: 0.0 });
        buf.push(Psi { semantic: 3.0, temporal: 0.0, affective: 0.0 });
        let values: Vec<f64> = buf.as_slice_vec().iter().map(|p| p.semantic).collect();
        assert_eq!(values, vec![2.0, 3.0]);
    }
}
