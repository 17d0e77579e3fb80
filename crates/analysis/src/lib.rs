pub mod affective;
pub mod basins;
pub mod metrics;
pub mod psi;
pub mod summarizer;

pub use basins::{CoherencePattern, DialogueContext};
pub use psi::{RawMetrics, StreamingAnalyzer, TurnState, ROLLING_WINDOW};
pub use summarizer::{summarize, ConfidenceIntervals, SessionSummary, ThresholdFlags};
