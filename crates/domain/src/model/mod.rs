pub mod basin;
pub mod ensemble;
pub mod event;
pub mod persona;
pub mod personality;
pub mod session;
pub mod turn;

pub use basin::{BasinHistory, BasinHistoryEntry, BasinLabel, Psi, TrajectoryBuffer};
pub use ensemble::{
    AgentBinding, AgentSpec, DialogueConfig, EmbeddingStorageMode, EnsembleConfig, EnsembleMode,
    SamplingParams,
};
pub use event::{ErrorEventPayload, Event, MetricsEventPayload, StateEventPayload, TurnEventPayload};
pub use persona::{Persona, PersonaDoc, TemplateDoc, VoiceGuidance};
pub use personality::{Personality, PersonalityOverride};
pub use session::{SessionRecord, SessionState, SessionTotals};
pub use turn::{Interjection, TurnError, TurnRecord};
