//! Match scheduling: life cycle state machine and the driver around it

pub mod lifecycle;
pub mod service;

pub use lifecycle::{AdmissionError, FinishReason, MatchPhase, MatchStatus, PlayerHandle};
pub use service::{Collaborators, JoinProfile, LifecycleObserver, MatchSlot, Scheduler};
