pub mod controller;
pub mod state;

pub use controller::{SessionTracker, TrackerConfig};
pub use state::{CompletionSignal, ReadingSession, SessionPhase, SessionSnapshot, TrackerError};
