//! Core engine: the alternating swap loop and its run lifecycle.

pub mod cancel;
pub mod controller;
pub mod events;
pub mod executor;
pub mod orchestrator;

pub use cancel::RunFlag;
pub use controller::{ControlError, RunController};
pub use events::EventLog;
pub use executor::{SwapClient, SwapExecutor};
pub use orchestrator::Orchestrator;
