//! Infrastructure layer: configuration, collaborator adapters and the engine facade.

pub mod config;
pub mod engine;
pub mod memory;

pub use config::EngineConfig;
pub use engine::{BanOutcome, MembershipEngine, Standing};
