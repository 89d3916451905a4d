pub mod classifier;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod exemption;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod signal;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    AppLauncher, Collaborators, PackageCatalog, PauseSurface, RewardLedger, StateStore,
    UsageStatsSource,
};
pub use config::EngineConfig;
pub use engine::{Decision, EngineStatus, InterventionEngine, OutcomeEffect, PackagePhase};
pub use error::EngineError;
pub use runtime::{spawn_engine, EngineHandle, SpawnedEngine};
pub use session::{PauseOutcome, PauseRequest, PauseSession, UsageSnapshot};
pub use signal::{ForegroundSignal, WindowKind};
