pub mod engine;
pub mod executor;
pub mod options;
pub mod reporter;
pub mod scheduler;
pub mod types;

pub use engine::CollectionRunner;
pub use options::{
    ChaosOptions, ContractOptions, PerformanceOptions, RecorderOptions, RunMode, RunnerOptions,
};
pub use reporter::ConsoleReporter;
pub use scheduler::ProgressFn;
pub use types::{ContractOutcome, EffectiveMode, RunnerRequestResult, RunnerResult};
