pub mod assertion;
pub mod chaos;
pub mod collection;
pub mod contract;
pub mod dataset;
pub mod error;
pub mod flow;
pub mod http;
pub mod logger;
pub mod perf;
pub mod planner;
pub mod recorder;
pub mod report;
pub mod runner;
pub mod script;
pub mod storage;
pub mod transport;
pub mod variable;

// Re-export commonly used types
pub use collection::{Collection, SavedRequest, load_collection};
pub use error::{Result, RunpostError};
pub use report::{render_json_report, render_text_report};
pub use runner::{CollectionRunner, RunnerOptions, RunnerResult};
pub use transport::{Transport, TransportError, TransportRegistry};
