pub mod config;
pub mod resolver;
pub mod types;

pub use config::ConfigLoader;
pub use resolver::VariableResolver;
pub use types::{Environment, RunpostConfig, VariableContext};
