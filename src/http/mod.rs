pub mod client;
pub mod request;
pub mod response;
pub mod serialization;
pub mod types;

// Re-export commonly used types for convenient access
pub use client::HttpTransport;
pub use request::{BasicCredentials, ResolvedRequest};
pub use response::Response;
pub use types::{Method, Status, normalize_url};
