pub mod types;

pub use types::{ApiKeyLocation, AuthConfig, Collection, Folder, KeyValue, SavedRequest};

use crate::Result;
use std::path::Path;

/// 从 JSON 文件加载集合
pub fn load_collection<P: AsRef<Path>>(path: P) -> Result<Collection> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let collection: Collection = serde_json::from_str(&content)?;
    tracing::debug!(
        collection = %collection.name,
        requests = collection.request_count(),
        "Collection loaded"
    );
    Ok(collection)
}
