//! Resource catalog entries. Read-only from the workflow's point of view.

use serde::{Deserialize, Serialize};

/// A curated resource shown after diagnosis. `kind` is an open set
/// (guide, tool, service, coach, ...), so it stays a plain string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub url: String,
}
