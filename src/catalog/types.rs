use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::range::Range;

pub type FileId = i64;
pub type VersionId = i64;
pub type LayerId = i64;

#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: i64,
    pub layer_id: LayerId,
    pub layer_range: Range,
    pub file_range: Range,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerHeader {
    pub id: LayerId,
    pub file_id: FileId,
    pub version_id: Option<VersionId>,
    pub object_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LayerWithChunks {
    pub layer: LayerHeader,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub id: VersionId,
    pub tag: String,
    pub created_at: DateTime<Utc>,
}
