use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LayerFsError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("version not found: file={file}, tag={tag}")]
    VersionNotFound { file: String, tag: String },

    #[error("file {0} is read-only (head is set); call delete_head to make it writable again")]
    ReadOnly(String),

    #[error("invalid range text from catalog: {0:?}")]
    InvalidRange(String),

    #[error("corrupt chunk: object store returned {got} bytes, expected {expected}")]
    CorruptChunk { expected: u64, got: u64 },

    #[error("catalog error during {operation} on {file}: {source}")]
    CatalogError {
        operation: &'static str,
        file: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("catalog pool error: {0}")]
    CatalogPoolError(#[from] r2d2::Error),

    #[error("object store error during {operation} on {key}: {message}")]
    ObjectStoreError {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("operation cancelled: {0}")]
    Cancelled(&'static str),
}

impl LayerFsError {
    pub fn catalog(operation: &'static str, file: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::CatalogError {
            operation,
            file: file.into(),
            source,
        }
    }

    pub fn object_store(operation: &'static str, key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::ObjectStoreError {
            operation,
            key: key.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LayerFsError>;
