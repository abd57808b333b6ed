//! Domain types shared by the embedders and the batch pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Stable identity of a chunk: the owning document plus its position in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub document: Uuid,
    pub index: usize,
}

impl ChunkId {
    pub fn new(document: Uuid, index: usize) -> Self {
        Self { document, index }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document, self.index)
    }
}

/// A unit of document text produced upstream and consumed read-only here.
///
/// - `id`: document UUID + chunk index
/// - `content`: the text payload of the chunk
/// - `metadata`: optional document header prepended to the text at embed time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl Chunk {
    pub fn new(id: ChunkId, content: impl Into<String>) -> Self {
        Self { id, content: content.into(), metadata: None }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Text actually sent to the embedder.
    pub fn embedding_text(&self) -> String {
        match self.metadata.as_deref() {
            Some(meta) if !meta.trim().is_empty() => format!("{}\n{}", meta, self.content),
            _ => self.content.clone(),
        }
    }

    /// Parse one line of the chunk JSONL interchange format.
    ///
    /// `line` is 1-based and only used for error reporting.
    pub fn from_json_line(line: usize, raw: &str) -> Result<Self> {
        let record: ChunkRecord = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidChunk { line, reason: e.to_string() })?;
        if record.content.trim().is_empty() {
            return Err(Error::InvalidChunk { line, reason: "content is empty".to_string() });
        }
        Ok(record.into())
    }
}

/// Flat on-disk form of a chunk, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<String>,
}

impl From<ChunkRecord> for Chunk {
    fn from(r: ChunkRecord) -> Self {
        Self { id: ChunkId::new(r.document_id, r.chunk_index), content: r.content, metadata: r.metadata }
    }
}

/// A vector paired with the chunk it belongs to.
///
/// `position` is the chunk's index in the list handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub id: ChunkId,
    pub position: usize,
    pub vector: Vec<f32>,
}
