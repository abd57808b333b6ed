use ragbatch_core::{Chunk, ChunkId};

/// A contiguous, non-empty run of chunks submitted in one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Dispatch order, starting at 0.
    pub index: usize,
    /// Position of the first chunk in the run's input list.
    pub offset: usize,
    pub chunks: Vec<Chunk>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.chunks.iter().map(|c| c.id).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.chunks.iter().map(Chunk::embedding_text).collect()
    }
}

/// Split `chunks` into consecutive batches of `batch_size` (the last may be shorter).
///
/// Concatenating the result in index order yields `chunks` unchanged.
pub fn partition(chunks: &[Chunk], batch_size: usize) -> Vec<Batch> {
    let size = batch_size.max(1);
    chunks
        .chunks(size)
        .enumerate()
        .map(|(index, slice)| Batch { index, offset: index * size, chunks: slice.to_vec() })
        .collect()
}
