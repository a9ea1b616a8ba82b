//! The active-layer memtable: a per-file, in-memory buffer of unflushed
//! bytes plus the chunk index describing how those bytes were written.

use std::collections::HashMap;

use bytes::Bytes;

use crate::catalog::FileId;
use crate::range::Range;

/// A chunk recorded against the active layer. Unlike a persisted [`Chunk`],
/// this one is never written to the catalog until checkpoint time.
#[derive(Debug, Clone)]
pub struct ActiveChunk {
    pub layer_range: Range,
    pub file_range: Range,
}

/// The unflushed write buffer for one file.
///
/// Invariant: `buffer.len() as u64 == size == (last chunk's layer_range.hi,
/// or 0 if chunks is empty)`. The buffer only ever grows by append; the only
/// way to shrink it is to drop the whole `ActiveLayer` at checkpoint.
#[derive(Debug, Default)]
pub struct ActiveLayer {
    pub buffer: Vec<u8>,
    pub chunks: Vec<ActiveChunk>,
}

impl ActiveLayer {
    pub fn size(&self) -> u64 {
        self.chunks.last().map(|c| c.layer_range.hi).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Appends a zero-pad chunk covering `[current_size, target)` in file
    /// space, materializing the zero bytes in the buffer.
    pub fn append_zero_pad(&mut self, file_lo: u64, file_hi: u64) {
        let width = file_hi - file_lo;
        if width == 0 {
            return;
        }
        let layer_lo = self.size();
        self.buffer.resize(self.buffer.len() + width as usize, 0);
        self.chunks.push(ActiveChunk {
            layer_range: Range::new(layer_lo, layer_lo + width),
            file_range: Range::new(file_lo, file_hi),
        });
    }

    /// Appends a data chunk, copying `data` into the buffer.
    pub fn append_data(&mut self, file_lo: u64, data: &[u8]) {
        let width = data.len() as u64;
        if width == 0 {
            return;
        }
        let layer_lo = self.size();
        self.buffer.extend_from_slice(data);
        self.chunks.push(ActiveChunk {
            layer_range: Range::new(layer_lo, layer_lo + width),
            file_range: Range::new(file_lo, file_lo + width),
        });
    }

    /// Active-layer end: `max(chunk.file_range.hi)`, or 0 if there are no
    /// chunks.
    pub fn file_end(&self) -> u64 {
        self.chunks.iter().map(|c| c.file_range.hi).max().unwrap_or(0)
    }

    pub fn slice(&self, range: Range) -> Bytes {
        Bytes::copy_from_slice(&self.buffer[range.lo as usize..range.hi as usize])
    }
}

/// Process-wide map of `file_id -> active layer`, held behind the storage
/// manager's single reader/writer lock (see `manager.rs`).
#[derive(Debug, Default)]
pub struct Memtable {
    layers: HashMap<FileId, ActiveLayer>,
}

impl Memtable {
    pub fn get(&self, file_id: FileId) -> Option<&ActiveLayer> {
        self.layers.get(&file_id)
    }

    pub fn get_or_create(&mut self, file_id: FileId) -> &mut ActiveLayer {
        self.layers.entry(file_id).or_default()
    }

    /// Number of files currently holding a (possibly empty) active layer.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Destroys the active layer for `file_id` after a successful
    /// checkpoint.
    pub fn remove(&mut self, file_id: FileId) {
        self.layers.remove(&file_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pad_then_data_preserves_size_invariant() {
        let mut layer = ActiveLayer::default();
        layer.append_zero_pad(0, 10);
        layer.append_data(10, b"XY");

        assert_eq!(layer.buffer.len() as u64, layer.size());
        assert_eq!(layer.size(), 12);
        assert_eq!(layer.file_end(), 12);
        assert_eq!(&layer.buffer[..10], &[0u8; 10]);
        assert_eq!(&layer.buffer[10..], b"XY");
    }

    #[test]
    fn zero_width_pad_is_a_no_op() {
        let mut layer = ActiveLayer::default();
        layer.append_data(0, b"hi");
        layer.append_zero_pad(2, 2);
        assert_eq!(layer.chunks.len(), 1);
        assert_eq!(layer.size(), 2);
    }

    #[test]
    fn empty_layer_has_zero_size() {
        let layer = ActiveLayer::default();
        assert_eq!(layer.size(), 0);
        assert_eq!(layer.file_end(), 0);
        assert!(layer.is_empty());
    }
}
