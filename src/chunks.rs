use crate::error::{Error, Result};

/// The part count travels in a single trailing byte, so a blob may split
/// into at most this many chunks.
pub const MAX_CHUNK_COUNT: usize = 255;

/// How many chunks a blob of `blob_len` bytes needs under `max_chunk_size`
/// bytes of payload per chunk. Always at least one, even for an empty blob.
pub fn chunk_count(blob_len: usize, max_chunk_size: usize) -> Result<usize> {
    assert!(max_chunk_size > 0);
    let needed = (blob_len + max_chunk_size - 1) / max_chunk_size;
    let needed = needed.max(1);
    if needed > MAX_CHUNK_COUNT {
        return Err(Error::TooManyChunks { needed });
    }
    Ok(needed)
}

/// The near-equal payload size actually used once the minimal chunk count is
/// known; never larger than `max_chunk_size`.
pub fn optimal_chunk_size(blob_len: usize, max_chunk_size: usize) -> Result<usize> {
    let count = chunk_count(blob_len, max_chunk_size)?;
    Ok((blob_len + count - 1) / count)
}

/// Split a blob into the minimal number of near-equal ordered chunks, each
/// suffixed with its index and the total part count.
pub fn chunks_for_blob(blob: &[u8], max_chunk_size: usize) -> Result<Vec<Vec<u8>>> {
    let count = chunk_count(blob.len(), max_chunk_size)?;
    let mut chunks = Vec::with_capacity(count);
    for index in 0..count {
        let start = blob.len() * index / count;
        let end = blob.len() * (index + 1) / count;
        let mut chunk = blob[start..end].to_vec();
        chunk.push(index as u8);
        chunk.push(count as u8);
        chunks.push(chunk);
    }
    Ok(chunks)
}

fn chunk_metadata(chunk: &[u8]) -> Result<(u8, u8)> {
    if chunk.len() < 2 {
        return Err(Error::ChunkTooShort);
    }
    let index = chunk[chunk.len() - 2];
    let total = chunk[chunk.len() - 1];
    if total == 0 || index >= total {
        return Err(Error::ChunkMismatch);
    }
    Ok((index, total))
}

/// Reassembles one chunked message. Chunks may arrive in any order;
/// duplicates are ignored, and a chunk carrying a different total count than
/// the ones already held is rejected as belonging to some other message.
#[derive(Clone, Debug, Default)]
pub struct ChunkAssembler {
    chunks: Vec<Vec<u8>>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chunk(&mut self, chunk: Vec<u8>) -> Result<()> {
        let (index, total) = chunk_metadata(&chunk)?;
        if let Some(first) = self.chunks.first() {
            let (_, held_total) = chunk_metadata(first)?;
            if total != held_total {
                return Err(Error::ChunkMismatch);
            }
        }
        match self.chunks.iter().find(|held| {
            held[held.len() - 2] == index
        }) {
            Some(held) if *held == chunk => Ok(()), // retransmission, ignore
            Some(_) => Err(Error::ChunkMismatch),
            None => {
                self.chunks.push(chunk);
                Ok(())
            }
        }
    }

    pub fn is_assembled(&self) -> bool {
        match self.chunks.first() {
            Some(first) => self.chunks.len() == usize::from(first[first.len() - 1]),
            None => false,
        }
    }

    /// Concatenate payloads in index order. All indices `0..total` are
    /// present once `is_assembled` holds, since duplicates and foreign
    /// totals never make it into the buffer.
    pub fn assemble(&self) -> Result<Vec<u8>> {
        if !self.is_assembled() {
            return Err(Error::ChunkMismatch);
        }
        let mut ordered: Vec<&Vec<u8>> = self.chunks.iter().collect();
        ordered.sort_by_key(|chunk| chunk[chunk.len() - 2]);
        let mut blob = Vec::new();
        for chunk in ordered {
            blob.extend_from_slice(&chunk[..chunk.len() - 2]);
        }
        Ok(blob)
    }
}
