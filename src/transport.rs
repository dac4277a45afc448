use crate::chunks::{chunks_for_blob, ChunkAssembler};
use crate::error::Result;
use crate::keys::Signature;
use crate::spend::UnsignedSpend;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use tracing::warn;

/// Compress, chunk and hex-encode a blob: one transcribable line per chunk.
pub fn encode_blob(blob: &[u8], max_chunk_size: usize) -> Result<Vec<String>> {
    let compressed = compress(blob)?;
    let chunks = chunks_for_blob(&compressed, max_chunk_size)?;
    Ok(chunks.iter().map(hex::encode).collect())
}

/// Decode one transcribed line back into its chunk bytes.
pub fn decode_blob_line(line: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(line.trim())?)
}

fn compress(blob: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(blob)?;
    Ok(encoder.finish()?)
}

fn decompress(blob: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(blob);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Parse a reassembled blob as an `UnsignedSpend`, inflating first when it
/// was compressed for transit and falling back to the raw bytes otherwise.
pub fn unsigned_spend_from_blob(blob: &[u8]) -> Result<UnsignedSpend> {
    if let Ok(inflated) = decompress(blob) {
        if let Ok(spend) = UnsignedSpend::from_bytes(&inflated) {
            return Ok(spend);
        }
    }
    UnsignedSpend::from_bytes(blob)
}

/// A finished signature travels back as a single hex line; at 96 bytes it
/// never needs chunking.
pub fn encode_signature(signature: &Signature) -> String {
    hex::encode(signature.to_bytes())
}

pub fn decode_signature(line: &str) -> Result<Signature> {
    Signature::from_slice(&decode_blob_line(line)?)
}

/// Reads transcribed chunk lines and yields each `UnsignedSpend` as soon as
/// all of its parts have arrived.
///
/// Assembly buffers are keyed by the declared part count, so two messages
/// relayed concurrently do not contaminate each other as long as their part
/// counts differ. Unparseable lines are logged and skipped; the loop keeps
/// waiting. An empty line or end of input ends the stream.
#[derive(Debug)]
pub struct SpendReader<R: BufRead> {
    reader: R,
    partial_encodings: HashMap<u8, ChunkAssembler>,
}

impl<R: BufRead> SpendReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            partial_encodings: HashMap::new(),
        }
    }

    /// Block until the next complete spend arrives, or until the input ends.
    pub fn next_spend(&mut self) -> Result<Option<UnsignedSpend>> {
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line)?;
            if read == 0 || line.trim().is_empty() {
                return Ok(None);
            }
            let blob = match decode_blob_line(&line) {
                Ok(blob) => blob,
                Err(err) => {
                    warn!(%err, "skipping unparseable chunk line");
                    continue;
                }
            };
            let part_count = match blob.last() {
                Some(count) => *count,
                None => {
                    warn!("skipping empty chunk line");
                    continue;
                }
            };
            let assembler = self
                .partial_encodings
                .entry(part_count)
                .or_insert_with(ChunkAssembler::new);
            if let Err(err) = assembler.add_chunk(blob) {
                warn!(%err, "skipping chunk that does not fit the message in progress");
                continue;
            }
            if assembler.is_assembled() {
                let blob = assembler.assemble()?;
                self.partial_encodings.remove(&part_count);
                // a blob that reassembles but will not parse is corrupt
                // beyond per-line recovery
                return unsigned_spend_from_blob(&blob).map(Some);
            }
        }
    }
}
