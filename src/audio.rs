//! Joining encoded audio segments into one podcast file.

use crate::error::Result;
use crate::PipelineError;

/// Concatenates encoded audio segments in order.
pub trait AudioJoiner: Send + Sync {
    fn join(&self, segments: &[Vec<u8>]) -> Result<Vec<u8>>;
}

/// Appends MPEG frames back to back.
///
/// MPEG audio streams are self-synchronizing, so appending frames yields a
/// playable file. A leading ID3v2 tag on any segment after the first is
/// dropped so tag bytes don't end up mid-stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteAppendJoiner;

/// Length of a leading ID3v2 tag, header and footer included.
fn id3v2_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 10 || &bytes[..3] != b"ID3" {
        return None;
    }
    // Tag size is a 28-bit syncsafe integer.
    let size = bytes[6..10]
        .iter()
        .try_fold(0usize, |acc, &b| (b < 0x80).then_some((acc << 7) | b as usize))?;
    let footer = if bytes[5] & 0x10 != 0 { 10 } else { 0 };
    Some((10 + size + footer).min(bytes.len()))
}

impl AudioJoiner for ByteAppendJoiner {
    fn join(&self, segments: &[Vec<u8>]) -> Result<Vec<u8>> {
        if segments.is_empty() {
            return Err(PipelineError::Other("no audio segments to join".into()));
        }
        let total = segments.iter().map(Vec::len).sum();
        let mut out = Vec::with_capacity(total);
        for (i, segment) in segments.iter().enumerate() {
            let skip = if i == 0 { 0 } else { id3v2_len(segment).unwrap_or(0) };
            out.extend_from_slice(&segment[skip..]);
        }
        Ok(out)
    }
}
