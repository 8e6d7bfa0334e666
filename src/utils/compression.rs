//! Message data compression.
//!
//! The message envelope sets its compressed-data flag only when the compressed
//! body is actually smaller than the original, so decoders must always consult
//! the flag. Decompression output is capped to stop decompression bombs.

use crate::core::packet::MAX_PACKET_SIZE;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    Lz4,
    #[default]
    Zstd,
}

/// Upper bound on decompressed output; a data body can never legitimately
/// exceed what one packet could carry uncompressed.
pub const MAX_DECOMPRESSION_SIZE: usize = MAX_PACKET_SIZE;

/// Compresses data using the specified algorithm
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if compression fails
pub fn compress(data: &[u8], kind: CompressionKind) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionKind::Zstd => {
            let mut out = Vec::new();
            zstd::stream::copy_encode(data, &mut out, 1)
                .map_err(|_| ProtocolError::CompressionFailure)?;
            Ok(out)
        }
    }
}

/// Decompresses data, refusing output larger than [`MAX_DECOMPRESSION_SIZE`]
///
/// # Errors
/// Returns `ProtocolError::DecompressionFailure` on malformed input or when the
/// output would exceed the limit
pub fn decompress(data: &[u8], kind: CompressionKind) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::Lz4 => {
            // lz4_flex prepends the uncompressed size as u32 little-endian;
            // check it before the library allocates.
            if data.len() < 4 {
                return Err(ProtocolError::DecompressionFailure);
            }
            let claimed = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
            if claimed > MAX_DECOMPRESSION_SIZE {
                return Err(ProtocolError::DecompressionFailure);
            }
            lz4_flex::decompress_size_prepended(data)
                .map_err(|_| ProtocolError::DecompressionFailure)
        }
        CompressionKind::Zstd => {
            let reader = zstd::stream::Decoder::new(data)
                .map_err(|_| ProtocolError::DecompressionFailure)?;
            let mut out = Vec::new();
            reader
                .take(MAX_DECOMPRESSION_SIZE as u64 + 1)
                .read_to_end(&mut out)
                .map_err(|_| ProtocolError::DecompressionFailure)?;
            if out.len() > MAX_DECOMPRESSION_SIZE {
                return Err(ProtocolError::DecompressionFailure);
            }
            Ok(out)
        }
    }
}

/// Compress when the input is at least `threshold_bytes` long and the result is
/// smaller. Returns the bytes to send and whether they are compressed.
pub fn compress_if_smaller(
    data: &[u8],
    kind: CompressionKind,
    threshold_bytes: usize,
) -> Result<(Vec<u8>, bool)> {
    if data.is_empty() || data.len() < threshold_bytes {
        return Ok((data.to_vec(), false));
    }
    let compressed = compress(data, kind)?;
    if compressed.len() < data.len() {
        Ok((compressed, true))
    } else {
        Ok((data.to_vec(), false))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_zstd_shrinks_repetitive_data() {
        let data = vec![7u8; 4096];
        let (out, compressed) = compress_if_smaller(&data, CompressionKind::Zstd, 0).unwrap();
        assert!(compressed);
        assert!(out.len() < data.len());
        assert_eq!(decompress(&out, CompressionKind::Zstd).unwrap(), data);
    }

    #[test]
    fn test_lz4_shrinks_repetitive_data() {
        let data = b"position:1,1;".repeat(64);
        let (out, compressed) = compress_if_smaller(&data, CompressionKind::Lz4, 0).unwrap();
        assert!(compressed);
        assert_eq!(decompress(&out, CompressionKind::Lz4).unwrap(), data);
    }

    #[test]
    fn test_below_threshold_left_alone() {
        let (out, compressed) = compress_if_smaller(b"tiny", CompressionKind::Zstd, 64).unwrap();
        assert!(!compressed);
        assert_eq!(out, b"tiny");
    }

    #[test]
    fn test_incompressible_data_left_alone() {
        let data = [0x42u8];
        let (out, compressed) = compress_if_smaller(&data, CompressionKind::Zstd, 0).unwrap();
        assert!(!compressed);
        assert_eq!(out, data);
    }

    #[test]
    fn test_lz4_oversized_claim_rejected() {
        let mut malicious = ((MAX_DECOMPRESSION_SIZE + 1) as u32).to_le_bytes().to_vec();
        malicious.extend_from_slice(&[0u8; 16]);
        assert!(decompress(&malicious, CompressionKind::Lz4).is_err());
    }

    #[test]
    fn test_short_and_garbage_input_rejected() {
        assert!(decompress(&[0x2b, 0x60], CompressionKind::Lz4).is_err());
        assert!(decompress(b"not zstd at all", CompressionKind::Zstd).is_err());
    }
}
