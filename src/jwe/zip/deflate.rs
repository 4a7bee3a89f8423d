use std::fmt;
use std::io::{Read, Write};
use std::ops::Deref;

use anyhow::bail;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::jwe::JweCompression;
use crate::JoseError;

/// Inflate ceiling guarding against compression bombs.
const MAX_DECOMPRESSED_LEN: u64 = 16 * 1024 * 1024;

/// Raw DEFLATE (RFC 1951, no wrapper) payload compression.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum DeflateJweCompression {
    Deflate,
}

impl JweCompression for DeflateJweCompression {
    fn name(&self) -> &str {
        "DEF"
    }

    fn compress(&self, message: &[u8]) -> Result<Vec<u8>, JoseError> {
        (|| -> anyhow::Result<Vec<u8>> {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(message)?;
            Ok(encoder.finish()?)
        })()
        .map_err(JoseError::CompressionError)
    }

    fn decompress(&self, message: &[u8]) -> Result<Vec<u8>, JoseError> {
        (|| -> anyhow::Result<Vec<u8>> {
            let mut decoder = DeflateDecoder::new(message).take(MAX_DECOMPRESSED_LEN + 1);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            if out.len() as u64 > MAX_DECOMPRESSED_LEN {
                bail!("The decompressed size exceeds the limit.");
            }
            Ok(out)
        })()
        .map_err(JoseError::CompressionError)
    }

    fn box_clone(&self) -> Box<dyn JweCompression> {
        Box::new(*self)
    }
}

impl fmt::Display for DeflateJweCompression {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.name())
    }
}

impl Deref for DeflateJweCompression {
    type Target = dyn JweCompression;

    fn deref(&self) -> &Self::Target {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_round_trip() -> anyhow::Result<()> {
        let zip = DeflateJweCompression::Deflate;
        let input = b"test payload! test payload! test payload!".to_vec();
        let compressed = zip.compress(&input)?;
        let decompressed = zip.decompress(&compressed)?;
        assert_eq!(input, decompressed);
        Ok(())
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        let zip = DeflateJweCompression::Deflate;
        assert!(zip.decompress(&[0xff, 0xff, 0xff, 0x00]).is_err());
    }
}
