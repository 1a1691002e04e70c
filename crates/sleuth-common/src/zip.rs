//! Gzip helpers for frame bodies.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{codes, Error, Result};

/// Gzip magic header bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compresses `input` with gzip.
pub fn zip(input: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(input)?;
    encoder.finish()
}

/// Decompresses gzip `input`.
///
/// Inputs without the gzip magic header fail with `ERR_UNZIP` (932); a
/// corrupt stream past the header fails with `ERR_UNZIP_READ` (933).
pub fn unzip(input: &[u8]) -> Result<Vec<u8>> {
    if input.len() < GZIP_MAGIC.len() || input[..GZIP_MAGIC.len()] != GZIP_MAGIC {
        return Err(Error::new(codes::ERR_UNZIP, "input is not gzip data"));
    }
    let mut decoder = GzDecoder::new(input);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|err| Error::new(codes::ERR_UNZIP_READ, err.to_string()))?;
    Ok(output)
}
