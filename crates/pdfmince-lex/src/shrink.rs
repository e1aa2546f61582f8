use std::io::{Read, Write};

use anyhow::{anyhow, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;
use tracing::{debug, warn};

use crate::lexer::{ItemKind, Lexer};

#[derive(Debug, Clone, Copy)]
pub struct ShrinkOptions {
    /// Maximum decoded stream body length in bytes.
    pub max: usize,
    /// Abort on decode failures instead of falling back to raw truncation.
    pub strict: bool,
}

impl Default for ShrinkOptions {
    fn default() -> Self {
        Self { max: 128, strict: false }
    }
}

#[derive(Debug, Error)]
pub enum ShrinkError {
    #[error("ASCII85 decode failed: {0}")]
    Ascii85(String),
    #[error("Flate decode failed: {0}")]
    Flate(String),
    #[error("lex error at byte {pos}: {msg}")]
    Lex { pos: usize, msg: String },
}

/// Truncates oversized stream bodies in a PDF byte buffer, round-tripping
/// `/ASCII85Decode` and `/FlateDecode` payloads so the shrunk stream is
/// still decodable. Every token that is not a stream body passes through
/// byte for byte. Filter flags are tracked per stream and cleared after
/// each body, whatever the outcome.
pub fn shrink_streams(name: &str, input: &[u8], opts: &ShrinkOptions) -> Result<Vec<u8>> {
    let mut lexer = Lexer::new(name, input);
    let mut out = Vec::with_capacity(input.len());
    let mut zipped = false;
    let mut asc85 = false;
    loop {
        let item = lexer.next_item();
        match item.kind {
            ItemKind::Eof => break,
            ItemKind::Error => {
                return Err(ShrinkError::Lex {
                    pos: item.pos,
                    msg: item.val_lossy().into_owned(),
                }
                .into());
            }
            ItemKind::Name => {
                match item.val.as_ref() {
                    b"/FlateDecode" => zipped = true,
                    b"/ASCII85Decode" => asc85 = true,
                    _ => {}
                }
                out.extend_from_slice(&item.val);
            }
            ItemKind::StreamBody => {
                let body = shrink_body(name, &item.val, zipped, asc85, opts)?;
                out.extend_from_slice(&body);
                zipped = false;
                asc85 = false;
            }
            _ => out.extend_from_slice(&item.val),
        }
    }
    Ok(out)
}

fn shrink_body(
    name: &str,
    raw: &[u8],
    zipped: bool,
    asc85: bool,
    opts: &ShrinkOptions,
) -> Result<Vec<u8>, ShrinkError> {
    // Only max + 1 decoded bytes are ever needed: enough to tell "fits"
    // from "exceeds" and to fill the truncated payload.
    let cap = opts.max.saturating_add(1);
    let mut decoded = raw.to_vec();
    if asc85 {
        match decode_ascii85(&decoded) {
            Ok(data) => decoded = data,
            Err(err) => {
                return fallback(name, raw, opts, ShrinkError::Ascii85(err.to_string()))
            }
        }
    }
    if zipped {
        match decode_flate(&decoded, cap) {
            Ok(data) => decoded = data,
            Err(err) => return fallback(name, raw, opts, ShrinkError::Flate(err.to_string())),
        }
    }
    if decoded.len() <= opts.max {
        return Ok(raw.to_vec());
    }
    decoded.truncate(opts.max);
    let mut body = decoded;
    if zipped {
        body = encode_flate(&body)?;
    }
    if asc85 {
        body = encode_ascii85(&body);
    }
    Ok(body)
}

fn fallback(
    name: &str,
    raw: &[u8],
    opts: &ShrinkOptions,
    err: ShrinkError,
) -> Result<Vec<u8>, ShrinkError> {
    if opts.strict {
        return Err(err);
    }
    warn!(
        input = name,
        domain = "pdf.shrink",
        kind = "decode_failed",
        error = %err,
        "Stream body did not decode, truncating raw bytes"
    );
    if raw.len() <= opts.max {
        Ok(raw.to_vec())
    } else {
        Ok(raw[..opts.max].to_vec())
    }
}

fn decode_flate(data: &[u8], max_out: usize) -> Result<Vec<u8>> {
    match read_bounded(ZlibDecoder::new(data), max_out) {
        Ok(out) => Ok(out),
        Err(zlib_err) => match read_bounded(DeflateDecoder::new(data), max_out) {
            Ok(out) => {
                debug!(
                    domain = "pdf.shrink",
                    kind = "raw_deflate_recovered",
                    "Stream decoded as raw deflate"
                );
                Ok(out)
            }
            Err(deflate_err) => Err(anyhow!("zlib: {}; deflate: {}", zlib_err, deflate_err)),
        },
    }
}

fn read_bounded<R: Read>(mut decoder: R, max_out: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = decoder.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if out.len() + n > max_out {
            let remaining = max_out - out.len();
            out.extend_from_slice(&buf[..remaining]);
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}

fn encode_flate(data: &[u8]) -> Result<Vec<u8>, ShrinkError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(|e| ShrinkError::Flate(e.to_string()))?;
    encoder.finish().map_err(|e| ShrinkError::Flate(e.to_string()))
}

/// Decodes an ASCII85 payload. Whitespace is skipped and `~` ends the
/// data; anything outside the `!`..`u` alphabet (or a misplaced `z`) is an
/// error so strict mode has something to abort on.
pub fn decode_ascii85(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut tuple: Vec<u8> = Vec::with_capacity(5);
    for &b in data {
        if b == b'~' {
            break;
        }
        if b.is_ascii_whitespace() {
            continue;
        }
        if b == b'z' {
            if !tuple.is_empty() {
                return Err(anyhow!("'z' inside an ASCII85 group"));
            }
            out.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        if !(b'!'..=b'u').contains(&b) {
            return Err(anyhow!("invalid ASCII85 byte 0x{:02x}", b));
        }
        tuple.push(b);
        if tuple.len() == 5 {
            out.extend_from_slice(&group_value(&tuple)?.to_be_bytes());
            tuple.clear();
        }
    }
    if tuple.len() == 1 {
        return Err(anyhow!("truncated ASCII85 group"));
    }
    if !tuple.is_empty() {
        let padding = 5 - tuple.len();
        for _ in 0..padding {
            tuple.push(b'u');
        }
        let value = group_value(&tuple)?;
        out.extend_from_slice(&value.to_be_bytes()[..4 - padding]);
    }
    Ok(out)
}

fn group_value(tuple: &[u8]) -> Result<u32> {
    let mut value: u32 = 0;
    for &c in tuple {
        value = value
            .checked_mul(85)
            .and_then(|v| v.checked_add((c - b'!') as u32))
            .ok_or_else(|| anyhow!("ASCII85 group overflow"))?;
    }
    Ok(value)
}

/// Encodes bytes as ASCII85 with the `z` shortcut for all-zero groups and
/// the `~>` end marker.
pub fn encode_ascii85(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 * 5 + 2);
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let value = u32::from_be_bytes(word);
        if value == 0 && chunk.len() == 4 {
            out.push(b'z');
            continue;
        }
        let mut group = [0u8; 5];
        let mut v = value;
        for slot in group.iter_mut().rev() {
            *slot = (v % 85) as u8 + b'!';
            v /= 85;
        }
        out.extend_from_slice(&group[..chunk.len() + 1]);
    }
    out.extend_from_slice(b"~>");
    out
}
