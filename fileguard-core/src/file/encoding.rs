use std::path::Path;

use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::error::FileGuardError;

/// Number of content bytes sampled when no BOM is present.
const SAMPLE_LEN: usize = 8 * 1024;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];
const UTF32_LE_BOM: [u8; 4] = [0xFF, 0xFE, 0x00, 0x00];

/// Best-effort classification of a file's byte encoding, used to choose the
/// codec for reading and for preserving encoding on write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedEncoding {
    Utf8NoBom,
    Utf8WithBom,
    Ascii,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    /// Caller asked for the platform default; treated as UTF-8 without BOM.
    SystemDefault,
    /// Caller asked for detection; resolved via `detect` before any I/O.
    AutoDetect,
}

impl DetectedEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8NoBom => "utf-8",
            Self::Utf8WithBom => "utf-8-bom",
            Self::Ascii => "us-ascii",
            Self::Utf16Le => "utf-16le",
            Self::Utf16Be => "utf-16be",
            Self::Utf32Le => "utf-32le",
            Self::SystemDefault => "system",
            Self::AutoDetect => "auto",
        }
    }
}

/// Classifies `path` from its BOM, falling back to an ASCII / strict-UTF-8
/// content sample. Never fails: unreadable or undecodable files classify as
/// UTF-8 without BOM.
pub async fn detect(path: &Path) -> DetectedEncoding {
    let Ok(mut file) = fs::File::open(path).await else {
        return DetectedEncoding::Utf8NoBom;
    };

    let mut sample = vec![0u8; SAMPLE_LEN];
    let mut filled = 0;
    loop {
        match file.read(&mut sample[filled..]).await {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                if filled == sample.len() {
                    break;
                }
            }
            Err(_) => return DetectedEncoding::Utf8NoBom,
        }
    }
    sample.truncate(filled);
    detect_bytes(&sample)
}

/// BOM and content classification on an in-memory sample.
pub fn detect_bytes(sample: &[u8]) -> DetectedEncoding {
    if sample.starts_with(&UTF8_BOM) {
        return DetectedEncoding::Utf8WithBom;
    }
    if sample.starts_with(&UTF32_LE_BOM) {
        return DetectedEncoding::Utf32Le;
    }
    if sample.starts_with(&UTF16_LE_BOM) {
        return DetectedEncoding::Utf16Le;
    }
    if sample.starts_with(&UTF16_BE_BOM) {
        return DetectedEncoding::Utf16Be;
    }
    if sample.iter().all(|b| *b <= 0x7F) {
        return DetectedEncoding::Ascii;
    }
    // Non-ASCII without a BOM: whether or not the sample is strict UTF-8 we
    // fall back to UTF-8, matching the permissive read path.
    DetectedEncoding::Utf8NoBom
}

/// Reads `path` as text using `encoding`. `AutoDetect` runs detection first;
/// `SystemDefault` reads as UTF-8.
pub async fn read_to_string(
    path: &Path,
    encoding: DetectedEncoding,
) -> Result<String, FileGuardError> {
    let encoding = match encoding {
        DetectedEncoding::AutoDetect => detect(path).await,
        other => other,
    };
    let bytes = fs::read(path).await.map_err(FileGuardError::io(path))?;
    Ok(decode(&bytes, encoding))
}

fn decode(bytes: &[u8], encoding: DetectedEncoding) -> String {
    match encoding {
        DetectedEncoding::Utf8NoBom
        | DetectedEncoding::Utf8WithBom
        | DetectedEncoding::Ascii
        | DetectedEncoding::SystemDefault
        | DetectedEncoding::AutoDetect => {
            // encoding_rs strips a leading UTF-8 BOM during decode.
            let (text, _, _) = encoding_rs::UTF_8.decode(bytes);
            text.into_owned()
        }
        DetectedEncoding::Utf16Le => {
            let (text, _, _) = encoding_rs::UTF_16LE.decode(bytes);
            text.into_owned()
        }
        DetectedEncoding::Utf16Be => {
            let (text, _, _) = encoding_rs::UTF_16BE.decode(bytes);
            text.into_owned()
        }
        DetectedEncoding::Utf32Le => decode_utf32_le(bytes),
    }
}

/// Writes `text` back in `encoding`, re-emitting the BOM for encodings that
/// were identified by one.
pub async fn write_string(
    path: &Path,
    text: &str,
    encoding: DetectedEncoding,
) -> Result<(), FileGuardError> {
    let bytes = encode(text, encoding);
    fs::write(path, bytes).await.map_err(FileGuardError::io(path))
}

fn encode(text: &str, encoding: DetectedEncoding) -> Vec<u8> {
    match encoding {
        DetectedEncoding::Utf8NoBom
        | DetectedEncoding::Ascii
        | DetectedEncoding::SystemDefault
        | DetectedEncoding::AutoDetect => text.as_bytes().to_vec(),
        DetectedEncoding::Utf8WithBom => {
            let mut out = UTF8_BOM.to_vec();
            out.extend_from_slice(text.as_bytes());
            out
        }
        // The Encoding Standard defines no UTF-16/32 encoders, so encoding_rs
        // cannot produce these; the code units are serialized directly.
        DetectedEncoding::Utf16Le => {
            let mut out = UTF16_LE_BOM.to_vec();
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            out
        }
        DetectedEncoding::Utf16Be => {
            let mut out = UTF16_BE_BOM.to_vec();
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_be_bytes());
            }
            out
        }
        DetectedEncoding::Utf32Le => {
            let mut out = UTF32_LE_BOM.to_vec();
            for ch in text.chars() {
                out.extend_from_slice(&(ch as u32).to_le_bytes());
            }
            out
        }
    }
}

fn decode_utf32_le(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (index, chunk) in bytes.chunks_exact(4).enumerate() {
        let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if index == 0 && value == 0xFEFF {
            continue;
        }
        out.push(char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    out
}
