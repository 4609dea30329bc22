//! Trace file encoding.
//!
//! The default format is a single zstd frame holding `postcard(XSpace)`; the
//! JSON format is meant for inspection by hand.

use std::fs;
use std::io;
use std::path::Path;

use clap::ValueEnum;
use profsession_core::XSpace;

const ZSTD_LEVEL: i32 = 3;

/// On-disk trace format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// zstd-compressed postcard.
    Zstd,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Zstd => "xspace.zst",
            OutputFormat::Json => "xspace.json",
        }
    }
}

/// Encodes `space` in `format`.
pub fn encode_xspace(space: &XSpace, format: OutputFormat) -> io::Result<Vec<u8>> {
    match format {
        OutputFormat::Zstd => {
            let raw = postcard::to_allocvec(space)
                .map_err(|e| io::Error::other(format!("postcard serialize: {}", e)))?;
            zstd::encode_all(raw.as_slice(), ZSTD_LEVEL)
        }
        OutputFormat::Json => serde_json::to_vec_pretty(space).map_err(io::Error::other),
    }
}

/// Writes `space` to `path`, returning the number of bytes written.
pub fn write_xspace(path: &Path, space: &XSpace, format: OutputFormat) -> io::Result<usize> {
    let bytes = encode_xspace(space, format)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &bytes)?;
    Ok(bytes.len())
}

/// Reads a trace written with [`OutputFormat::Zstd`].
#[cfg(test)]
pub fn read_xspace(path: &Path) -> io::Result<XSpace> {
    let compressed = fs::read(path)?;
    let raw = zstd::decode_all(compressed.as_slice())?;
    postcard::from_bytes(&raw).map_err(|e| io::Error::other(format!("postcard deserialize: {}", e)))
}
