//! Transparent decompression for probed source objects.
//!
//! Source files are often shipped compressed. The codec is chosen from the
//! object's extension, and decoding is lenient about truncation because the
//! prober only ever reads the head of an object.

use std::io::{BufRead, BufReader};

/// Compression codec of a source object, derived from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Pick a codec from the object key's extension.
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".gz") || lower.ends_with(".gzip") {
            Compression::Gzip
        } else if lower.ends_with(".zst") || lower.ends_with(".zstd") {
            Compression::Zstd
        } else {
            Compression::None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
        }
    }

    /// Wrap `data` in a decoding line reader.
    pub fn reader<'a>(&self, data: &'a [u8]) -> std::io::Result<Box<dyn BufRead + 'a>> {
        Ok(match self {
            Compression::None => Box::new(data),
            Compression::Gzip => Box::new(BufReader::new(flate2::read::GzDecoder::new(data))),
            Compression::Zstd => Box::new(BufReader::new(zstd::stream::Decoder::with_buffer(data)?)),
        })
    }

    /// Decode as many complete lines as `data` yields.
    ///
    /// Stops at the first decode error, which is expected when `data` is a
    /// truncated prefix of a larger compressed object. Trailing `\r` is
    /// stripped. An error is returned only if nothing could be decoded at all.
    pub fn lines(&self, data: &[u8]) -> std::io::Result<Vec<String>> {
        let reader = self.reader(data)?;
        let mut lines = Vec::new();
        let mut first_error = None;

        for line in reader.split(b'\n') {
            match line {
                Ok(bytes) => {
                    let mut text = String::from_utf8_lossy(&bytes).into_owned();
                    if text.ends_with('\r') {
                        text.pop();
                    }
                    lines.push(text);
                }
                Err(e) => {
                    first_error = Some(e);
                    break;
                }
            }
        }

        match first_error {
            Some(e) if lines.is_empty() && !data.is_empty() => Err(e),
            _ => Ok(lines),
        }
    }
}
