//! Inspecting the head of source objects: emptiness and header rows.

use regex::Regex;
use snafu::prelude::*;
use snowdrift_core::emit;
use snowdrift_core::metrics::events::{ObjectProbed, ProbeOutcome};
use snowdrift_core::{Compression, StorageProvider};
use tracing::{debug, warn};

use crate::error::{
    DecodeHeaderSnafu, InvalidPatternSnafu, ListSnafu, ProbeError, ReadHeaderSnafu,
};

/// Compile an entity pattern so that it must match from the start of a key.
pub fn anchored_pattern(pattern: &str) -> Result<Regex, ProbeError> {
    Regex::new(&format!("^(?:{pattern})")).context(InvalidPatternSnafu { pattern })
}

/// The first non-blank line, without a leading byte-order mark.
pub fn header_line(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim_start_matches('\u{feff}').to_string())
}

/// Split a header row into column names, dropping surrounding quotes.
pub fn split_header(line: &str, delimiter: &str) -> Vec<String> {
    let cells: Vec<&str> = if delimiter.is_empty() {
        vec![line]
    } else {
        line.split(delimiter).collect()
    };
    cells
        .into_iter()
        .map(|cell| cell.trim().trim_matches('"').trim().to_string())
        .collect()
}

/// A source object found to have content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    /// First non-blank line, read while probing.
    pub header: String,
}

/// Reads bounded prefixes of objects from one storage root.
#[derive(Debug, Clone)]
pub struct Prober {
    storage: StorageProvider,
    probe_bytes: usize,
}

impl Prober {
    pub fn new(storage: StorageProvider, probe_bytes: usize) -> Self {
        Self {
            storage,
            probe_bytes,
        }
    }

    pub fn storage(&self) -> &StorageProvider {
        &self.storage
    }

    /// Keys matching `pattern`, in lexicographic order.
    pub async fn list_matching(&self, pattern: &str) -> Result<Vec<String>, ProbeError> {
        let regex = anchored_pattern(pattern)?;
        let paths = self.storage.list().await.context(ListSnafu)?;
        Ok(paths.into_iter().filter(|path| regex.is_match(path)).collect())
    }

    /// Decoded lines from the head of `path`.
    pub async fn head_lines(&self, path: &str) -> Result<Vec<String>, ProbeError> {
        let head = self
            .storage
            .read_head(path, self.probe_bytes)
            .await
            .context(ReadHeaderSnafu { path })?;
        let compression = Compression::from_path(path);
        debug!(path, codec = compression.name(), bytes = head.len(), "Read object head");
        compression.lines(&head).context(DecodeHeaderSnafu { path })
    }

    /// Header row of `path` if it holds anything but whitespace.
    ///
    /// Objects that cannot be read or decoded count as empty.
    pub async fn probe(&self, path: &str) -> Option<String> {
        let (outcome, header) = match self.head_lines(path).await {
            Ok(lines) => match header_line(&lines) {
                Some(header) => (ProbeOutcome::NonEmpty, Some(header)),
                None => (ProbeOutcome::Empty, None),
            },
            Err(e) => {
                warn!(path, error = %e, "Unreadable source object treated as empty");
                (ProbeOutcome::Unreadable, None)
            }
        };
        debug!(path, outcome = outcome.as_str(), "Probed source object");
        emit!(ObjectProbed { outcome });
        header
    }

    /// The first matching object with content, together with its header row.
    pub async fn first_non_empty(&self, pattern: &str) -> Result<Option<SourceFile>, ProbeError> {
        for path in self.list_matching(pattern).await? {
            if let Some(header) = self.probe(&path).await {
                return Ok(Some(SourceFile { path, header }));
            }
        }
        Ok(None)
    }

    /// Header row of `path`; `None` if the object is blank.
    pub async fn header_line(&self, path: &str) -> Result<Option<String>, ProbeError> {
        Ok(header_line(&self.head_lines(path).await?))
    }
}
