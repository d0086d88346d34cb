//! Multi-file configuration loading.

use std::path::Path;

use snafu::prelude::*;

use crate::config::{ConfigPath, interpolate, is_yaml_file};
use crate::error::{ConfigError, ReadDirSnafu, ReadFileSnafu};

/// A configuration that can be assembled from several YAML documents.
pub trait Mergeable: Sized + Default {
    /// Parse one already-interpolated document.
    fn parse_yaml(contents: &str) -> Result<Self, ConfigError>;

    /// Fold another document into this one.
    fn merge(&mut self, other: Self) -> Result<(), ConfigError>;
}

/// Load and merge every file and directory in `paths`, in order.
///
/// Errors from individual files are collected and reported together.
pub fn load_from_paths<C: Mergeable>(paths: &[ConfigPath]) -> Result<C, ConfigError> {
    let mut config = C::default();
    let mut errors = Vec::new();

    for path in paths {
        let partial = match path {
            ConfigPath::File(file) => load_file::<C>(file),
            ConfigPath::Dir(dir) => load_dir::<C>(dir),
        };
        if let Err(e) = partial.and_then(|partial| config.merge(partial)) {
            errors.push(format!("{}: {}", path.path().display(), e));
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::MultipleErrors { errors });
    }
    Ok(config)
}

fn load_file<C: Mergeable>(path: &Path) -> Result<C, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;
    C::parse_yaml(&interpolate(&contents)?)
}

fn load_dir<C: Mergeable>(dir: &Path) -> Result<C, ConfigError> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .context(ReadDirSnafu { path: dir })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_yaml_file(path))
        .collect();

    // Directory order is platform dependent; entity order must not be.
    files.sort();

    let mut config = C::default();
    for path in files {
        config.merge(load_file::<C>(&path)?)?;
    }
    Ok(config)
}
