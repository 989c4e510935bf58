//! Generated marker documents and the counter that numbers them.

use chrono::{DateTime, SecondsFormat, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("IO error writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// ISO-8601 rendering used in artifacts and commit messages,
/// e.g. `2024-05-01T12:00:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Naming scheme `<prefix><ordinal><extension>` for artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLayout {
    pub prefix: String,
    pub extension: String,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            prefix: "code_".to_string(),
            extension: ".md".to_string(),
        }
    }
}

impl ArtifactLayout {
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    pub fn file_name(&self, ordinal: u64) -> String {
        format!("{}{}{}", self.prefix, ordinal, self.extension)
    }

    /// Ordinal encoded in `file_name`, if it follows this layout.
    pub fn parse_ordinal(&self, file_name: &str) -> Option<u64> {
        let digits = file_name
            .strip_prefix(&self.prefix)?
            .strip_suffix(&self.extension)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn render(&self, ordinal: u64, at: DateTime<Utc>) -> String {
        format!(
            "# Code Commit {}\n\nThis is an auto-generated commit.\n\nTimestamp: {}",
            ordinal,
            iso_timestamp(at)
        )
    }

    /// Highest ordinal among artifacts directly inside `dir`, or `None`.
    pub fn high_water_mark(&self, dir: &Path) -> ArtifactResult<Option<u64>> {
        let dir_name = dir.to_string_lossy();
        let pattern = format!(
            "{}/{}*{}",
            Pattern::escape(dir_name.trim_end_matches('/')),
            Pattern::escape(&self.prefix),
            Pattern::escape(&self.extension)
        );

        let highest = glob::glob(&pattern)?
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .filter_map(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| self.parse_ordinal(name))
            })
            .max();

        debug!("Artifact high-water mark in {}: {:?}", dir.display(), highest);
        Ok(highest)
    }

    /// Write artifact `ordinal` into `dir`, overwriting any file of that name.
    pub fn write(&self, dir: &Path, ordinal: u64, at: DateTime<Utc>) -> ArtifactResult<PathBuf> {
        let path = dir.join(self.file_name(ordinal));
        std::fs::write(&path, self.render(ordinal, at)).map_err(|source| ArtifactError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// Monotonic ordinal for the next artifact of one working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitCounter {
    next: u64,
}

impl Default for CommitCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl CommitCounter {
    pub fn starting_at(next: u64) -> Self {
        Self { next: next.max(1) }
    }

    /// Resume after the highest artifact already present in `dir`.
    pub fn recover(dir: &Path, layout: &ArtifactLayout) -> ArtifactResult<Self> {
        let mut counter = Self::default();
        counter.observe(layout.high_water_mark(dir)?);
        Ok(counter)
    }

    /// Ordinal the next artifact will carry
    pub fn current(&self) -> u64 {
        self.next
    }

    pub fn advance(&mut self) {
        self.next += 1;
    }

    /// Move past `high_water` so an existing artifact is never reused. Never
    /// moves backwards.
    pub fn observe(&mut self, high_water: Option<u64>) {
        if let Some(mark) = high_water {
            self.next = self.next.max(mark.saturating_add(1));
        }
    }
}
