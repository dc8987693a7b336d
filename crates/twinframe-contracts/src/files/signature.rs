use std::fmt;

use serde::{Deserialize, Serialize};

use super::LocalFile;

/// Identity of a local file for upload caching, built from its name, byte
/// size and last-modified time.
///
/// This is a cheap heuristic, not a content digest. Two different files that
/// share all three values produce the same signature and are treated as the
/// same upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSignature(String);

impl FileSignature {
    pub fn of(file: &LocalFile) -> Self {
        Self(format!(
            "{}-{}-{}",
            file.name(),
            file.size(),
            file.modified_ms()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn signature(file: Option<&LocalFile>) -> Option<FileSignature> {
    file.map(FileSignature::of)
}
