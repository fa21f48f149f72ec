//! On-disk record of a generated completion and its raw attention.

use std::{
    fs,
    path::{Path, PathBuf},
};

use attention::AttentionMatrix;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::experiment::Completion;

pub const RECORD_VERSION: u32 = 1;

/// Everything needed to render a completion later without the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub version: u32,
    pub completion_tokens: Vec<String>,
    pub prompt_length: usize,
    pub attention: AttentionMatrix,
}

impl ExperimentRecord {
    pub fn new(completion_tokens: Vec<String>, prompt_length: usize, attention: AttentionMatrix) -> Self {
        Self {
            version: RECORD_VERSION,
            completion_tokens,
            prompt_length,
            attention,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let record: ExperimentRecord = serde_json::from_slice(bytes).map_err(Error::Decode)?;
        if record.version != RECORD_VERSION {
            return Err(Error::UnsupportedVersion {
                found: record.version,
                expected: RECORD_VERSION,
            });
        }
        Ok(record)
    }

    /// Write the record through a sibling temporary file so a reader never
    /// sees a partial record.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.encode()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| Error::write_failed(parent, err))?;
        }
        let staging = staging_path(path);
        let staged = fs::write(&staging, &bytes)
            .map_err(|err| Error::write_failed(&staging, err))
            .and_then(|()| fs::rename(&staging, path).map_err(|err| Error::write_failed(path, err)));
        if let Err(err) = staged {
            if let Err(cleanup) = fs::remove_file(&staging) {
                log::debug!("could not remove {}: {cleanup}", staging.display());
            }
            return Err(err);
        }

        log::debug!("saved experiment record to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| Error::read_failed(path, err))?;
        Self::decode(&bytes)
    }

    pub fn num_tokens(&self) -> usize {
        self.completion_tokens.len()
    }

    /// Human-readable overview used by `att-viz inspect`.
    pub fn summary(&self) -> String {
        format!(
            "{} token(s), prompt length {}\n{}\nformatted: {}\nresponse tokens: {}",
            self.num_tokens(),
            self.prompt_length,
            self.attention,
            self.attention.is_formatted(),
            self.attention.num_response_tokens()
        )
    }
}

impl From<Completion> for ExperimentRecord {
    fn from(completion: Completion) -> Self {
        Self::new(completion.tokens, completion.prompt_length, completion.attention)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
