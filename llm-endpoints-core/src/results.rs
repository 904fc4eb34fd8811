//! CSV persistence for batch results.

use crate::config::constants::results::{FILE_EXTENSION, LABEL_HEADER, REPLY_HEADER};
use crate::config::loader::ResultsConfig;
use crate::llm::provider::{LLMError, QueryResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Writes a result set as a `label,reply` table
#[derive(Debug, Clone, PartialEq)]
pub struct ResultWriter {
    directory: PathBuf,
    file_name: String,
    transpose: bool,
}

impl Default for ResultWriter {
    fn default() -> Self {
        Self::from_config(&ResultsConfig::default())
    }
}

impl ResultWriter {
    pub fn from_config(config: &ResultsConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            file_name: config.file_name.clone(),
            transpose: config.transpose,
        }
    }

    pub fn with_transpose(mut self, transpose: bool) -> Self {
        self.transpose = transpose;
        self
    }

    /// Where [`ResultWriter::save`] writes for the same overrides
    pub fn path_for(&self, directory: Option<&Path>, file_name: Option<&str>) -> PathBuf {
        let directory = directory.unwrap_or(self.directory.as_path());
        directory.join(normalize_file_name(file_name.unwrap_or(self.file_name.as_str())))
    }

    /// Write `results` and return the path of the file
    ///
    /// Without labels each row is labelled with its prompt. An existing file
    /// at the target path is replaced.
    pub fn save(
        &self,
        results: &[QueryResult],
        directory: Option<&Path>,
        file_name: Option<&str>,
        labels: Option<&[String]>,
    ) -> Result<PathBuf, LLMError> {
        let labels: Vec<&str> = match labels {
            Some(labels) if labels.len() != results.len() => {
                return Err(LLMError::LabelCountMismatch {
                    expected: results.len(),
                    actual: labels.len(),
                });
            }
            Some(labels) => labels.iter().map(String::as_str).collect(),
            None => results.iter().map(|r| r.prompt.as_str()).collect(),
        };

        let requested = file_name.unwrap_or(self.file_name.as_str());
        let path = self.path_for(directory, Some(requested));
        if Path::new(requested).extension().is_some() && !path.ends_with(requested) {
            warn!(requested, path = %path.display(), "replacing results file extension");
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| persist_error(&path, err))?;
        }

        let mut writer = csv::Writer::from_path(&path).map_err(|err| persist_error(&path, err))?;
        if self.transpose {
            let label_row = std::iter::once(LABEL_HEADER).chain(labels.iter().copied());
            let reply_row = std::iter::once(REPLY_HEADER)
                .chain(results.iter().map(|r| r.reply.as_str()));
            writer
                .write_record(label_row)
                .and_then(|_| writer.write_record(reply_row))
                .map_err(|err| persist_error(&path, err))?;
        } else {
            writer
                .write_record([LABEL_HEADER, REPLY_HEADER])
                .map_err(|err| persist_error(&path, err))?;
            for (label, result) in labels.iter().zip(results) {
                writer
                    .write_record([*label, result.reply.as_str()])
                    .map_err(|err| persist_error(&path, err))?;
            }
        }
        writer.flush().map_err(|err| persist_error(&path, err))?;

        info!(path = %path.display(), rows = results.len(), transpose = self.transpose, "saved results");
        Ok(path)
    }
}

/// Force the `.csv` extension, keeping any casing the caller already used
pub fn normalize_file_name(file_name: &str) -> String {
    let path = Path::new(file_name);
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(FILE_EXTENSION) => file_name.to_string(),
        Some(_) => path
            .with_extension(FILE_EXTENSION)
            .to_string_lossy()
            .into_owned(),
        None => format!("{file_name}.{FILE_EXTENSION}"),
    }
}

fn persist_error(path: &Path, err: impl std::fmt::Display) -> LLMError {
    LLMError::Persist {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
