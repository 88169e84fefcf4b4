use crate::domain::canonical::CanonicalKey;
use crate::domain::mapping::{Mapping, MAPPING_FILE_NAME};
use crate::domain::survey::{LanguageTag, SurveyId};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;

/// Hex characters of the key digest used as artifact file stem
const ARTIFACT_STEM_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage task failed: {0}")]
    Task(String),
    #[error("invalid public url: {0}")]
    Url(String),
}

impl StorageError {
    fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Content-addressed artifact file name for a key.
pub fn artifact_name(key: &CanonicalKey, extension: &str) -> String {
    let digest = hex::encode(Sha256::digest(key.as_str().as_bytes()));
    format!("{}.{}", &digest[..ARTIFACT_STEM_LEN], extension)
}

fn is_artifact_name(name: &str) -> bool {
    match name.split_once('.') {
        Some((stem, extension)) => {
            stem.len() == ARTIFACT_STEM_LEN
                && stem.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
                && !extension.is_empty()
                && extension.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Files under `<hosting-root>/<survey-id>/...` and the public URLs they are served from.
pub struct HostingRepository {
    root: PathBuf,
    public_base_url: Url,
}

impl HostingRepository {
    pub fn new(root: PathBuf, public_base_url: Url) -> Self {
        Self {
            root,
            public_base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn survey_dir(&self, survey: &SurveyId) -> PathBuf {
        self.root.join(survey.as_str())
    }

    pub fn language_dir(&self, survey: &SurveyId, language: &LanguageTag) -> PathBuf {
        self.survey_dir(survey).join(language.as_str())
    }

    pub fn mapping_path(&self, survey: &SurveyId) -> PathBuf {
        self.survey_dir(survey).join(MAPPING_FILE_NAME)
    }

    /// `<base>/<survey-id>/<language>/<artifact>`
    pub fn artifact_url(
        &self,
        survey: &SurveyId,
        language: &LanguageTag,
        file_name: &str,
    ) -> Result<Url, StorageError> {
        self.public_url(&[survey.as_str(), language.as_str(), file_name])
    }

    /// `<base>/<survey-id>/tts_mapping.json`
    pub fn mapping_url(&self, survey: &SurveyId) -> Result<Url, StorageError> {
        self.public_url(&[survey.as_str(), MAPPING_FILE_NAME])
    }

    fn public_url(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.public_base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| StorageError::Url(self.public_base_url.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    /// Write an artifact atomically. The blocking write runs to completion even if the caller is
    /// cancelled, so a file is either complete or absent.
    pub async fn store_artifact(
        &self,
        survey: &SurveyId,
        language: &LanguageTag,
        file_name: &str,
        audio: Vec<u8>,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.language_dir(survey, language);
        let target = dir.join(file_name);
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &audio).map(|_| target))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Replace the survey's mapping file in one rename.
    pub async fn publish_mapping(
        &self,
        survey: &SurveyId,
        json: String,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.survey_dir(survey);
        let target = self.mapping_path(survey);
        tokio::task::spawn_blocking(move || {
            write_atomically(&dir, &target, json.as_bytes()).map(|_| target)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Currently published mapping, `None` if the survey has never been published.
    pub async fn load_mapping(&self, survey: &SurveyId) -> Result<Option<Mapping>, StorageError> {
        let path = self.mapping_path(survey);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Mapping::from_json_slice(&bytes).map(Some).map_err(|e| {
                StorageError::io(
                    "parse",
                    &path,
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io("read", &path, e)),
        }
    }

    /// Create the hosting root if needed and stage a throwaway file in it, which is what every
    /// artifact and mapping write does first.
    pub async fn check_writable(&self) -> Result<(), StorageError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root).map_err(|e| StorageError::io("create", &root, e))?;
            let mut staged = tempfile::NamedTempFile::new_in(&root)
                .map_err(|e| StorageError::io("stage", &root, e))?;
            staged
                .write_all(b"ok")
                .map_err(|e| StorageError::io("write", staged.path(), e))
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Delete artifacts in a language directory that are not in `keep`. Files that do not follow
    /// the artifact naming scheme are left alone. Returns the number of files removed.
    pub async fn prune_artifacts(
        &self,
        survey: &SurveyId,
        language: &LanguageTag,
        keep: &HashSet<String>,
    ) -> Result<usize, StorageError> {
        let dir = self.language_dir(survey, language);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io("list", &dir, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io("list", &dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_artifact_name(&name) || keep.contains(&name) {
                continue;
            }
            let path = entry.path();
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| StorageError::io("remove", &path, e))?;
            tracing::debug!(path = %path.display(), "Removed stale artifact");
            removed += 1;
        }

        Ok(removed)
    }
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    std::fs::create_dir_all(dir).map_err(|e| StorageError::io("create", dir, e))?;
    let mut staged =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| StorageError::io("stage", dir, e))?;
    staged
        .write_all(bytes)
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| StorageError::io("write", staged.path(), e))?;
    staged
        .persist(target)
        .map_err(|e| StorageError::io("persist", target, e.error))?;
    Ok(())
}
