use std::fmt::Display;
use std::path::PathBuf;

use hf_hub::{api::sync::Api, Repo, RepoType};

use crate::{CommonError, Result};

/// The kind of Hugging Face repository a file lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepoKind {
    /// A model repository, used for tokenizers
    Model,
    /// A dataset repository
    Dataset,
}

/// A source for a file, either from Hugging Face or a local path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSource {
    /// A file from Hugging Face
    HuggingFace {
        /// The repository id to use
        repo_id: String,
        /// The revision to use
        revision: String,
        /// The file to use
        file: String,
        /// Whether the repository holds a model or a dataset
        kind: RepoKind,
    },
    /// A local file
    Local(PathBuf),
}

impl Display for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSource::HuggingFace {
                repo_id,
                revision,
                file,
                kind: RepoKind::Model,
            } => write!(f, "hf://{}/{}/{}", repo_id, revision, file),
            FileSource::HuggingFace {
                repo_id,
                revision,
                file,
                kind: RepoKind::Dataset,
            } => write!(f, "hf://datasets/{}/{}/{}", repo_id, revision, file),
            FileSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FileSource {
    /// Create a new source for a file in a Hugging Face model repository
    pub fn huggingface(
        repo_id: impl ToString,
        revision: impl ToString,
        file: impl ToString,
    ) -> Self {
        Self::HuggingFace {
            repo_id: repo_id.to_string(),
            revision: revision.to_string(),
            file: file.to_string(),
            kind: RepoKind::Model,
        }
    }

    /// Create a new source for a file in a Hugging Face dataset repository
    pub fn dataset(repo_id: impl ToString, revision: impl ToString, file: impl ToString) -> Self {
        Self::HuggingFace {
            repo_id: repo_id.to_string(),
            revision: revision.to_string(),
            file: file.to_string(),
            kind: RepoKind::Dataset,
        }
    }

    /// Create a new source for a local file
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local(path.into())
    }

    /// Get a local path for the file, downloading it into the Hugging Face cache if necessary
    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            FileSource::HuggingFace {
                repo_id,
                revision,
                file,
                kind,
            } => {
                let repo_type = match kind {
                    RepoKind::Model => RepoType::Model,
                    RepoKind::Dataset => RepoType::Dataset,
                };
                let repo = Repo::with_revision(repo_id.clone(), repo_type, revision.clone());
                tracing::trace!("Fetching {file} from {repo_id}@{revision}");
                let path = Api::new()?.repo(repo).get(file)?;
                Ok(path)
            }
            FileSource::Local(path) => {
                if path.exists() {
                    Ok(path.clone())
                } else {
                    Err(CommonError::MissingFile(path.clone()))
                }
            }
        }
    }
}
