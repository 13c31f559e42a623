//! Error types for fitting, applying and persisting pipelines.
//!
//! Every failure aborts the current `fit` / `transform` / `load` call. Errors
//! raised inside a stage carry a [`StageRef`] once they leave the
//! [`Pipeline`](crate::pipeline::Pipeline) or
//! [`PipelineModel`](crate::model::PipelineModel), so the caller can see which
//! stage failed and on what column.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Position and name of a stage inside a pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageRef {
    pub index: usize,
    pub name: String,
}

impl StageRef {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

impl fmt::Display for StageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage #{} (`{}`)", self.index, self.name)
    }
}

fn at(stage: &Option<StageRef>) -> String {
    stage.as_ref().map(|s| format!(" in {s}")).unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum Error {
    /// A declared input column is absent, or present with the wrong type.
    #[error("schema mismatch{}: column `{column}` {reason}", at(.stage))]
    SchemaMismatch {
        stage: Option<StageRef>,
        column: String,
        reason: String,
    },

    /// An estimator could not compute its statistic from the supplied data.
    #[error("insufficient data{}: {reason}", at(.stage))]
    InsufficientData {
        stage: Option<StageRef>,
        reason: String,
    },

    /// A persisted bundle or commit is malformed, tampered with, or from an
    /// incompatible version.
    #[error("serialization error at {}: {reason}", .path.display())]
    Serialization { path: PathBuf, reason: String },

    /// A stage was configured with invalid parameters.
    #[error("invalid parameter for `{stage}`: {reason}")]
    InvalidParameter { stage: String, reason: String },

    /// Values disagree with the schema they were declared under.
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// Any other failure raised while a stage ran, tagged with that stage.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: StageRef,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Column `column` does not exist.
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            stage: None,
            column: column.into(),
            reason: "not found".to_string(),
        }
    }

    pub fn schema_mismatch(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            stage: None,
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub fn insufficient_data(reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            stage: None,
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub fn serialization(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Serialization {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Attribute this error to a stage, unless it already names one.
    ///
    /// `SchemaMismatch` and `InsufficientData` record the stage in place;
    /// every other kind is wrapped in [`Error::Stage`].
    #[must_use]
    pub fn at_stage(self, index: usize, name: &str) -> Self {
        match self {
            Self::SchemaMismatch {
                stage: None,
                column,
                reason,
            } => Self::SchemaMismatch {
                stage: Some(StageRef::new(index, name)),
                column,
                reason,
            },
            Self::InsufficientData {
                stage: None,
                reason,
            } => Self::InsufficientData {
                stage: Some(StageRef::new(index, name)),
                reason,
            },
            attributed @ (Self::SchemaMismatch { .. }
            | Self::InsufficientData { .. }
            | Self::Stage { .. }) => attributed,
            other => Self::Stage {
                stage: StageRef::new(index, name),
                source: Box::new(other),
            },
        }
    }

    /// The stage this error was attributed to, if any.
    pub fn stage(&self) -> Option<&StageRef> {
        match self {
            Self::SchemaMismatch { stage, .. } | Self::InsufficientData { stage, .. } => {
                stage.as_ref()
            }
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// The error without its [`Error::Stage`] wrapper.
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}
