use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::provision::ResourceKind;

#[derive(Debug, Error)]
pub enum RedisEdgeError {
    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("{command} failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },

    #[error(transparent)]
    Capability(#[from] MissingModules),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl RedisEdgeError {
    pub(crate) fn command(command: &'static str, err: impl fmt::Display) -> Self {
        Self::Command {
            command,
            message: err.to_string(),
        }
    }
}

/// A required module that is absent or installed below its minimum version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetModule {
    pub name: String,
    pub min_version: i64,
    pub installed: Option<i64>,
}

impl fmt::Display for UnmetModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} or greater", self.name, self.min_version)?;
        match self.installed {
            Some(version) => write!(f, " (found v{version})"),
            None => write!(f, " (not installed)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing requisite RedisEdge module(s): {}", format_unmet(.modules))]
pub struct MissingModules {
    pub modules: Vec<UnmetModule>,
}

impl MissingModules {
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|module| module.name.as_str()).collect()
    }
}

fn format_unmet(modules: &[UnmetModule]) -> String {
    modules
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed checking for {kind} key '{key}': {message}")]
    Lookup {
        kind: ResourceKind,
        key: String,
        message: String,
    },

    #[error("failed reading {kind} file '{}': {source}", .path.display())]
    ReadBlob {
        kind: ResourceKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed setting {kind} key '{key}': {message}")]
    Upload {
        kind: ResourceKind,
        key: String,
        message: String,
    },

    #[error("unexpected reply when setting {kind} key '{key}' - 'OK' != {reply}")]
    UnexpectedReply {
        kind: ResourceKind,
        key: String,
        reply: String,
    },
}

impl ProvisionError {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ProvisionError::Lookup { kind, .. }
            | ProvisionError::ReadBlob { kind, .. }
            | ProvisionError::Upload { kind, .. }
            | ProvisionError::UnexpectedReply { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("frame is empty")]
    EmptyFrame,

    #[error("object detection is not implemented")]
    NotImplemented,
}

pub type Result<T> = std::result::Result<T, RedisEdgeError>;
