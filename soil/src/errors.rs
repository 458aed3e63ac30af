//! Error types for soil

use thiserror::Error;

/// Main error type for soil
#[derive(Error, Debug)]
pub enum SoilError {
    #[error("No such deployment: {0}")]
    NotFound(String),

    #[error("Deployment already exists: {0}")]
    AlreadyExists(String),

    #[error("Unknown deployment kind: {0}")]
    UnknownKind(String),

    #[error("Parse error ({context}): {source}")]
    Parse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Command `{command}` failed{}{}", exit_suffix(.code), output_suffix(.output))]
    Command {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Provisioning error: {0}")]
    Provision(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SoilError {
    /// Build a parse error tagged with what was being decoded
    pub fn parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        SoilError::Parse {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SoilError::NotFound(_))
    }

    pub fn is_command_failure(&self) -> bool {
        matches!(self, SoilError::Command { .. } | SoilError::Launch { .. })
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {}", code),
        None => " (terminated by signal)".to_string(),
    }
}

fn output_suffix(output: &str) -> String {
    let output = output.trim_end();
    if output.is_empty() {
        String::new()
    } else {
        format!(":\n{}", output)
    }
}

impl From<anyhow::Error> for SoilError {
    fn from(err: anyhow::Error) -> Self {
        SoilError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SoilError {
    fn from(err: tokio::task::JoinError) -> Self {
        SoilError::Internal(format!("Worker task failed: {}", err))
    }
}
