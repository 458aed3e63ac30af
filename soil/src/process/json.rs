//! Running commands whose stdout is a JSON document

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::SoilError;
use crate::process::policy::ExecPolicy;
use crate::process::runner::{command_line, Executor};

/// Runs a command and parses its captured stdout as one JSON object
#[async_trait]
pub trait JsonRunner {
    /// A failing command returns its `SoilError::Command` untouched and is
    /// never parsed. A successful command with unparseable output returns
    /// `SoilError::Parse`.
    async fn run_json(
        &self,
        args: &[String],
        policy: ExecPolicy,
    ) -> Result<Map<String, Value>, SoilError>;
}

#[async_trait]
impl<E> JsonRunner for E
where
    E: Executor + ?Sized,
{
    async fn run_json(
        &self,
        args: &[String],
        policy: ExecPolicy,
    ) -> Result<Map<String, Value>, SoilError> {
        let output = self.run(args, policy.capturing_stdout()).await?;
        parse_json_object(&command_line(args), &output)
    }
}

/// Parse command output as a single JSON object
pub fn parse_json_object(command: &str, output: &str) -> Result<Map<String, Value>, SoilError> {
    serde_json::from_str(output)
        .map_err(|e| SoilError::parse(format!("output of `{}`", command), e))
}
