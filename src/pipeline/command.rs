//! Registration through an external program.
//!
//! The program is started in the write directory and receives the
//! [`RequestDocument`](super::RequestDocument) as JSON on stdin. When done it
//! prints a [`PipelineOutput`] JSON object as its last JSON line on stdout:
//!
//! ```text
//! {"affine": "affine.mat",
//!  "deformation": {"store": "transform.n5", "dataset": "vector_field"},
//!  "aligned": {"store": "aligned.n5", "dataset": "data"}}
//! ```
//!
//! Other stdout lines are treated as progress output. Relative paths in the
//! response are resolved against the write directory by the invoker.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{PipelineOutput, RegistrationPipeline, RegistrationRequest};
use crate::error::PipelineError;

/// Pipeline backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl CommandPipeline {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Append arguments passed before the request is written.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the program.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl RegistrationPipeline for CommandPipeline {
    fn name(&self) -> &str {
        &self.program
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<PipelineOutput, PipelineError> {
        let document = serde_json::to_vec(&request.to_document()?)
            .map_err(|e| PipelineError::InvalidRequest(e.to_string()))?;

        let spawn_error = |source| PipelineError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&request.write_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        info!(
            "Started pipeline '{}' in {}",
            self.program,
            request.write_directory.display()
        );

        // Feed stdin concurrently so a chatty program cannot block on stdout
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&document).await {
                    debug!("Pipeline closed stdin early: {}", e);
                }
            })
        });

        let output = child.wait_with_output().await.map_err(spawn_error)?;
        if let Some(writer) = writer {
            let _ = writer.await;
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!("pipeline stderr: {}", line);
        }

        if !output.status.success() {
            return Err(PipelineError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_response(&stdout)
    }
}

/// Extract the pipeline output from the program's stdout.
///
/// The response is the last non-empty line that parses as a JSON object.
pub fn parse_response(stdout: &str) -> Result<PipelineOutput, PipelineError> {
    let mut response = None;
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => response = Some(value),
            _ => debug!("pipeline: {}", line),
        }
    }

    // A response spread over several lines is accepted when stdout holds nothing else
    let response = match response {
        Some(value) => value,
        None => match serde_json::from_str::<Value>(stdout.trim()) {
            Ok(value @ Value::Object(_)) => value,
            _ => {
                warn!("Pipeline printed no JSON response");
                return Err(PipelineError::InvalidResponse(
                    "stdout holds no JSON object".to_string(),
                ));
            }
        },
    };

    serde_json::from_value(response).map_err(|e| PipelineError::InvalidResponse(e.to_string()))
}
