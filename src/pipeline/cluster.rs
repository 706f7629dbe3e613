//! Free-form configuration forwarded to the pipeline's compute cluster.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PipelineError;

/// Key/value bag handed verbatim to the registration pipeline.
///
/// Nothing here is interpreted: worker counts, memory limits and scheduler
/// addresses mean whatever the pipeline says they mean.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterConfig(Map<String, Value>);

impl ClusterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Parse a JSON document whose top level is an object.
    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(PipelineError::InvalidRequest(
                "cluster config must be a JSON object".to_string(),
            )),
            Err(e) => Err(PipelineError::InvalidRequest(format!(
                "cluster config is not valid JSON: {}",
                e
            ))),
        }
    }

    /// Parse a YAML document whose top level is a mapping.
    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        match serde_yml::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(PipelineError::InvalidRequest(
                "cluster config must be a YAML mapping".to_string(),
            )),
            Err(e) => Err(PipelineError::InvalidRequest(format!(
                "cluster config is not valid YAML: {}",
                e
            ))),
        }
    }

    /// Read a cluster config file: YAML for `.yaml`/`.yml`, JSON otherwise.
    pub async fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::InvalidRequest(format!(
                "cannot read cluster config {}: {}",
                path.display(),
                e
            ))
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            _ => Self::from_json(&text),
        }
    }

    /// Set `key` to `value`. Dotted keys (`worker.memory`) address nested
    /// objects, which are created as needed.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), PipelineError> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(PipelineError::InvalidRequest(format!(
                "invalid cluster config key '{}'",
                key
            )));
        }

        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| PipelineError::InvalidRequest("empty cluster config key".to_string()))?;

        let mut node = &mut self.0;
        for part in parents {
            let entry = node
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = match entry {
                Value::Object(map) => map,
                _ => {
                    return Err(PipelineError::InvalidRequest(format!(
                        "cluster config key '{}' crosses non-object value '{}'",
                        key, part
                    )))
                }
            };
        }
        node.insert(last.to_string(), value);
        Ok(())
    }

    /// Apply a `key=value` override.
    ///
    /// The value is parsed as JSON when possible (`4`, `true`, `[1,2]`) and
    /// kept as a string otherwise.
    pub fn apply_override(&mut self, arg: &str) -> Result<(), PipelineError> {
        let (key, raw) = arg.split_once('=').ok_or_else(|| {
            PipelineError::InvalidRequest(format!(
                "cluster argument '{}' is not of the form key=value",
                arg
            ))
        })?;
        let value =
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        self.set(key.trim(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}
