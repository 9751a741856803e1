//! # Provisioning Engine Seam
//!
//! The lifecycle service drives infrastructure through [`ProvisioningEngine`].
//! [`TerraformEngine`](super::terraform::TerraformEngine) is the production
//! implementation; tests substitute scripted engines.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ProvisionerError, Result};
use crate::models::ClusterOutput;

/// Result of a successful apply
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    /// State snapshot written by the engine
    pub state: Vec<u8>,
    pub outputs: Vec<ClusterOutput>,
    pub message: String,
}

/// Result of a successful destroy
#[derive(Debug, Clone, PartialEq)]
pub struct DestroyOutcome {
    /// State snapshot after destroy, when the engine wrote one
    pub state: Option<Vec<u8>>,
    pub message: String,
}

#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Bring real infrastructure in line with `config`, starting from
    /// `prior_state` when there is one
    async fn apply(&self, config: &[u8], prior_state: Option<&[u8]>) -> Result<ApplyOutcome>;

    /// Tear down everything tracked by `prior_state`
    async fn destroy(&self, config: &[u8], prior_state: Option<&[u8]>) -> Result<DestroyOutcome>;

    /// Engine version string, for diagnostics
    async fn version(&self) -> Result<String>;
}

/// Extract the outputs section of an engine state snapshot.
///
/// Returns `None` when the snapshot has no `outputs` key. Outputs are sorted
/// by name.
pub fn parse_state_outputs(state: &[u8]) -> Result<Option<Vec<ClusterOutput>>> {
    let document: Value = serde_json::from_slice(state)
        .map_err(|e| ProvisionerError::EngineError(format!("state file is not valid JSON: {e}")))?;

    let Some(section) = document.get("outputs") else {
        return Ok(None);
    };
    let Some(entries) = section.as_object() else {
        return Err(ProvisionerError::EngineError(
            "state outputs section is not an object".to_string(),
        ));
    };

    let mut outputs: Vec<ClusterOutput> = entries
        .iter()
        .map(|(name, entry)| ClusterOutput {
            name: name.clone(),
            sensitive: entry
                .get("sensitive")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            output_type: entry.get("type").cloned().unwrap_or(Value::Null),
            value: entry.get("value").cloned().unwrap_or(Value::Null),
        })
        .collect();
    outputs.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Some(outputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_outputs() {
        let state = json!({
            "version": 4,
            "outputs": {
                "kubeconfig": {"value": "apiVersion: v1", "type": "string", "sensitive": true},
                "endpoint": {"value": "10.0.0.1", "type": "string"},
                "node_pools": {"value": ["default"], "type": ["list", "string"]}
            },
            "resources": []
        });

        let outputs = parse_state_outputs(state.to_string().as_bytes())
            .unwrap()
            .unwrap();
        let names: Vec<&str> = outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["endpoint", "kubeconfig", "node_pools"]);
        assert!(!outputs[0].sensitive);
        assert!(outputs[1].sensitive);
        assert_eq!(outputs[2].output_type, json!(["list", "string"]));
        assert_eq!(outputs[2].value, json!(["default"]));
    }

    #[test]
    fn test_missing_outputs_section() {
        let outputs = parse_state_outputs(br#"{"version":4,"resources":[]}"#).unwrap();
        assert!(outputs.is_none());

        let empty = parse_state_outputs(br#"{"version":4,"outputs":{}}"#).unwrap();
        assert_eq!(empty, Some(Vec::new()));
    }

    #[test]
    fn test_invalid_state() {
        assert!(matches!(
            parse_state_outputs(b"not json"),
            Err(ProvisionerError::EngineError(_))
        ));
        assert!(matches!(
            parse_state_outputs(br#"{"outputs":[]}"#),
            Err(ProvisionerError::EngineError(_))
        ));
    }
}
