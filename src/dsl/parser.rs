//! DSL parser: converts raw YAML/JSON/TOML text into [`WorkflowSchema`].

use serde::de::DeserializeOwned;

use super::schema::{WorkflowSchema, SUPPORTED_DSL_VERSIONS};
use crate::error::WorkflowError;

/// Supported DSL input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DslFormat {
    /// YAML format (`.yaml` / `.yml`).
    Yaml,
    /// JSON format (`.json`).
    Json,
    /// TOML format (`.toml`).
    Toml,
}

impl DslFormat {
    /// Guess the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(DslFormat::Yaml),
            "json" => Some(DslFormat::Json),
            "toml" => Some(DslFormat::Toml),
            _ => None,
        }
    }
}

/// Parse DSL content into WorkflowSchema and check its version.
pub fn parse_dsl(content: &str, format: DslFormat) -> Result<WorkflowSchema, WorkflowError> {
    let schema: WorkflowSchema = parse_document(content, format)?;
    if !SUPPORTED_DSL_VERSIONS.contains(&schema.version.as_str()) {
        return Err(WorkflowError::UnsupportedVersion {
            found: schema.version,
            supported: SUPPORTED_DSL_VERSIONS.join(", "),
        });
    }
    Ok(schema)
}

/// Deserialize any document type from one of the supported formats.
pub(crate) fn parse_document<T: DeserializeOwned>(
    content: &str,
    format: DslFormat,
) -> Result<T, WorkflowError> {
    match format {
        DslFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| WorkflowError::DslParseError(e.to_string()))
        }
        DslFormat::Json => {
            serde_json::from_str(content).map_err(|e| WorkflowError::DslParseError(e.to_string()))
        }
        DslFormat::Toml => {
            // TOML → serde_json::Value first so fields typed as Value (condition
            // operands, node extras) deserialize the same way as JSON input.
            let toml_val: toml::Value = toml::from_str(content)
                .map_err(|e| WorkflowError::DslParseError(e.to_string()))?;
            serde_json::from_value(toml_value_to_json(toml_val))
                .map_err(|e| WorkflowError::DslParseError(e.to_string()))
        }
    }
}

/// Convert a [`toml::Value`] into a [`serde_json::Value`].
///
/// TOML has no null type; datetimes are stringified.
fn toml_value_to_json(val: toml::Value) -> serde_json::Value {
    match val {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_value_to_json).collect())
        }
        toml::Value::Table(tbl) => serde_json::Value::Object(
            tbl.into_iter()
                .map(|(k, v)| (k, toml_value_to_json(v)))
                .collect(),
        ),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::schema::NodeType;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
version: "0.1.0"
nodes:
  - id: start_1
    data:
      type: start
      title: Start
  - id: gate
    data:
      type: if-else
      cases: []
edges:
  - source: start_1
    target: gate
    condition:
      logical_operator: and
      conditions:
        - variable_selector: [sys, age]
          comparison_operator: ">"
          value: 18
"#;
        let schema = parse_dsl(yaml, DslFormat::Yaml).unwrap();
        assert_eq!(schema.version, "0.1.0");
        assert_eq!(schema.nodes.len(), 2);
        assert_eq!(schema.nodes[0].data.node_type, NodeType::Start);
        let cond = schema.edges[0].condition.as_ref().unwrap();
        assert_eq!(cond.conditions[0].value, serde_json::json!(18));
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{"version":"0.1.0","nodes":[{"id":"s","data":{"type":"start","title":"S"}}],"edges":[]}"#;
        let schema = parse_dsl(json, DslFormat::Json).unwrap();
        assert_eq!(schema.nodes.len(), 1);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
version = "0.1.0"
edges = []

[[nodes]]
id = "start_1"
[nodes.data]
type = "start"
title = "Start"
"#;
        let schema = parse_dsl(toml_str, DslFormat::Toml).unwrap();
        assert_eq!(schema.nodes[0].data.node_type, NodeType::Start);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_dsl("{{{invalid", DslFormat::Json).is_err());
        assert!(parse_dsl("[[[bad", DslFormat::Toml).is_err());
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let json = r#"{"version":"0.1.0","nodes":[{"id":"s","data":{"type":"teleport"}}]}"#;
        assert!(matches!(
            parse_dsl(json, DslFormat::Json),
            Err(WorkflowError::DslParseError(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let json = r#"{"version":"9.9.9","nodes":[{"id":"s","data":{"type":"start"}}]}"#;
        let err = parse_dsl(json, DslFormat::Json).unwrap_err();
        assert!(matches!(err, WorkflowError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DslFormat::from_extension("YML"), Some(DslFormat::Yaml));
        assert_eq!(DslFormat::from_extension("txt"), None);
    }
}
