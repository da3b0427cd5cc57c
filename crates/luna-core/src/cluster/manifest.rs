//! Structured resource documents

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LunaError, LunaResult};

/// One resource document, kept as a generic JSON tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Value);

impl Manifest {
    pub fn new(doc: Value) -> Self {
        Self(doc)
    }

    /// Split a multi-document YAML stream, skipping empty documents
    pub fn parse_yaml_stream(text: &str) -> LunaResult<Vec<Manifest>> {
        let mut manifests = Vec::new();
        for document in serde_yaml::Deserializer::from_str(text) {
            let value = Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            if !value.is_object() {
                return Err(LunaError::render(format!(
                    "manifest document #{} is not a mapping",
                    manifests.len()
                )));
            }
            manifests.push(Manifest(value));
        }
        Ok(manifests)
    }

    /// Minimal document identifying a pod, enough to delete it
    pub fn pod_reference(namespace: &str, name: &str) -> Self {
        Self(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": name, "namespace": namespace },
        }))
    }

    pub fn doc(&self) -> &Value {
        &self.0
    }

    pub fn into_doc(self) -> Value {
        self.0
    }

    pub fn api_version(&self) -> Option<&str> {
        self.0.get("apiVersion").and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata_str("name")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace")
    }

    /// `kind/name` for log lines
    pub fn describe(&self) -> String {
        format!(
            "{}/{}",
            self.kind().unwrap_or("<no kind>"),
            self.name().unwrap_or("<no name>")
        )
    }

    fn metadata_str(&self, field: &str) -> Option<&str> {
        self.0
            .get("metadata")
            .and_then(|m| m.get(field))
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multi_document_stream() {
        let text = r#"
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: luna-1-env
  namespace: eval
---
---
apiVersion: v1
kind: Pod
metadata:
  name: luna-1
"#;
        let manifests = Manifest::parse_yaml_stream(text).unwrap();
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].kind(), Some("ConfigMap"));
        assert_eq!(manifests[0].namespace(), Some("eval"));
        assert_eq!(manifests[1].describe(), "Pod/luna-1");
        assert_eq!(manifests[1].namespace(), None);
    }

    #[test]
    fn test_scalar_document_rejected() {
        assert!(Manifest::parse_yaml_stream("just a string\n").is_err());
    }

    #[test]
    fn test_pod_reference() {
        let pod = Manifest::pod_reference("default", "luna-7");
        assert_eq!(pod.api_version(), Some("v1"));
        assert_eq!(pod.describe(), "Pod/luna-7");
        assert_eq!(pod.namespace(), Some("default"));
    }
}
