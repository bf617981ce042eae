//! # Declarative Documents
//!
//! A [`Document`] is one `apiVersion`/`kind`/`metadata`/`spec` record. A
//! [`ConfigSnapshot`] groups every current document by module token and is
//! always treated as a complete replacement of the previous one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::core::error::GatewayResult;
use crate::resource::codec::{ModuleToken, ResourceTypeKey};
use crate::structural_error;

/// Workspace used when a document does not name one
pub const DEFAULT_WORKSPACE: &str = "default";

/// Document metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,

    /// Workspace the document belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

/// One declarative configuration instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: String,

    pub metadata: ObjectMeta,

    /// Kind-specific payload, opaque to the control plane
    #[serde(default)]
    pub spec: serde_yaml::Value,
}

impl Document {
    pub fn new(key: &ResourceTypeKey, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: key.api_version(),
            kind: kind.into(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: None,
                labels: HashMap::new(),
            },
            spec: serde_yaml::Value::Null,
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.metadata.namespace = Some(workspace.into());
        self
    }

    pub fn with_spec(mut self, spec: serde_yaml::Value) -> Self {
        self.spec = spec;
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Workspace from metadata, or the reserved default
    pub fn workspace(&self) -> &str {
        self.metadata
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_WORKSPACE)
    }

    /// Resource type key derived from `apiVersion` and the pluralised `kind`
    pub fn type_key(&self) -> GatewayResult<ResourceTypeKey> {
        let (group, version) = self.api_version.rsplit_once('/').ok_or_else(|| {
            structural_error!(
                "document '{}' has apiVersion '{}' without a group",
                self.metadata.name,
                self.api_version
            )
        })?;
        if self.kind.is_empty() {
            return Err(structural_error!("document '{}' has no kind", self.metadata.name));
        }

        let key = ResourceTypeKey::new(group.to_lowercase(), version.to_lowercase(), pluralize(&self.kind));
        key.validate()?;
        Ok(key)
    }

    pub fn token(&self) -> GatewayResult<ModuleToken> {
        Ok(self.type_key()?.token())
    }

    /// Reject documents the snapshot cannot hold
    pub fn validate(&self) -> GatewayResult<()> {
        if self.metadata.name.trim().is_empty() {
            return Err(structural_error!(
                "document of kind '{}' has no metadata.name",
                self.kind
            ));
        }
        self.type_key()?;
        Ok(())
    }

    /// `<token>/<workspace>/<name>` used in logs and error messages
    pub fn identity(&self) -> String {
        match self.token() {
            Ok(token) => format!("{}/{}/{}", token, self.workspace(), self.name()),
            Err(_) => format!("{}/{}/{}", self.kind, self.workspace(), self.name()),
        }
    }
}

/// Lower-case plural resource name for a document kind
pub fn pluralize(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with('x') || lower.ends_with("ch") || lower.ends_with("sh") {
        return format!("{}es", lower);
    }
    if let Some(stem) = lower.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", lower)
}

/// Parse a (possibly multi-document) YAML stream
///
/// Invalid YAML rejects the whole stream. Past that, every entry is either a
/// document or the reason it could not be read as one, so one malformed
/// entry never hides its neighbours. Entries are not validated here; empty
/// documents between separators are skipped.
pub fn parse_documents(content: &str) -> GatewayResult<Vec<GatewayResult<Document>>> {
    let mut documents = Vec::new();
    for de in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(de)?;
        if value.is_null() {
            continue;
        }
        documents.push(
            serde_yaml::from_value::<Document>(value)
                .map_err(|e| structural_error!("malformed document: {}", e)),
        );
    }
    Ok(documents)
}

/// Render documents as one YAML stream separated by `---`
pub fn render_documents(documents: &[Document]) -> GatewayResult<String> {
    let mut out = String::new();
    for document in documents {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(document)?);
    }
    Ok(out)
}

/// Selects documents in `List` calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    /// Only documents in this workspace
    #[serde(default, rename = "package", skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

impl DocumentFilter {
    pub fn workspace(workspace: impl Into<String>) -> Self {
        Self {
            workspace: Some(workspace.into()),
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        match &self.workspace {
            Some(ws) => document.workspace() == ws,
            None => true,
        }
    }
}

/// Complete set of documents grouped by module token
///
/// Tokens iterate in lexicographic order; documents under one token keep the
/// order they were read in. No two documents share a `(token, name)` pair once
/// they go through [`ConfigSnapshot::upsert`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSnapshot {
    resources: BTreeMap<ModuleToken, Vec<Document>>,
}

impl ConfigSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append without deduplicating, the way a file read sees documents
    pub fn push(&mut self, token: ModuleToken, document: Document) {
        self.resources.entry(token).or_default().push(document);
    }

    /// Insert or replace the document with the same `(token, name)`
    ///
    /// A replaced document keeps its position.
    pub fn upsert(&mut self, token: ModuleToken, document: Document) {
        let documents = self.resources.entry(token).or_default();
        match documents.iter_mut().find(|d| d.name() == document.name()) {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }
    }

    /// Remove a document by `(token, name)`, returning it if present
    pub fn remove(&mut self, token: &ModuleToken, name: &str) -> Option<Document> {
        let documents = self.resources.get_mut(token)?;
        let index = documents.iter().position(|d| d.name() == name)?;
        let removed = documents.remove(index);
        if documents.is_empty() {
            self.resources.remove(token);
        }
        Some(removed)
    }

    pub fn get(&self, token: &ModuleToken, name: &str) -> Option<&Document> {
        self.resources.get(token)?.iter().find(|d| d.name() == name)
    }

    pub fn documents(&self, token: &ModuleToken) -> &[Document] {
        self.resources.get(token).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleToken, &Vec<Document>)> {
        self.resources.iter()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &ModuleToken> {
        self.resources.keys()
    }

    /// Total number of documents across all tokens
    pub fn len(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Document> for ConfigSnapshot {
    /// Collect documents, skipping any whose type key is malformed
    fn from_iter<T: IntoIterator<Item = Document>>(iter: T) -> Self {
        let mut snapshot = Self::new();
        for document in iter {
            if let Ok(token) = document.token() {
                snapshot.push(token, document);
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GatewayError;

    const TWO_DOCS: &str = r#"
apiVersion: core.example.io/v1alpha1
kind: RedisSource
metadata:
  name: cache
  namespace: shop
spec:
  priority: 10
---
---
apiVersion: core.example.io/v1alpha1
kind: OpenAPISource
metadata:
  name: petstore
spec: {}
"#;

    fn parse_all(content: &str) -> Vec<Document> {
        parse_documents(content)
            .unwrap()
            .into_iter()
            .collect::<GatewayResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_parse_multi_document_stream() {
        let docs = parse_all(TWO_DOCS);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].workspace(), "shop");
        assert_eq!(docs[1].workspace(), DEFAULT_WORKSPACE);
        assert_eq!(
            docs[0].token().unwrap().as_str(),
            "source.core---example---io--v1alpha1--redissources"
        );
        assert_eq!(docs[1].type_key().unwrap().kind, "openapisources");
    }

    #[test]
    fn test_validate_rejects_missing_group() {
        let docs = parse_all("apiVersion: v1\nkind: Thing\nmetadata:\n  name: a\n");
        assert!(docs[0].validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_name() {
        let docs = parse_all("apiVersion: a.io/v1\nkind: Thing\nmetadata:\n  name: ''\n");
        assert!(docs[0].validate().is_err());
    }

    #[test]
    fn test_malformed_entry_does_not_hide_neighbours() {
        let content = format!("{}---\nkind: Orphan\nspec: {{}}\n", TWO_DOCS);
        let entries = parse_documents(&content).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_ok());
        assert!(entries[1].is_ok());
        assert!(matches!(entries[2], Err(GatewayError::Structural { .. })));
    }

    #[test]
    fn test_invalid_yaml_rejects_stream() {
        assert!(parse_documents("apiVersion: [unterminated").is_err());
    }

    #[test]
    fn test_render_then_parse() {
        let docs = parse_all(TWO_DOCS);
        let rendered = render_documents(&docs).unwrap();
        assert_eq!(parse_all(&rendered), docs);
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("RedisSource"), "redissources");
        assert_eq!(pluralize("Policy"), "policies");
        assert_eq!(pluralize("Gateway"), "gateways");
        assert_eq!(pluralize("Class"), "classes");
        assert_eq!(pluralize("PubsubChannel"), "pubsubchannels");
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let key = ResourceTypeKey::new("a.io", "v1", "things");
        let token = key.token();
        let mut snapshot = ConfigSnapshot::new();
        snapshot.upsert(token.clone(), Document::new(&key, "Thing", "one"));
        snapshot.upsert(token.clone(), Document::new(&key, "Thing", "two"));
        snapshot.upsert(
            token.clone(),
            Document::new(&key, "Thing", "one").with_workspace("ws"),
        );

        let docs = snapshot.documents(&token);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name(), "one");
        assert_eq!(docs[0].workspace(), "ws");

        assert!(snapshot.remove(&token, "one").is_some());
        assert!(snapshot.remove(&token, "one").is_none());
        assert_eq!(snapshot.len(), 1);
        snapshot.remove(&token, "two");
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.tokens().count(), 0);
    }

    #[test]
    fn test_filter_by_workspace() {
        let key = ResourceTypeKey::new("a.io", "v1", "things");
        let filter = DocumentFilter::workspace("shop");
        assert!(filter.matches(&Document::new(&key, "Thing", "x").with_workspace("shop")));
        assert!(!filter.matches(&Document::new(&key, "Thing", "x")));
        assert!(DocumentFilter::default().matches(&Document::new(&key, "Thing", "x")));
    }
}
