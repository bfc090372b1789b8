//! Import Map Composer

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ImportMap {
    #[serde(default)]
    pub imports: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub scopes: IndexMap<String, IndexMap<String, String>>,
}

impl ImportMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, specifier: impl Into<String>, url: impl Into<String>) {
        self.imports.insert(specifier.into(), url.into());
    }

    pub fn resolve(&self, specifier: &str) -> Option<&str> {
        self.imports.get(specifier).map(String::as_str)
    }

    /// Parse the user-edited import-map file. A blank or malformed file is an
    /// empty map, never an error.
    pub fn parse_user(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Self::default();
        }
        match serde_json::from_str(text) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed import map");
                Self::default()
            }
        }
    }
}

/// User entries win over generated ones; keys present on one side pass through.
pub fn merge_import_map(generated: &ImportMap, user: &ImportMap) -> ImportMap {
    let mut imports = generated.imports.clone();
    for (key, url) in &user.imports {
        imports.insert(key.clone(), url.clone());
    }
    let mut scopes = generated.scopes.clone();
    for (key, scope) in &user.scopes {
        scopes.insert(key.clone(), scope.clone());
    }
    ImportMap { imports, scopes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> ImportMap {
        let mut m = ImportMap::new();
        for (k, v) in entries {
            m.insert(*k, *v);
        }
        m
    }

    #[test]
    fn test_user_overrides_generated() {
        let generated = map(&[("vue", "https://cdn/vue.js"), ("@vue/shared", "https://cdn/shared.js")]);
        let user = map(&[("vue", "https://local/vue.js"), ("lodash", "https://cdn/lodash.js")]);
        let merged = merge_import_map(&generated, &user);
        assert_eq!(merged.resolve("vue"), Some("https://local/vue.js"));
        assert_eq!(merged.resolve("@vue/shared"), Some("https://cdn/shared.js"));
        assert_eq!(merged.resolve("lodash"), Some("https://cdn/lodash.js"));
        assert_eq!(merged.imports.len(), 3);
    }

    #[test]
    fn test_parse_user_is_lenient() {
        assert_eq!(ImportMap::parse_user("  "), ImportMap::default());
        assert_eq!(ImportMap::parse_user("{ not json"), ImportMap::default());
        let parsed = ImportMap::parse_user(r#"{"imports":{"a":"https://x/a.js"}}"#);
        assert_eq!(parsed.resolve("a"), Some("https://x/a.js"));
    }

    #[test]
    fn test_scopes_merge() {
        let generated: ImportMap =
            serde_json::from_str(r#"{"imports":{},"scopes":{"/a/":{"x":"1"}}}"#).unwrap();
        let user: ImportMap =
            serde_json::from_str(r#"{"imports":{},"scopes":{"/b/":{"y":"2"}}}"#).unwrap();
        let merged = merge_import_map(&generated, &user);
        assert_eq!(merged.scopes.len(), 2);
    }
}
