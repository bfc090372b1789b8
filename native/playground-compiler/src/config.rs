//! Playground configuration
//!
//! Everything that used to be ambient (CDN origin, default versions, compiler
//! option passthroughs) is carried explicitly and injected at construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ═══════════════════════════════════════════════════════════════════════════════
// CDN
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Cdn {
    #[default]
    Unpkg,
    Jsdelivr,
    JsdelivrFastly,
    Custom(String),
}

impl Cdn {
    pub fn origin(&self) -> &str {
        match self {
            Cdn::Unpkg => "https://unpkg.com",
            Cdn::Jsdelivr => "https://cdn.jsdelivr.net/npm",
            Cdn::JsdelivrFastly => "https://fastly.jsdelivr.net/npm",
            Cdn::Custom(origin) => origin.trim_end_matches('/'),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VERSIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VersionKey {
    Vue,
    OpenTiny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versions {
    pub vue: String,
    pub open_tiny: String,
}

impl Default for Versions {
    fn default() -> Self {
        Versions {
            vue: "3.4.21".to_string(),
            open_tiny: "3.14.0".to_string(),
        }
    }
}

impl Versions {
    pub fn get(&self, key: VersionKey) -> &str {
        match key {
            VersionKey::Vue => &self.vue,
            VersionKey::OpenTiny => &self.open_tiny,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER OPTION PASSTHROUGHS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptOptions {
    /// `false` forces a separate template compile even with `<script setup>`.
    pub inline_template: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        ScriptOptions {
            inline_template: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateOptions {
    pub is_prod: bool,
    /// Tags treated as native custom elements instead of components.
    pub custom_elements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleOptions {
    pub trim: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplOptions {
    pub script: ScriptOptions,
    pub template: TemplateOptions,
    pub style: StyleOptions,
}

/// User options persisted under the `_o` key of a serialized project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_hidden: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAYGROUND CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

pub const DEFAULT_THEME_STYLE: &str = "https://unpkg.com/@opentiny/vue-theme/index.css";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaygroundConfig {
    pub cdn: Cdn,
    pub versions: Versions,
    pub options: ReplOptions,
    /// Hidden bootstrap files stay hidden unless this is set.
    pub show_hidden: bool,
    pub theme_style: String,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        PlaygroundConfig {
            cdn: Cdn::default(),
            versions: Versions::default(),
            options: ReplOptions::default(),
            show_hidden: false,
            theme_style: DEFAULT_THEME_STYLE.to_string(),
        }
    }
}

impl PlaygroundConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = PlaygroundConfig::from_json(r#"{"cdn":"jsdelivr","versions":{"vue":"2.6.14","openTiny":"3.1.0"}}"#)
            .unwrap();
        assert_eq!(config.cdn, Cdn::Jsdelivr);
        assert_eq!(config.versions.vue, "2.6.14");
        assert!(config.options.script.inline_template);
        assert_eq!(config.theme_style, DEFAULT_THEME_STYLE);
    }

    #[test]
    fn test_custom_origin_trims_slash() {
        let cdn: Cdn = serde_json::from_str(r#"{"custom":"https://mirror.example/"}"#).unwrap();
        assert_eq!(cdn.origin(), "https://mirror.example");
    }
}
