//! Source Unit Model
//!
//! One virtual file of the playground project together with its compiled
//! artifacts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArtifacts {
    pub js: Option<String>,
    pub ssr: Option<String>,
    pub css: Option<String>,
}

impl CompiledArtifacts {
    pub fn is_empty(&self) -> bool {
        self.js.is_none() && self.ssr.is_none() && self.css.is_none()
    }
}

/// Cursor/selection of the editor. Cosmetic; the compiler never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EditorSelection {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// How the pipeline routes a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Css,
    Less,
    Script { typescript: bool },
    Json,
    Component,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUnit {
    pub filename: String,
    pub code: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub compiled: CompiledArtifacts,
    #[serde(default)]
    pub selection: Option<EditorSelection>,
}

impl SourceUnit {
    pub fn new(filename: impl Into<String>, code: impl Into<String>) -> Self {
        SourceUnit {
            filename: filename.into(),
            code: code.into(),
            hidden: false,
            compiled: CompiledArtifacts::default(),
            selection: None,
        }
    }

    pub fn hidden(filename: impl Into<String>, code: impl Into<String>) -> Self {
        SourceUnit {
            hidden: true,
            ..Self::new(filename, code)
        }
    }

    pub fn empty(filename: impl Into<String>) -> Self {
        Self::new(filename, "")
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.filename.rsplit('/').next().unwrap_or(&self.filename);
        name.rfind('.').map(|idx| &name[idx + 1..])
    }

    pub fn kind(&self) -> SourceKind {
        match self.extension() {
            Some("css") => SourceKind::Css,
            Some("less") => SourceKind::Less,
            Some("js") => SourceKind::Script { typescript: false },
            Some("ts") => SourceKind::Script { typescript: true },
            Some("json") => SourceKind::Json,
            Some("vue") => SourceKind::Component,
            _ => SourceKind::Unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_routing() {
        assert_eq!(SourceUnit::empty("src/App.vue").kind(), SourceKind::Component);
        assert_eq!(SourceUnit::empty("a.ts").kind(), SourceKind::Script { typescript: true });
        assert_eq!(SourceUnit::empty("src/theme.less").kind(), SourceKind::Less);
        assert_eq!(SourceUnit::empty("import-map.json").kind(), SourceKind::Json);
        assert_eq!(SourceUnit::empty("README").kind(), SourceKind::Unsupported);
        assert_eq!(SourceUnit::empty("src.d/README").extension(), None);
    }

    #[test]
    fn test_hidden_constructor() {
        let unit = SourceUnit::hidden("src/PlaygroundMain.vue", "<template/>");
        assert!(unit.hidden);
        assert!(unit.compiled.is_empty());
    }
}
