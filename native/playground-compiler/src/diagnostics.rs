#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const E_SFC_PARSE: &str = "E-SFC-PARSE";
pub const E_UNSUPPORTED_LANG: &str = "E-UNSUPPORTED-LANG";
pub const E_SCRIPT_LANG: &str = "E-SCRIPT-LANG";
pub const E_STYLE_MODULE: &str = "E-STYLE-MODULE";
pub const E_SCRIPT_COMPILE: &str = "E-SCRIPT-COMPILE";
pub const E_TEMPLATE_COMPILE: &str = "E-TEMPLATE-COMPILE";
pub const E_STYLE_COMPILE: &str = "E-STYLE-COMPILE";
pub const E_JSON_PARSE: &str = "E-JSON-PARSE";
pub const E_PREPROCESS: &str = "E-PREPROCESS";
pub const E_TRANSFORM: &str = "E-TRANSFORM";
pub const E_V2_SCRIPT_SETUP: &str = "E-V2-SCRIPT-SETUP";
pub const E_V2_TEMPLATE_ROOT: &str = "E-V2-TEMPLATE-ROOT";
pub const E_PROJECT: &str = "E-PROJECT";
pub const E_LOAD: &str = "E-LOAD";

fn get_hint(code: &str) -> Option<&'static str> {
    match code {
        E_UNSUPPORTED_LANG => Some("Only plain templates and css/less styles can be compiled."),
        E_SCRIPT_LANG => Some("Use lang=\"ts\" or omit the lang attribute."),
        E_STYLE_MODULE => Some("Use scoped styles instead of CSS modules."),
        E_V2_SCRIPT_SETUP => Some("Vue 2 builds only understand the options API <script> block."),
        E_V2_TEMPLATE_ROOT => Some("Wrap the template content in a single element."),
        E_LOAD => Some("Check the selected CDN and version, then retry."),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC
// ═══════════════════════════════════════════════════════════════════════════════

/// A user-facing compile or project error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: &str, message: impl Into<String>, file: &str) -> Self {
        Self::at(code, message, file, 0, 0)
    }

    pub fn at(code: &str, message: impl Into<String>, file: &str, line: u32, column: u32) -> Self {
        Diagnostic {
            code: code.to_string(),
            message: message.into(),
            file: file.to_string(),
            line,
            column,
            hints: get_hint(code).map(|h| vec![h.to_string()]).unwrap_or_default(),
        }
    }

    /// Attach a location computed from a byte offset into `source`.
    pub fn with_offset(mut self, source: &str, offset: usize) -> Self {
        let (line, column) = line_column(source, offset);
        self.line = line;
        self.column = column;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// 1-based line/column of a byte offset. Offsets past the end clamp to the end.
pub fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let mut end = offset.min(source.len());
    while !source.is_char_boundary(end) {
        end -= 1;
    }
    let before = &source[..end];
    let line = before.matches('\n').count() as u32 + 1;
    let column = match before.rfind('\n') {
        Some(idx) => before[idx + 1..].chars().count() as u32 + 1,
        None => before.chars().count() as u32 + 1,
    };
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        let src = "ab\ncd\nef";
        assert_eq!(line_column(src, 0), (1, 1));
        assert_eq!(line_column(src, 4), (2, 2));
        assert_eq!(line_column(src, 100), (3, 3));
    }

    #[test]
    fn test_hint_attached_for_known_codes() {
        let d = Diagnostic::new(E_STYLE_MODULE, "no modules", "src/App.vue");
        assert_eq!(d.hints.len(), 1);
        let d = Diagnostic::new(E_JSON_PARSE, "bad json", "data.json");
        assert!(d.hints.is_empty());
        assert_eq!(d.to_string(), "bad json");
    }
}
