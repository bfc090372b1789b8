//! SFC compiler capability
//!
//! The pipeline talks to one `SfcCompiler` at a time. Which implementation
//! that is gets decided once, at the loader boundary, from the requested
//! framework version; nothing below this trait looks at version strings.

pub mod expression;
pub mod render;
pub mod sfc_parse;
pub mod script;
pub mod ssr;
pub mod style;
pub mod template;
pub mod v2;
pub mod v3;

#[cfg(test)]
mod compiler_tests;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::diagnostics::Diagnostic;
use crate::version::CompilerFamily;

pub use v2::V2Compiler;
pub use v3::V3Compiler;

/// Identifier every compiled component is bound to before export.
pub const COMP_IDENTIFIER: &str = "__sfc__";

// ═══════════════════════════════════════════════════════════════════════════════
// DESCRIPTOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SfcBlock {
    pub tag: String,
    pub content: String,
    pub attrs: IndexMap<String, String>,
    pub lang: Option<String>,
    /// Byte offset of `content` inside the component source.
    pub offset: usize,
}

impl SfcBlock {
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StyleBlock {
    pub block: SfcBlock,
    pub scoped: bool,
    /// `Some("")` for a bare `module` attribute.
    pub module: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SfcDescriptor {
    pub filename: String,
    pub source: String,
    pub template: Option<SfcBlock>,
    pub script: Option<SfcBlock>,
    pub script_setup: Option<SfcBlock>,
    pub styles: Vec<StyleBlock>,
    pub custom_blocks: Vec<SfcBlock>,
    /// Expressions referenced through `v-bind()` in style blocks.
    pub css_vars: Vec<String>,
    pub slotted: bool,
}

impl SfcDescriptor {
    pub fn script_lang(&self) -> Option<&str> {
        self.script
            .as_ref()
            .and_then(|s| s.lang.as_deref())
            .or_else(|| self.script_setup.as_ref().and_then(|s| s.lang.as_deref()))
    }

    pub fn has_scoped_style(&self) -> bool {
        self.styles.iter().any(|s| s.scoped)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub descriptor: SfcDescriptor,
    pub errors: Vec<Diagnostic>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingType {
    Data,
    Props,
    Options,
    SetupConst,
    SetupReactiveConst,
    SetupRef,
    SetupMaybeRef,
    SetupLet,
}

impl BindingType {
    pub fn is_setup(self) -> bool {
        !matches!(self, BindingType::Data | BindingType::Props | BindingType::Options)
    }
}

/// Ordered so that the "Analyzed bindings" comment is stable between runs.
pub type BindingMetadata = IndexMap<String, BindingType>;

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS & OUTPUTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct ScriptCompileOptions {
    pub id: String,
    pub is_ts: bool,
    pub inline_template: bool,
    pub ssr: bool,
    pub is_prod: bool,
    pub custom_elements: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CompiledScript {
    pub content: String,
    pub bindings: Option<BindingMetadata>,
    /// Project-wide notices that do not block this file.
    pub notices: Vec<Diagnostic>,
}

/// Carries the error text; the pipeline keeps only its leading lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCompileError {
    pub message: String,
    pub frame: Vec<String>,
}

impl ScriptCompileError {
    pub fn new(message: impl Into<String>) -> Self {
        ScriptCompileError {
            message: message.into(),
            frame: Vec::new(),
        }
    }

    /// Attach a code frame around `offset` in `source`.
    pub fn with_frame(mut self, source: &str, offset: usize) -> Self {
        let (line, column) = crate::diagnostics::line_column(source, offset);
        self.frame.push(format!("    at line {}:{}", line, column));
        let lines: Vec<&str> = source.lines().collect();
        let first = (line as usize).saturating_sub(3);
        let last = (line as usize + 2).min(lines.len());
        for (idx, text) in lines.iter().enumerate().take(last).skip(first) {
            let marker = if idx + 1 == line as usize { ">" } else { " " };
            self.frame.push(format!("{} {:>4} | {}", marker, idx + 1, text));
        }
        self
    }
}

impl fmt::Display for ScriptCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for line in &self.frame {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptCompileError {}

#[derive(Debug, Clone, Default)]
pub struct TemplateCompileOptions {
    pub source: String,
    pub filename: String,
    pub id: String,
    pub scoped: bool,
    pub ssr: bool,
    pub is_prod: bool,
    pub binding_metadata: Option<BindingMetadata>,
    pub custom_elements: Vec<String>,
}

/// What shape `TemplateOutput::code` has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateCodeKind {
    /// A module exporting `render`/`ssrRender`, to be attached by the caller.
    RenderFunction,
    /// Statements that already attach themselves to `__sfc__`.
    Attached,
}

#[derive(Debug, Clone)]
pub struct TemplateOutput {
    pub code: String,
    pub kind: TemplateCodeKind,
    pub errors: Vec<Diagnostic>,
    pub notices: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct StyleCompileOptions {
    pub source: String,
    pub filename: String,
    pub id: String,
    pub scoped: bool,
    pub modules: bool,
    pub trim: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleErrorKind {
    Syntax,
    /// Resolving a file path outside of a real filesystem. Harmless here.
    PathResolution,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleError {
    pub kind: StyleErrorKind,
    pub message: String,
    pub offset: usize,
}

impl StyleError {
    pub fn is_benign(&self) -> bool {
        self.kind == StyleErrorKind::PathResolution
    }
}

#[derive(Debug, Clone, Default)]
pub struct StyleOutput {
    pub code: String,
    pub errors: Vec<StyleError>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CAPABILITY
// ═══════════════════════════════════════════════════════════════════════════════

pub trait SfcCompiler: Send + Sync {
    fn family(&self) -> CompilerFamily;

    fn version(&self) -> &str;

    fn parse(&self, source: &str, filename: &str) -> ParseOutput;

    fn compile_script(
        &self,
        descriptor: &SfcDescriptor,
        options: &ScriptCompileOptions,
    ) -> Result<CompiledScript, ScriptCompileError>;

    fn compile_template(&self, options: &TemplateCompileOptions) -> TemplateOutput;

    fn compile_style(&self, options: &StyleCompileOptions) -> StyleOutput;

    /// Turn the module's default export into `const <as_name> = ...`.
    fn rewrite_default(
        &self,
        source: &str,
        as_name: &str,
        is_ts: bool,
    ) -> Result<String, ScriptCompileError>;
}
