//! Native compiler for the 2.x framework family.
//!
//! 2.x components compile their template at runtime, so the template is
//! shipped as a string on `__sfc__.template`. Scoped styles still need the
//! `data-v-*` attribute on every element, which is added by round-tripping
//! the markup through an HTML parser.

use html5ever::tendril::TendrilSink;
use html5ever::{local_name, namespace_url, ns, parse_fragment, ParseOpts, QualName};
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use std::collections::HashMap;

use super::sfc_parse::parse_sfc;
use super::{
    script, style, CompiledScript, ParseOutput, ScriptCompileError, ScriptCompileOptions,
    SfcCompiler, SfcDescriptor, StyleCompileOptions, StyleOutput, TemplateCodeKind,
    TemplateCompileOptions, TemplateOutput, COMP_IDENTIFIER,
};
use crate::diagnostics::{Diagnostic, E_V2_SCRIPT_SETUP, E_V2_TEMPLATE_ROOT};
use crate::version::CompilerFamily;

lazy_static! {
    static ref TAG_NAME_RE: Regex = Regex::new(r"</?([A-Za-z][\w.\-]*)").unwrap();
    static ref ATTR_NAME_RE: Regex =
        Regex::new(r#"\s([:@#.]?[A-Za-z_][\w:.\-@#\[\]$]*)\s*(?:=|[\s/>])"#).unwrap();
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone)]
pub struct V2Compiler {
    version: String,
}

impl V2Compiler {
    pub fn new(version: impl Into<String>) -> Self {
        V2Compiler {
            version: version.into(),
        }
    }
}

impl SfcCompiler for V2Compiler {
    fn family(&self) -> CompilerFamily {
        CompilerFamily::V2
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn parse(&self, source: &str, filename: &str) -> ParseOutput {
        parse_sfc(source, filename)
    }

    /// `<script setup>` is reported and compiled to an empty component.
    fn compile_script(
        &self,
        descriptor: &SfcDescriptor,
        options: &ScriptCompileOptions,
    ) -> Result<CompiledScript, ScriptCompileError> {
        if descriptor.script_setup.is_some() {
            return Ok(CompiledScript {
                content: String::new(),
                bindings: None,
                notices: vec![Diagnostic::new(
                    E_V2_SCRIPT_SETUP,
                    "<script setup> is not supported",
                    &descriptor.filename,
                )],
            });
        }
        script::compile_script(descriptor, options)
    }

    fn compile_template(&self, options: &TemplateCompileOptions) -> TemplateOutput {
        let mut notices = Vec::new();
        let markup = if options.scoped {
            let (markup, roots) = scope_markup(&options.source, &options.id);
            if roots != 1 {
                notices.push(Diagnostic::new(
                    E_V2_TEMPLATE_ROOT,
                    "only one element on template root allowed",
                    &options.filename,
                ));
            }
            markup
        } else {
            options.source.clone()
        };

        TemplateOutput {
            code: format!("\n{}.template = `{}`", COMP_IDENTIFIER, escape_template_literal(&markup)),
            kind: TemplateCodeKind::Attached,
            errors: Vec::new(),
            notices,
        }
    }

    fn compile_style(&self, options: &StyleCompileOptions) -> StyleOutput {
        style::compile_style(options)
    }

    fn rewrite_default(
        &self,
        source: &str,
        as_name: &str,
        is_ts: bool,
    ) -> Result<String, ScriptCompileError> {
        script::rewrite_default(source, as_name, is_ts)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPED MARKUP
// ═══════════════════════════════════════════════════════════════════════════════

/// Add `data-v-<id>` to every element of the first root element.
///
/// Returns the serialized root and how many root elements there were.
fn scope_markup(source: &str, id: &str) -> (String, usize) {
    let dom = parse_fragment(
        RcDom::default(),
        ParseOpts::default(),
        QualName::new(None, ns!(html), local_name!("div")),
        vec![],
    )
    .one(source);

    // The parser lowercases names; restore the author's casing.
    let mut casing: HashMap<String, String> = HashMap::new();
    for caps in TAG_NAME_RE.captures_iter(source).chain(ATTR_NAME_RE.captures_iter(source)) {
        let name = caps[1].to_string();
        casing.entry(name.to_ascii_lowercase()).or_insert(name);
    }

    let container = dom
        .document
        .children
        .borrow()
        .first()
        .cloned();
    let Some(container) = container else {
        return (String::new(), 0);
    };

    let roots: Vec<Handle> = container
        .children
        .borrow()
        .iter()
        .filter(|c| matches!(c.data, NodeData::Element { .. }))
        .cloned()
        .collect();

    let attribute = format!("data-v-{}", id);
    let mut out = String::new();
    if let Some(first) = roots.first() {
        serialize(first, &attribute, &casing, &mut out);
    }
    (out, roots.len())
}

fn restore<'c>(name: &'c str, casing: &'c HashMap<String, String>) -> &'c str {
    casing.get(name).map(|s| s.as_str()).unwrap_or(name)
}

fn serialize(handle: &Handle, scope_attr: &str, casing: &HashMap<String, String>, out: &mut String) {
    match &handle.data {
        NodeData::Element {
            name,
            attrs,
            template_contents,
            ..
        } => {
            let tag = restore(&name.local, casing);
            out.push('<');
            out.push_str(tag);
            for attr in attrs.borrow().iter() {
                out.push(' ');
                out.push_str(restore(&attr.name.local, casing));
                out.push_str("=\"");
                out.push_str(&attr.value.replace('&', "&amp;").replace('"', "&quot;"));
                out.push('"');
            }
            out.push(' ');
            out.push_str(scope_attr);
            out.push_str("=\"\">");

            if VOID_ELEMENTS.contains(&&*name.local) {
                return;
            }
            let contents = template_contents.borrow().clone();
            let children_of = contents.as_ref().unwrap_or(handle);
            for child in children_of.children.borrow().iter() {
                serialize(child, scope_attr, casing, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeData::Text { contents } => {
            let text = contents.borrow();
            out.push_str(&text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;"));
        }
        NodeData::Comment { contents } => {
            out.push_str("<!--");
            out.push_str(contents);
            out.push_str("-->");
        }
        _ => {
            for child in handle.children.borrow().iter() {
                serialize(child, scope_attr, casing, out);
            }
        }
    }
}

fn escape_template_literal(source: &str) -> String {
    source
        .replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(source: &str, scoped: bool) -> TemplateOutput {
        V2Compiler::new("2.7.16").compile_template(&TemplateCompileOptions {
            source: source.to_string(),
            filename: "src/App.vue".to_string(),
            id: "abcd1234".to_string(),
            scoped,
            ..Default::default()
        })
    }

    #[test]
    fn test_unscoped_template_is_attached_verbatim() {
        let out = template("<div>{{ msg }}</div>", false);
        assert_eq!(out.kind, TemplateCodeKind::Attached);
        assert_eq!(out.code, "\n__sfc__.template = `<div>{{ msg }}</div>`");
        assert!(out.notices.is_empty());
    }

    #[test]
    fn test_scoped_template_marks_every_element() {
        let out = template("<div class=\"a\"><MyButton :onClick=\"go\">hi</MyButton><br></div>", true);
        assert_eq!(
            out.code,
            "\n__sfc__.template = `<div class=\"a\" data-v-abcd1234=\"\"><MyButton :onClick=\"go\" data-v-abcd1234=\"\">hi</MyButton><br data-v-abcd1234=\"\"></div>`"
        );
    }

    #[test]
    fn test_multiple_roots_reported() {
        let out = template("<p>a</p><p>b</p>", true);
        assert_eq!(out.notices.len(), 1);
        assert_eq!(out.notices[0].code, E_V2_TEMPLATE_ROOT);
        assert!(out.code.contains("<p data-v-abcd1234=\"\">a</p>`"));
    }

    #[test]
    fn test_template_literal_is_escaped() {
        let out = template("<p>`${x}`</p>", false);
        assert_eq!(out.code, "\n__sfc__.template = `<p>\\`\\${x}\\`</p>`");
    }

    #[test]
    fn test_script_setup_is_reported() {
        let compiler = V2Compiler::new("2.7.16");
        let descriptor = parse_sfc("<script setup>\nconst a = 1\n</script>", "src/App.vue").descriptor;
        let out = compiler
            .compile_script(&descriptor, &ScriptCompileOptions::default())
            .unwrap();
        assert_eq!(out.notices[0].code, E_V2_SCRIPT_SETUP);
        assert_eq!(
            compiler.rewrite_default(&out.content, COMP_IDENTIFIER, false).unwrap(),
            "\nconst __sfc__ = {}"
        );
    }
}
