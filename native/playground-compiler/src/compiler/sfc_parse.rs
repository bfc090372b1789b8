//! SFC descriptor parsing
//!
//! Splits a component file into its top-level `<template>`, `<script>`,
//! `<script setup>`, `<style>` and custom blocks. Block contents are kept
//! verbatim; nothing inside them is interpreted here except the `v-bind()`
//! references of style blocks.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use super::{ParseOutput, SfcBlock, SfcDescriptor, StyleBlock};
use crate::diagnostics::{Diagnostic, E_SFC_PARSE};

lazy_static! {
    /// Attribute regex for parsing block attributes
    static ref ATTR_REGEX: Regex =
        Regex::new(r#"(?i)([a-z0-9_:@.-]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^>\s"']+)))?"#).unwrap();

    static ref CSS_VAR_RE: Regex =
        Regex::new(r#"v-bind\s*\(\s*(?:'([^']+)'|"([^"]+)"|([^'"][^)]*?))\s*\)"#).unwrap();

    static ref CSS_COMMENT_RE: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
}

pub fn parse_sfc(source: &str, filename: &str) -> ParseOutput {
    let mut descriptor = SfcDescriptor {
        filename: filename.to_string(),
        source: source.to_string(),
        ..Default::default()
    };
    let mut errors = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        if source[i..].starts_with("<!--") {
            match source[i + 4..].find("-->") {
                Some(end) => i = i + 4 + end + 3,
                None => {
                    errors.push(error(source, filename, i, "Unterminated comment."));
                    break;
                }
            }
            continue;
        }

        if source[i..].starts_with("</") {
            let name = read_tag_name(&source[i + 2..]);
            errors.push(error(
                source,
                filename,
                i,
                &format!("Invalid end tag </{}>.", name),
            ));
            i += 2 + name.len().max(1);
            continue;
        }

        let tag = read_tag_name(&source[i + 1..]);
        if tag.is_empty() {
            i += 1;
            continue;
        }

        let Some(open_end) = find_open_tag_end(source, i + 1 + tag.len()) else {
            errors.push(error(source, filename, i, &format!("Unclosed start tag <{}>.", tag)));
            break;
        };
        let self_closing = source[..open_end].ends_with('/');
        let attr_end = if self_closing { open_end - 1 } else { open_end };
        let attrs = parse_attrs(&source[i + 1 + tag.len()..attr_end]);
        let content_start = open_end + 1;

        let (content, next) = if self_closing {
            (String::new(), content_start)
        } else {
            let close = if tag.eq_ignore_ascii_case("template") {
                find_template_close(source, content_start)
            } else {
                find_close(source, content_start, &tag)
            };
            match close {
                Some((close_start, close_end)) => {
                    (source[content_start..close_start].to_string(), close_end)
                }
                None => {
                    errors.push(error(
                        source,
                        filename,
                        i,
                        &format!("Element <{}> is missing end tag.", tag),
                    ));
                    break;
                }
            }
        };

        let lang = attrs.get("lang").cloned();
        let block = SfcBlock {
            tag: tag.to_lowercase(),
            content,
            attrs,
            lang,
            offset: content_start,
        };

        match block.tag.as_str() {
            "template" => {
                if descriptor.template.is_some() {
                    errors.push(error(
                        source,
                        filename,
                        i,
                        "Single file component can contain only one <template> element",
                    ));
                } else {
                    descriptor.template = Some(block);
                }
            }
            "script" => {
                let is_setup = block.has_attr("setup");
                let slot = if is_setup {
                    &mut descriptor.script_setup
                } else {
                    &mut descriptor.script
                };
                if slot.is_some() {
                    let what = if is_setup { "<script setup>" } else { "<script>" };
                    errors.push(error(
                        source,
                        filename,
                        i,
                        &format!("Single file component can contain only one {} element", what),
                    ));
                } else {
                    *slot = Some(block);
                }
            }
            "style" => {
                let scoped = block.has_attr("scoped");
                let module = block.attrs.get("module").cloned();
                descriptor.styles.push(StyleBlock {
                    block,
                    scoped,
                    module,
                });
            }
            _ => descriptor.custom_blocks.push(block),
        }

        i = next;
    }

    if let (Some(script), Some(setup)) = (&descriptor.script, &descriptor.script_setup) {
        if script.lang != setup.lang {
            errors.push(error(
                source,
                filename,
                setup.offset,
                "<script> and <script setup> must have the same language type.",
            ));
        }
    }

    descriptor.css_vars = collect_css_vars(&descriptor.styles);
    descriptor.slotted = descriptor
        .styles
        .iter()
        .any(|s| s.scoped && s.block.content.contains(":slotted("));

    ParseOutput { descriptor, errors }
}

fn error(source: &str, filename: &str, offset: usize, message: &str) -> Diagnostic {
    Diagnostic::new(E_SFC_PARSE, message, filename).with_offset(source, offset)
}

fn read_tag_name(rest: &str) -> &str {
    let end = rest
        .char_indices()
        .find(|(idx, c)| {
            if *idx == 0 {
                !c.is_ascii_alphabetic()
            } else {
                !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            }
        })
        .map(|(idx, _)| idx)
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Index of the `>` closing a start tag, skipping quoted attribute values.
fn find_open_tag_end(source: &str, from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, b) in source.as_bytes()[from..].iter().enumerate() {
        match quote {
            Some(q) if *b == q => quote = None,
            Some(_) => {}
            None if *b == b'"' || *b == b'\'' => quote = Some(*b),
            None if *b == b'>' => return Some(from + offset),
            None => {}
        }
    }
    None
}

/// `(start of "</tag", index after its ">")` for the first closing tag.
fn find_close(source: &str, from: usize, tag: &str) -> Option<(usize, usize)> {
    let needle = format!("</{}", tag.to_ascii_lowercase());
    let lower = source[from..].to_ascii_lowercase();
    let mut search = 0;
    while let Some(pos) = lower[search..].find(&needle) {
        let start = search + pos;
        let after = start + needle.len();
        let boundary = lower[after..]
            .chars()
            .next()
            .map(|c| c == '>' || c.is_whitespace())
            .unwrap_or(false);
        if boundary {
            let gt = lower[after..].find('>')?;
            return Some((from + start, from + after + gt + 1));
        }
        search = after;
    }
    None
}

/// Like `find_close` but balances nested `<template>` elements.
fn find_template_close(source: &str, from: usize) -> Option<(usize, usize)> {
    lazy_static! {
        static ref TEMPLATE_TAG_RE: Regex = Regex::new(r"(?i)<(/?)template(\s[^>]*?)?(/?)>").unwrap();
    }
    let mut depth = 1;
    for caps in TEMPLATE_TAG_RE.captures_iter(&source[from..]) {
        let m = caps.get(0)?;
        let closing = !caps[1].is_empty();
        let self_closing = !caps[3].is_empty();
        if closing {
            depth -= 1;
            if depth == 0 {
                return Some((from + m.start(), from + m.end()));
            }
        } else if !self_closing {
            depth += 1;
        }
    }
    None
}

fn parse_attrs(raw: &str) -> IndexMap<String, String> {
    let mut attrs = IndexMap::new();
    for caps in ATTR_REGEX.captures_iter(raw) {
        if let Some(name) = caps.get(1) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            attrs.insert(name.as_str().to_lowercase(), value);
        }
    }
    attrs
}

fn collect_css_vars(styles: &[StyleBlock]) -> Vec<String> {
    let mut vars: Vec<String> = Vec::new();
    for style in styles {
        let content = CSS_COMMENT_RE.replace_all(&style.block.content, "");
        for caps in CSS_VAR_RE.captures_iter(&content) {
            let expr = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            if !expr.is_empty() && !vars.contains(&expr) {
                vars.push(expr);
            }
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blocks() {
        let src = r#"<script setup lang="ts">
const msg: string = 'hi'
</script>

<template>
  <div><template v-if="ok"><span>{{ msg }}</span></template></div>
</template>

<style scoped>
.a { color: v-bind(color); }
</style>
<style lang="less">@c: red; .b { color: @c; }</style>
<docs>custom</docs>
"#;
        let out = parse_sfc(src, "src/App.vue");
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        let d = out.descriptor;
        assert!(d.script.is_none());
        let setup = d.script_setup.unwrap();
        assert_eq!(setup.lang.as_deref(), Some("ts"));
        assert!(setup.content.contains("const msg"));
        let template = d.template.unwrap();
        assert!(template.content.contains("</template></div>"));
        assert_eq!(d.styles.len(), 2);
        assert!(d.styles[0].scoped);
        assert_eq!(d.styles[1].block.lang.as_deref(), Some("less"));
        assert_eq!(d.css_vars, vec!["color".to_string()]);
        assert_eq!(d.custom_blocks.len(), 1);
    }

    #[test]
    fn test_missing_end_tag() {
        let out = parse_sfc("<template><div></div>", "src/Bad.vue");
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].message.contains("missing end tag"));
        assert_eq!(out.errors[0].line, 1);
    }

    #[test]
    fn test_duplicate_template() {
        let out = parse_sfc("<template><a/></template><template><b/></template>", "x.vue");
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].message.contains("only one <template>"));
    }

    #[test]
    fn test_style_module_attr() {
        let out = parse_sfc("<style module>.a{}</style>", "x.vue");
        assert_eq!(out.descriptor.styles[0].module.as_deref(), Some(""));
    }

    #[test]
    fn test_mismatched_script_langs() {
        let out = parse_sfc(
            "<script lang=\"ts\">export default {}</script><script setup>const a = 1</script>",
            "x.vue",
        );
        assert_eq!(out.errors.len(), 1);
    }
}
