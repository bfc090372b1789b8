//! Style compilation
//!
//! Rewrites selectors of scoped blocks with the component's attribute,
//! resolves `:deep()`, `:global()` and `:slotted()`, and turns `v-bind()`
//! references into custom properties set at runtime.

use lazy_static::lazy_static;
use regex::Regex;

use super::{StyleCompileOptions, StyleError, StyleErrorKind, StyleOutput};

lazy_static! {
    static ref V_BIND_RE: Regex =
        Regex::new(r#"v-bind\s*\(\s*(?:'([^']+)'|"([^"]+)"|([^'"][^)]*?))\s*\)"#).unwrap();
    static ref CSS_VAR_ESCAPE_RE: Regex = Regex::new(r##"[ !"#$%&'()*+,./:;<=>?@\[\\\]^`{|}~]"##).unwrap();
    static ref RELATIVE_IMPORT_RE: Regex =
        Regex::new(r#"^\s*(?:url\(\s*)?['"]?\.{1,2}/"#).unwrap();
}

/// At-rules whose bodies hold more rules.
const NESTED_AT_RULES: &[&str] = &["media", "supports", "container", "layer", "document"];

pub fn compile_style(options: &StyleCompileOptions) -> StyleOutput {
    if options.modules {
        return StyleOutput {
            code: String::new(),
            errors: vec![StyleError {
                kind: StyleErrorKind::Unsupported,
                message: "CSS modules are not supported.".to_string(),
                offset: 0,
            }],
        };
    }

    let short_id = options.id.trim_start_matches("data-v-").to_string();
    let ctx = ScopeContext {
        attr: if options.scoped {
            Some(format!("data-v-{}", short_id))
        } else {
            None
        },
        short_id,
    };

    let mut errors = Vec::new();
    let mut code = process_rules(&options.source, 0, &ctx, &mut errors);
    if options.trim {
        code = code.trim().to_string();
    }
    StyleOutput { code, errors }
}

/// Name of the custom property backing a `v-bind()` expression.
pub fn css_var_name(short_id: &str, expr: &str) -> String {
    format!("{}-{}", short_id, CSS_VAR_ESCAPE_RE.replace_all(expr, r"\$0"))
}

struct ScopeContext {
    attr: Option<String>,
    short_id: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULE WALKER
// ═══════════════════════════════════════════════════════════════════════════════

fn process_rules(css: &str, base: usize, ctx: &ScopeContext, errors: &mut Vec<StyleError>) -> String {
    let mut out = String::with_capacity(css.len());
    let mut pos = 0;
    let bytes = css.as_bytes();

    while pos < css.len() {
        let ws_end = pos + (css[pos..].len() - css[pos..].trim_start().len());
        out.push_str(&css[pos..ws_end]);
        pos = ws_end;
        if pos >= css.len() {
            break;
        }

        if css[pos..].starts_with("/*") {
            let end = css[pos + 2..].find("*/").map(|e| pos + 2 + e + 2).unwrap_or(css.len());
            out.push_str(&css[pos..end]);
            pos = end;
            continue;
        }

        if bytes[pos] == b'}' {
            errors.push(syntax_error("Unexpected }", base + pos));
            pos += 1;
            continue;
        }

        let Some((stop, stop_char)) = scan_until(css, pos, &[b'{', b';', b'}']) else {
            // trailing declaration-less text
            let rest = css[pos..].trim();
            if !rest.is_empty() {
                errors.push(syntax_error("Unknown word", base + pos));
            }
            break;
        };

        let prelude = &css[pos..stop];
        match stop_char {
            b';' => {
                if let Some(target) = prelude.trim_start().strip_prefix("@import") {
                    if RELATIVE_IMPORT_RE.is_match(target) {
                        errors.push(StyleError {
                            kind: StyleErrorKind::PathResolution,
                            message: format!(
                                "Cannot resolve {} outside of a file system",
                                target.trim()
                            ),
                            offset: base + pos,
                        });
                    }
                } else if !prelude.trim_start().starts_with('@') {
                    errors.push(syntax_error("Unknown word", base + pos));
                }
                out.push_str(&css[pos..=stop]);
                pos = stop + 1;
            }
            b'}' => {
                errors.push(syntax_error("Unknown word", base + pos));
                pos = stop;
            }
            _ => {
                let Some(close) = matching_brace(css, stop) else {
                    errors.push(syntax_error("Unclosed block", base + pos));
                    break;
                };
                let body = &css[stop + 1..close];
                let body_base = base + stop + 1;
                let trimmed = prelude.trim_start();

                if let Some(at) = trimmed.strip_prefix('@') {
                    let name: String = at
                        .chars()
                        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                        .collect();
                    let bare = name.trim_start_matches("-webkit-").trim_start_matches("-moz-");
                    if NESTED_AT_RULES.contains(&bare) {
                        out.push_str(prelude);
                        out.push('{');
                        out.push_str(&process_rules(body, body_base, ctx, errors));
                        out.push('}');
                    } else {
                        // @keyframes, @font-face, @page: kept as written
                        out.push_str(&css[pos..=close]);
                    }
                } else {
                    let trailing_ws = &prelude[prelude.trim_end().len()..];
                    out.push_str(&rewrite_selector_list(prelude.trim(), ctx));
                    out.push_str(trailing_ws);
                    out.push('{');
                    out.push_str(&rewrite_v_bind(body, &ctx.short_id));
                    out.push('}');
                }
                pos = close + 1;
            }
        }
    }
    out
}

fn syntax_error(message: &str, offset: usize) -> StyleError {
    StyleError {
        kind: StyleErrorKind::Syntax,
        message: message.to_string(),
        offset,
    }
}

/// First of `stops` at nesting depth zero, outside strings and comments.
fn scan_until(css: &str, from: usize, stops: &[u8]) -> Option<(usize, u8)> {
    let bytes = css.as_bytes();
    let mut i = from;
    let mut paren = 0i32;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' | b'\'' => i = skip_string(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = css[i + 2..].find("*/").map(|e| i + 2 + e + 1).unwrap_or(bytes.len());
            }
            b'(' => paren += 1,
            b')' => paren -= 1,
            _ if paren == 0 && stops.contains(&b) => return Some((i, b)),
            _ => {}
        }
        i += 1;
    }
    None
}

fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            return i;
        }
        i += 1;
    }
    bytes.len()
}

fn matching_brace(css: &str, open: usize) -> Option<usize> {
    let bytes = css.as_bytes();
    let mut depth = 0i32;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => i = skip_string(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = css[i + 2..].find("*/").map(|e| i + 2 + e + 1).unwrap_or(bytes.len());
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn rewrite_v_bind(body: &str, short_id: &str) -> String {
    V_BIND_RE
        .replace_all(body, |caps: &regex::Captures| {
            let expr = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim())
                .unwrap_or_default();
            format!("var(--{})", css_var_name(short_id, expr))
        })
        .into_owned()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTORS
// ═══════════════════════════════════════════════════════════════════════════════

fn rewrite_selector_list(list: &str, ctx: &ScopeContext) -> String {
    let Some(attr) = &ctx.attr else {
        return list.to_string();
    };
    split_top_level(list, b',')
        .into_iter()
        .map(|s| rewrite_selector(s.trim(), attr))
        .collect::<Vec<_>>()
        .join(",\n")
}

fn rewrite_selector(selector: &str, attr: &str) -> String {
    if let Some((before, inner, after)) = pseudo_function(selector, ":global(") {
        return format!("{}{}{}", before, inner, after);
    }
    if let Some((before, inner, after)) = pseudo_function(selector, ":slotted(") {
        let slotted = scope_compound(inner.trim(), &format!("[{}-s]", attr));
        return format!("{}{}{}", before, slotted, after);
    }
    if let Some((before, inner, after)) = pseudo_function(selector, ":deep(") {
        let before = before.trim_end();
        let scoped = if before.is_empty() {
            format!("[{}]", attr)
        } else {
            scope_compound(before, &format!("[{}]", attr))
        };
        return format!("{} {}{}", scoped, inner.trim(), after);
    }
    scope_compound(selector, &format!("[{}]", attr))
}

/// `(before, inner, after)` around the first `name...)` occurrence.
fn pseudo_function<'s>(selector: &'s str, name: &str) -> Option<(&'s str, &'s str, &'s str)> {
    let start = selector.find(name)?;
    let open = start + name.len() - 1;
    let bytes = selector.as_bytes();
    let mut depth = 0i32;
    for (i, b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&selector[..start], &selector[open + 1..i], &selector[i + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Insert `attr` after the last compound selector, before its pseudos.
fn scope_compound(selector: &str, attr: &str) -> String {
    let bytes = selector.as_bytes();
    let mut last_start = 0;
    let mut depth = 0i32;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            b' ' | b'>' | b'+' | b'~' | b'\n' | b'\t' if depth == 0 => last_start = i + 1,
            _ => {}
        }
    }
    let compound = &selector[last_start..];
    let mut insert = compound.len();
    depth = 0;
    for (i, b) in compound.as_bytes().iter().enumerate() {
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            b':' if depth == 0 => {
                insert = i;
                break;
            }
            _ => {}
        }
    }
    let (head, pseudo) = compound.split_at(insert);
    let head = if head == "*" { "" } else { head };
    format!("{}{}{}{}", &selector[..last_start], head, attr, pseudo)
}

fn split_top_level(input: &str, sep: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, b) in input.as_bytes().iter().enumerate() {
        match *b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scoped(source: &str) -> StyleOutput {
        compile_style(&StyleCompileOptions {
            source: source.to_string(),
            filename: "src/App.vue".to_string(),
            id: "1a2b3c4d".to_string(),
            scoped: true,
            modules: false,
            trim: true,
        })
    }

    #[test]
    fn test_scoped_selectors() {
        let out = scoped(".a .b:hover, p > span { color: red; }");
        assert!(out.errors.is_empty());
        assert_eq!(
            out.code,
            ".a .b[data-v-1a2b3c4d]:hover,\np > span[data-v-1a2b3c4d] { color: red; }"
        );
    }

    #[test]
    fn test_deep_global_slotted() {
        assert_eq!(
            rewrite_selector(".a :deep(.b)", "data-v-x"),
            ".a[data-v-x] .b"
        );
        assert_eq!(rewrite_selector(":global(.c)", "data-v-x"), ".c");
        assert_eq!(rewrite_selector(":slotted(div)", "data-v-x"), "div[data-v-x-s]");
        assert_eq!(rewrite_selector("*", "data-v-x"), "[data-v-x]");
    }

    #[test]
    fn test_media_recursed_keyframes_verbatim() {
        let out = scoped("@media (max-width: 600px) { .a { top: 0 } }\n@keyframes spin { from { top: 0 } }");
        assert!(out.code.contains("@media (max-width: 600px) { .a[data-v-1a2b3c4d] { top: 0 } }"));
        assert!(out.code.contains("@keyframes spin { from { top: 0 } }"));
    }

    #[test]
    fn test_v_bind_becomes_custom_property() {
        let out = scoped(".a { color: v-bind(color); width: v-bind('size.w'); }");
        assert!(out.code.contains("color: var(--1a2b3c4d-color)"));
        assert!(out.code.contains(r"width: var(--1a2b3c4d-size\.w)"));
    }

    #[test]
    fn test_errors_are_typed() {
        let out = scoped(".a { color: red;");
        assert_eq!(out.errors[0].kind, StyleErrorKind::Syntax);

        let out = scoped("@import './base.css';\n.a { color: red }");
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].is_benign());

        let out = scoped("@import 'https://cdn.example.com/x.css';");
        assert!(out.errors.is_empty());
    }
}
