//! Style preprocessing
//!
//! `LessPreprocessor` covers the part of Less people actually type into a
//! playground: `@var: value;` declarations with block scoping, `@var` and
//! `@{var}` references, nested rules with `&`, `//` line comments and
//! `@media` blocks nested inside rules (bubbled to the top level).

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;
use thiserror::Error;

use crate::diagnostics::line_column;

lazy_static! {
    static ref VAR_DECL_RE: Regex = Regex::new(r"(?s)^@([\w-]+)\s*:\s*(.*)$").unwrap();
    static ref VAR_REF_RE: Regex = Regex::new(r"@\{([\w-]+)\}|@([\w-]+)").unwrap();
}

const MAX_VAR_DEPTH: usize = 16;
const BUBBLING_AT_RULES: &[&str] = &["@media", "@supports", "@container"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessOutput {
    pub css: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreprocessError {
    #[error("{message} (line {line}, column {column})")]
    Syntax {
        message: String,
        line: u32,
        column: u32,
    },
    #[error("variable @{name} is undefined (line {line}, column {column})")]
    UndefinedVariable { name: String, line: u32, column: u32 },
}

pub trait StylePreprocessor: Send + Sync {
    fn render(&self, source: &str) -> Result<PreprocessOutput, PreprocessError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LessPreprocessor;

impl StylePreprocessor for LessPreprocessor {
    fn render(&self, source: &str) -> Result<PreprocessOutput, PreprocessError> {
        let cleaned = strip_line_comments(source);
        let mut parser = BlockParser {
            src: &cleaned,
            pos: 0,
        };
        let nodes = parser.parse_block(false)?;

        let mut out = String::new();
        let mut scopes: Vec<HashMap<String, (String, usize)>> = Vec::new();
        emit(&nodes, &[], &mut scopes, &cleaned, &mut out)?;
        Ok(PreprocessOutput {
            css: out.trim_end().to_string() + "\n",
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
enum Node {
    Comment(String),
    Variable { name: String, value: String, offset: usize },
    Declaration { text: String, offset: usize },
    Block { header: String, children: Vec<Node>, offset: usize },
}

/// Replace `//` comments with spaces so offsets stay valid.
fn strip_line_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut quote: Option<u8> = None;
    let mut paren_depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(q) => {
                if c == b'\\' && i + 1 < bytes.len() {
                    out.push_str(&source[i..i + 2]);
                    i += 2;
                    continue;
                }
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                b'"' | b'\'' => quote = Some(c),
                b'(' => paren_depth += 1,
                b')' => paren_depth = paren_depth.saturating_sub(1),
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    let end = source[i + 2..].find("*/").map(|e| i + 2 + e + 2).unwrap_or(bytes.len());
                    out.push_str(&source[i..end]);
                    i = end;
                    continue;
                }
                b'/' if bytes.get(i + 1) == Some(&b'/') && paren_depth == 0 => {
                    let end = source[i..].find('\n').map(|e| i + e).unwrap_or(bytes.len());
                    out.extend(std::iter::repeat(' ').take(end - i));
                    i = end;
                    continue;
                }
                _ => {}
            },
        }
        let ch_len = source[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        out.push_str(&source[i..i + ch_len]);
        i += ch_len;
    }
    out
}

struct BlockParser<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> BlockParser<'s> {
    fn error(&self, message: &str, offset: usize) -> PreprocessError {
        let (line, column) = line_column(self.src, offset);
        PreprocessError::Syntax {
            message: message.to_string(),
            line,
            column,
        }
    }

    fn parse_block(&mut self, nested: bool) -> Result<Vec<Node>, PreprocessError> {
        let mut nodes = Vec::new();
        loop {
            let rest = &self.src[self.pos..];
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if trimmed.is_empty() {
                if nested {
                    return Err(self.error("Unclosed block", self.src.len()));
                }
                return Ok(nodes);
            }
            if trimmed.starts_with("/*") {
                let end = trimmed.find("*/").map(|e| e + 2).unwrap_or(trimmed.len());
                nodes.push(Node::Comment(trimmed[..end].to_string()));
                self.pos += end;
                continue;
            }
            if trimmed.starts_with('}') {
                if !nested {
                    return Err(self.error("Unexpected }", self.pos));
                }
                self.pos += 1;
                return Ok(nodes);
            }

            let start = self.pos;
            let (end, terminator) = self.scan_statement();
            let text = self.src[start..end].trim().to_string();
            match terminator {
                Some(b'{') => {
                    self.pos = end + 1;
                    let children = self.parse_block(true)?;
                    nodes.push(Node::Block {
                        header: text,
                        children,
                        offset: start,
                    });
                }
                Some(b';') => {
                    self.pos = end + 1;
                    nodes.push(statement(text, start));
                }
                // `}` or end of input closes the statement without consuming.
                _ => {
                    self.pos = end;
                    if !text.is_empty() {
                        nodes.push(statement(text, start));
                    }
                }
            }
        }
    }

    /// Find the end of the statement starting at `self.pos`.
    fn scan_statement(&self) -> (usize, Option<u8>) {
        let bytes = self.src.as_bytes();
        let mut quote: Option<u8> = None;
        let mut paren_depth = 0usize;
        let mut i = self.pos;
        while i < bytes.len() {
            let c = bytes[i];
            if let Some(q) = quote {
                if c == b'\\' {
                    i += 2;
                    continue;
                }
                if c == q {
                    quote = None;
                }
            } else {
                match c {
                    b'"' | b'\'' => quote = Some(c),
                    b'(' => paren_depth += 1,
                    b')' => paren_depth = paren_depth.saturating_sub(1),
                    // `@{var}` interpolation is not a block opener.
                    b'{' if i > 0 && bytes[i - 1] == b'@' => {
                        if let Some(close) = self.src[i..].find('}') {
                            i += close + 1;
                            continue;
                        }
                    }
                    b'{' | b';' | b'}' if paren_depth == 0 => return (i, Some(c)),
                    _ => {}
                }
            }
            i += 1;
        }
        (bytes.len(), None)
    }
}

fn statement(text: String, offset: usize) -> Node {
    match VAR_DECL_RE.captures(&text) {
        Some(caps) if !text.starts_with("@media") && !text.starts_with("@import") => Node::Variable {
            name: caps[1].to_string(),
            value: caps[2].trim().to_string(),
            offset,
        },
        _ => Node::Declaration { text, offset },
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVALUATION
// ═══════════════════════════════════════════════════════════════════════════════

type Scope = HashMap<String, (String, usize)>;

fn lookup(
    name: &str,
    scopes: &[Scope],
    source: &str,
    offset: usize,
    depth: usize,
) -> Result<String, PreprocessError> {
    let undefined = || {
        let (line, column) = line_column(source, offset);
        PreprocessError::UndefinedVariable {
            name: name.to_string(),
            line,
            column,
        }
    };
    if depth > MAX_VAR_DEPTH {
        return Err(undefined());
    }
    let (value, _) = scopes
        .iter()
        .rev()
        .find_map(|scope| scope.get(name))
        .ok_or_else(undefined)?;
    substitute(value, scopes, source, offset, depth + 1)
}

fn substitute(
    text: &str,
    scopes: &[Scope],
    source: &str,
    offset: usize,
    depth: usize,
) -> Result<String, PreprocessError> {
    let mut error = None;
    let result = VAR_REF_RE.replace_all(text, |caps: &Captures| {
        let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
        match lookup(name, scopes, source, offset, depth) {
            Ok(value) => value,
            Err(e) => {
                error.get_or_insert(e);
                String::new()
            }
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(result.into_owned()),
    }
}

fn at_keyword(header: &str) -> &str {
    header.split(|c: char| c.is_whitespace() || c == '(').next().unwrap_or(header)
}

/// Substitute variables in an at-rule prelude, leaving the keyword alone.
fn substitute_at_rule(header: &str, scopes: &[Scope], source: &str, offset: usize) -> Result<String, PreprocessError> {
    let keyword = at_keyword(header);
    let rest = substitute(&header[keyword.len()..], scopes, source, offset, 0)?;
    Ok(format!("{}{}", keyword, rest))
}

fn resolve_selectors(parents: &[String], header: &str) -> Vec<String> {
    let own: Vec<&str> = header.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if parents.is_empty() {
        return own.iter().map(|s| s.replace('&', "")).map(|s| s.trim().to_string()).collect();
    }
    let mut out = Vec::new();
    for parent in parents {
        for sel in &own {
            if sel.contains('&') {
                out.push(sel.replace('&', parent));
            } else {
                out.push(format!("{} {}", parent, sel));
            }
        }
    }
    out
}

fn emit(
    nodes: &[Node],
    selectors: &[String],
    scopes: &mut Vec<Scope>,
    source: &str,
    out: &mut String,
) -> Result<(), PreprocessError> {
    let mut scope = Scope::new();
    for node in nodes {
        if let Node::Variable { name, value, offset } = node {
            scope.insert(name.clone(), (value.clone(), *offset));
        }
    }
    scopes.push(scope);
    let result = emit_scoped(nodes, selectors, scopes, source, out);
    scopes.pop();
    result
}

fn emit_scoped(
    nodes: &[Node],
    selectors: &[String],
    scopes: &mut Vec<Scope>,
    source: &str,
    out: &mut String,
) -> Result<(), PreprocessError> {
    let mut declarations: Vec<String> = Vec::new();
    let mut deferred = String::new();

    for node in nodes {
        match node {
            Node::Variable { .. } => {}
            Node::Comment(text) => {
                if selectors.is_empty() {
                    out.push_str(text);
                    out.push('\n');
                }
            }
            Node::Declaration { text, offset } => {
                let text = if text.starts_with('@') {
                    substitute_at_rule(text, scopes, source, *offset)?
                } else {
                    substitute(text, scopes, source, *offset, 0)?
                };
                if selectors.is_empty() {
                    out.push_str(&text);
                    out.push_str(";\n");
                } else {
                    declarations.push(text);
                }
            }
            Node::Block {
                header,
                children,
                offset,
            } => {
                if header.starts_with('@') {
                    let prelude = substitute_at_rule(header, scopes, source, *offset)?;
                    if BUBBLING_AT_RULES.contains(&at_keyword(header)) {
                        let mut inner = String::new();
                        if selectors.is_empty() {
                            emit(children, &[], scopes, source, &mut inner)?;
                        } else {
                            emit(children, selectors, scopes, source, &mut inner)?;
                        }
                        deferred.push_str(&format!("{} {{\n{}}}\n", prelude, indent(&inner)));
                    } else {
                        let mut inner = String::new();
                        emit(children, &[], scopes, source, &mut inner)?;
                        deferred.push_str(&format!("{} {{\n{}}}\n", prelude, indent(&inner)));
                    }
                } else {
                    let header = substitute(header, scopes, source, *offset, 0)?;
                    let resolved = resolve_selectors(selectors, &header);
                    let mut inner = String::new();
                    emit(children, &resolved, scopes, source, &mut inner)?;
                    deferred.push_str(&inner);
                }
            }
        }
    }

    if !declarations.is_empty() {
        out.push_str(&selectors.join(",\n"));
        out.push_str(" {\n");
        for decl in &declarations {
            out.push_str("  ");
            out.push_str(decl);
            out.push_str(";\n");
        }
        out.push_str("}\n");
    }
    out.push_str(&deferred);
    Ok(())
}

fn indent(css: &str) -> String {
    css.lines()
        .map(|l| if l.is_empty() { String::new() } else { format!("  {}\n", l) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(src: &str) -> String {
        LessPreprocessor.render(src).unwrap().css
    }

    #[test]
    fn test_variables_and_nesting() {
        let css = render("@primary: #1476ff;\n@pad: 4px;\n.btn {\n  color: @primary; // brand\n  padding: @pad @pad * 2;\n  &:hover { color: red; }\n  .icon { width: 16px; }\n}\n");
        assert_eq!(
            css,
            ".btn {\n  color: #1476ff;\n  padding: 4px 4px * 2;\n}\n.btn:hover {\n  color: red;\n}\n.btn .icon {\n  width: 16px;\n}\n"
        );
    }

    #[test]
    fn test_media_bubbles_out_of_rule() {
        let css = render(".a {\n  color: red;\n  @media (max-width: 600px) {\n    color: blue;\n  }\n}\n");
        assert_eq!(
            css,
            ".a {\n  color: red;\n}\n@media (max-width: 600px) {\n  .a {\n    color: blue;\n  }\n}\n"
        );
    }

    #[test]
    fn test_interpolation_and_scoping() {
        let css = render("@name: card;\n.@{name} {\n  @c: green;\n  color: @c;\n}\n");
        assert_eq!(css, ".card {\n  color: green;\n}\n");
    }

    #[test]
    fn test_urls_keep_double_slash() {
        let css = render(".a { background: url(http://x.test/a.png); }");
        assert!(css.contains("url(http://x.test/a.png)"));
    }

    #[test]
    fn test_errors() {
        let err = LessPreprocessor.render(".a { color: @missing; }").unwrap_err();
        assert!(matches!(err, PreprocessError::UndefinedVariable { ref name, line: 1, .. } if name == "missing"));
        let err = LessPreprocessor.render(".a { color: red;").unwrap_err();
        assert!(err.to_string().contains("Unclosed block"));
        let err = LessPreprocessor.render("}").unwrap_err();
        assert!(err.to_string().contains("Unexpected }"));
    }
}
