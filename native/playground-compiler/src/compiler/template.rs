//! Template parsing
//!
//! A small HTML-like parser for component templates. Attribute names keep
//! their case and shorthand prefixes (`:`, `@`, `#`), which an HTML5 tree
//! builder would normalise away.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref VOID_TAGS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ]
    .into_iter()
    .collect();

    static ref FOR_ALIAS_RE: Regex =
        Regex::new(r"(?s)^\s*(?:\(([^)]*)\)|(\{[^}]*\}|\[[^\]]*\]|[^\s]+?))\s+(?:in|of)\s+(.+?)\s*$")
            .unwrap();

    static ref WHITESPACE_RE: Regex = Regex::new(r"[\t\r\n\f ]+").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// AST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateNode {
    Element(ElementNode),
    Text(String),
    Interpolation { content: String, offset: usize },
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementNode {
    pub tag: String,
    pub props: Vec<Prop>,
    pub children: Vec<TemplateNode>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prop {
    Attribute { name: String, value: Option<String> },
    Directive(Directive),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// `bind`, `on`, `if`, `for`, `model`, ...
    pub name: String,
    pub arg: Option<String>,
    pub modifiers: Vec<String>,
    pub exp: Option<String>,
    pub offset: usize,
}

impl ElementNode {
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.props.iter().find_map(|p| match p {
            Prop::Directive(d) if d.name == name => Some(d),
            _ => None,
        })
    }

    pub fn has_directive(&self, name: &str) -> bool {
        self.directive(name).is_some()
    }

    pub fn is_void(&self) -> bool {
        VOID_TAGS.contains(self.tag.as_str())
    }

    /// Wrapper `<template>` used only to carry structural directives.
    pub fn is_template_wrapper(&self) -> bool {
        self.tag == "template"
            && (self.has_directive("if")
                || self.has_directive("else-if")
                || self.has_directive("else")
                || self.has_directive("for"))
    }

    pub fn is_component(&self, custom_elements: &[String]) -> bool {
        if custom_elements.iter().any(|c| c == &self.tag) {
            return false;
        }
        let first_upper = self.tag.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false);
        first_upper || self.tag.contains('-') || self.tag == "component"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParseError {
    pub message: String,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateAst {
    pub children: Vec<TemplateNode>,
    pub errors: Vec<TemplateParseError>,
}

/// `item in list` / `(item, key, index) of list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForParse {
    pub source: String,
    pub value: Option<String>,
    pub key: Option<String>,
    pub index: Option<String>,
}

impl ForParse {
    pub fn aliases(&self) -> Vec<String> {
        [&self.value, &self.key, &self.index]
            .into_iter()
            .flatten()
            .flat_map(|alias| alias_names(alias))
            .collect()
    }

    pub fn params(&self) -> String {
        let mut params: Vec<&str> = Vec::new();
        let parts = [&self.value, &self.key, &self.index];
        let last = parts.iter().rposition(|p| p.is_some());
        if let Some(last) = last {
            for (idx, part) in parts.iter().enumerate().take(last + 1) {
                params.push(part.as_deref().unwrap_or(match idx {
                    0 => "_",
                    1 => "__",
                    _ => "___",
                }));
            }
        }
        params.join(", ")
    }
}

/// Identifiers introduced by a (possibly destructuring) alias.
fn alias_names(alias: &str) -> Vec<String> {
    alias
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .filter(|s| !s.is_empty() && !s.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(true))
        .map(|s| s.to_string())
        .collect()
}

pub fn parse_for_expression(exp: &str) -> Option<ForParse> {
    let caps = FOR_ALIAS_RE.captures(exp)?;
    let source = caps.get(3)?.as_str().trim().to_string();
    let (value, key, index) = if let Some(group) = caps.get(1) {
        let mut parts = split_top_level(group.as_str()).into_iter().map(|s| s.trim().to_string());
        (parts.next(), parts.next(), parts.next())
    } else {
        (caps.get(2).map(|m| m.as_str().to_string()), None, None)
    };
    let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());
    Some(ForParse {
        source,
        value: non_empty(value),
        key: non_empty(key),
        index: non_empty(index),
    })
}

/// Split on commas outside of `{}`/`[]`.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, c) in input.char_indices() {
        match c {
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

pub fn parse_template(source: &str) -> TemplateAst {
    let mut parser = TemplateParser {
        src: source,
        pos: 0,
        open: Vec::new(),
        errors: Vec::new(),
    };
    let children = parser.parse_children(None);
    TemplateAst {
        children: condense_whitespace(children),
        errors: parser.errors,
    }
}

struct TemplateParser<'s> {
    src: &'s str,
    pos: usize,
    /// Tags of the currently open elements.
    open: Vec<String>,
    errors: Vec<TemplateParseError>,
}

impl<'s> TemplateParser<'s> {
    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn error(&mut self, message: impl Into<String>, offset: usize) {
        self.errors.push(TemplateParseError {
            message: message.into(),
            offset,
        });
    }

    fn parse_children(&mut self, parent: Option<&str>) -> Vec<TemplateNode> {
        let mut nodes = Vec::new();
        while self.pos < self.src.len() {
            let rest = self.rest();
            if rest.starts_with("</") {
                let start = self.pos;
                let name = read_name(&rest[2..]).to_string();
                let close = rest.find('>').map(|i| self.pos + i + 1).unwrap_or(self.src.len());
                if Some(name.as_str()) == parent {
                    self.pos = close;
                    return nodes;
                }
                if let Some(tag) = parent.filter(|_| self.open.contains(&name)) {
                    // closes an ancestor; leave it for the ancestor to consume
                    self.error(format!("Element <{}> is missing end tag.", tag), start);
                    return nodes;
                }
                self.error(format!("Invalid end tag </{}>.", name), start);
                self.pos = close;
            } else if rest.starts_with("<!--") {
                let start = self.pos;
                match rest[4..].find("-->") {
                    Some(end) => {
                        nodes.push(TemplateNode::Comment(rest[4..4 + end].to_string()));
                        self.pos += 4 + end + 3;
                    }
                    None => {
                        self.error("Unterminated comment.", start);
                        self.pos = self.src.len();
                    }
                }
            } else if rest.starts_with('<')
                && rest[1..].chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
            {
                if let Some(element) = self.parse_element() {
                    nodes.push(TemplateNode::Element(element));
                }
            } else if rest.starts_with("{{") {
                let start = self.pos;
                match rest[2..].find("}}") {
                    Some(end) => {
                        nodes.push(TemplateNode::Interpolation {
                            content: rest[2..2 + end].trim().to_string(),
                            offset: start + 2,
                        });
                        self.pos += 2 + end + 2;
                    }
                    None => {
                        self.error("Interpolation end sign was not found.", start);
                        self.pos = self.src.len();
                    }
                }
            } else {
                let end = next_text_end(rest);
                nodes.push(TemplateNode::Text(decode_entities(&rest[..end])));
                self.pos += end;
            }
        }
        if let Some(tag) = parent {
            self.error(format!("Element <{}> is missing end tag.", tag), self.pos);
        }
        nodes
    }

    fn parse_element(&mut self) -> Option<ElementNode> {
        let start = self.pos;
        let tag = read_name(&self.rest()[1..]).to_string();
        self.pos += 1 + tag.len();

        let mut props = Vec::new();
        let self_closing = loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                self.error(format!("Unclosed start tag <{}>.", tag), start);
                return None;
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                break true;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break false;
            }
            match self.parse_attribute() {
                Some(prop) => props.push(prop),
                None => self.pos += rest.chars().next().map(|c| c.len_utf8()).unwrap_or(1),
            }
        };

        let mut element = ElementNode {
            tag,
            props,
            children: Vec::new(),
            offset: start,
        };
        if !self_closing && !element.is_void() {
            let tag = element.tag.clone();
            self.open.push(tag.clone());
            element.children = self.parse_children(Some(&tag));
            self.open.pop();
        }
        Some(element)
    }

    fn parse_attribute(&mut self) -> Option<Prop> {
        let start = self.pos;
        let rest = self.rest();
        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '/' && !rest.starts_with('/'))
            .unwrap_or(rest.len());
        if name_len == 0 {
            return None;
        }
        let name = rest[..name_len].to_string();
        self.pos += name_len;

        self.skip_whitespace();
        let value = if self.rest().starts_with('=') {
            self.pos += 1;
            self.skip_whitespace();
            Some(self.read_attribute_value())
        } else {
            None
        };
        Some(build_prop(name, value, start))
    }

    fn read_attribute_value(&mut self) -> String {
        let rest = self.rest();
        match rest.chars().next() {
            Some(q @ ('"' | '\'')) => match rest[1..].find(q) {
                Some(end) => {
                    self.pos += end + 2;
                    decode_entities(&rest[1..1 + end])
                }
                None => {
                    self.error("Missing end quote of attribute value.", self.pos);
                    self.pos = self.src.len();
                    rest[1..].to_string()
                }
            },
            _ => {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                self.pos += end;
                decode_entities(&rest[..end])
            }
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }
}

fn build_prop(name: String, value: Option<String>, offset: usize) -> Prop {
    let (dir_name, rest) = if let Some(rest) = name.strip_prefix("v-") {
        let end = rest.find([':', '.']).unwrap_or(rest.len());
        (rest[..end].to_string(), &rest[end..])
    } else if let Some(rest) = name.strip_prefix(':') {
        ("bind".to_string(), &name[name.len() - rest.len() - 1..])
    } else if let Some(rest) = name.strip_prefix('.') {
        ("bind".to_string(), &name[name.len() - rest.len() - 1..])
    } else if let Some(rest) = name.strip_prefix('@') {
        ("on".to_string(), &name[name.len() - rest.len() - 1..])
    } else if let Some(rest) = name.strip_prefix('#') {
        ("slot".to_string(), &name[name.len() - rest.len() - 1..])
    } else {
        return Prop::Attribute { name, value };
    };

    let prop_shorthand = name.starts_with('.');
    let mut arg = None;
    let mut modifiers: Vec<String> = Vec::new();
    let tail = if let Some(after) = rest.strip_prefix([':', '@', '#', '.']) {
        let after_is_arg = !rest.starts_with('.') || prop_shorthand;
        if after_is_arg {
            let (a, mods) = match after.find('.') {
                Some(i) => (&after[..i], &after[i..]),
                None => (after, ""),
            };
            if !a.is_empty() {
                arg = Some(a.to_string());
            }
            mods
        } else {
            rest
        }
    } else {
        rest
    };
    modifiers.extend(tail.split('.').filter(|m| !m.is_empty()).map(|m| m.to_string()));
    if prop_shorthand {
        modifiers.push("prop".to_string());
    }

    Prop::Directive(Directive {
        name: dir_name,
        arg,
        modifiers,
        exp: value.filter(|v| !v.trim().is_empty()),
        offset,
    })
}

fn read_name(rest: &str) -> &str {
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    &rest[..end]
}

fn next_text_end(rest: &str) -> usize {
    let mut idx = 0;
    let bytes = rest.as_bytes();
    while idx < bytes.len() {
        if idx > 0 && (rest[idx..].starts_with("{{") || starts_tag(&rest[idx..])) {
            break;
        }
        idx += 1;
        while idx < bytes.len() && !rest.is_char_boundary(idx) {
            idx += 1;
        }
    }
    idx
}

fn starts_tag(rest: &str) -> bool {
    rest.starts_with("</")
        || rest.starts_with("<!--")
        || (rest.starts_with('<')
            && rest[1..].chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false))
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

/// Whitespace handling of the `condense` mode: drop whitespace-only text at
/// the edges, next to comments, or between elements when it spans lines;
/// collapse every other run to a single space.
fn condense_whitespace(nodes: Vec<TemplateNode>) -> Vec<TemplateNode> {
    let len = nodes.len();
    let is_ws = |n: &TemplateNode| matches!(n, TemplateNode::Text(t) if t.trim().is_empty());
    let mut out: Vec<TemplateNode> = Vec::with_capacity(len);
    for (idx, node) in nodes.iter().enumerate() {
        match node {
            TemplateNode::Text(text) if is_ws(node) => {
                let prev = if idx == 0 { None } else { nodes.get(idx - 1) };
                let next = nodes.get(idx + 1);
                let drop = match (prev, next) {
                    (None, _) | (_, None) => true,
                    (Some(TemplateNode::Comment(_)), _) | (_, Some(TemplateNode::Comment(_))) => true,
                    (Some(TemplateNode::Element(_)), Some(TemplateNode::Element(_))) => {
                        text.contains('\n') || text.contains('\r')
                    }
                    _ => false,
                };
                if !drop {
                    out.push(TemplateNode::Text(" ".to_string()));
                }
            }
            TemplateNode::Text(text) => {
                out.push(TemplateNode::Text(WHITESPACE_RE.replace_all(text, " ").into_owned()));
            }
            TemplateNode::Element(el) => {
                let mut el = el.clone();
                if el.tag != "pre" {
                    el.children = condense_whitespace(el.children);
                }
                out.push(TemplateNode::Element(el));
            }
            other => out.push(other.clone()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element(ast: &TemplateAst) -> &ElementNode {
        ast.children
            .iter()
            .find_map(|n| match n {
                TemplateNode::Element(e) => Some(e),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_parse_nested_elements_and_interpolation() {
        let ast = parse_template("<div class=\"a\">\n  <span>{{ msg }}</span>\n  <br>\n</div>");
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        let div = first_element(&ast);
        assert_eq!(div.tag, "div");
        assert_eq!(div.children.len(), 2);
        match &div.children[0] {
            TemplateNode::Element(span) => {
                assert_eq!(
                    span.children[0],
                    TemplateNode::Interpolation { content: "msg".to_string(), offset: 26 }
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_directive_shorthands() {
        let ast = parse_template(
            "<button :class=\"c\" @click.stop=\"go\" v-model.trim=\"text\" v-if=\"ok\" disabled/>",
        );
        let button = first_element(&ast);
        let bind = button.directive("bind").unwrap();
        assert_eq!(bind.arg.as_deref(), Some("class"));
        let on = button.directive("on").unwrap();
        assert_eq!(on.arg.as_deref(), Some("click"));
        assert_eq!(on.modifiers, vec!["stop".to_string()]);
        let model = button.directive("model").unwrap();
        assert_eq!(model.arg, None);
        assert_eq!(model.modifiers, vec!["trim".to_string()]);
        assert!(button.has_directive("if"));
        assert!(button
            .props
            .iter()
            .any(|p| matches!(p, Prop::Attribute { name, value: None } if name == "disabled")));
    }

    #[test]
    fn test_parse_errors() {
        let ast = parse_template("<div><span></div>");
        assert_eq!(ast.errors.len(), 1);
        assert!(ast.errors[0].message.contains("<span> is missing end tag"));
        let ast = parse_template("<p>{{ open </p>");
        assert!(ast.errors[0].message.contains("Interpolation end sign"));
    }

    #[test]
    fn test_for_expression() {
        let parsed = parse_for_expression("(item, index) in items").unwrap();
        assert_eq!(parsed.source, "items");
        assert_eq!(parsed.value.as_deref(), Some("item"));
        assert_eq!(parsed.key.as_deref(), Some("index"));
        assert_eq!(parsed.params(), "item, index");

        let parsed = parse_for_expression("{ id, name } of users").unwrap();
        assert_eq!(parsed.aliases(), vec!["id".to_string(), "name".to_string()]);
        assert!(parse_for_expression("nonsense").is_none());
    }

    #[test]
    fn test_component_detection() {
        let ast = parse_template("<MyButton/><my-card/><div/>");
        let tags: Vec<bool> = ast
            .children
            .iter()
            .filter_map(|n| match n {
                TemplateNode::Element(e) => Some(e.is_component(&[])),
                _ => None,
            })
            .collect();
        assert_eq!(tags, vec![true, true, false]);
    }
}
