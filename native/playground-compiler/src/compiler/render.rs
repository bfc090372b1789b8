//! Client render codegen
//!
//! Lowers a parsed template into a `render` function built from runtime
//! vnode helpers. The generated code does not use blocks or patch flags;
//! the runtime falls back to a full diff, which is fine for a playground.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use super::expression::{
    is_function_expression, is_member_expression, prefix_expression, prefix_statements,
    ExpressionContext,
};
use super::template::{
    parse_for_expression, Directive, ElementNode, Prop, TemplateAst, TemplateNode,
    TemplateParseError,
};
use super::BindingMetadata;
use crate::imports::{VueImports, SERVER_RENDERER_MODULE};

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap();
    static ref BUILTIN_DIRECTIVES: HashSet<&'static str> = [
        "bind", "on", "if", "else-if", "else", "for", "show", "model", "html", "text", "slot",
        "once", "memo", "pre", "cloak", "is",
    ]
    .into_iter()
    .collect();
    static ref EVENT_MODIFIERS: HashSet<&'static str> = [
        "stop", "prevent", "self", "ctrl", "shift", "alt", "meta", "exact", "middle",
    ]
    .into_iter()
    .collect();
    static ref EVENT_OPTIONS: HashSet<&'static str> = ["once", "capture", "passive"].into_iter().collect();
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions<'a> {
    pub bindings: Option<&'a BindingMetadata>,
    /// Generate a closure for `setup()` instead of a module export.
    pub inline: bool,
    pub custom_elements: Vec<String>,
    pub is_prod: bool,
    /// `data-v-*` attribute rendered on every element by the SSR generator.
    pub scope_id: Option<String>,
}

/// Generated function body, ready to be wrapped as a module or a closure.
#[derive(Debug, Clone)]
pub struct GeneratedRender {
    pub imports: VueImports,
    pub ssr_imports: VueImports,
    /// `const` statements resolving components and directives.
    pub preamble: Vec<String>,
    pub body: Vec<String>,
}

impl GeneratedRender {
    fn imports_block(&self) -> String {
        [self.imports.to_statement(), self.ssr_imports.to_statement()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn function_body(&self) -> String {
        let mut out = String::new();
        for line in self.preamble.iter().chain(self.body.iter()) {
            for l in line.lines() {
                out.push_str("  ");
                out.push_str(l);
                out.push('\n');
            }
        }
        out
    }

    /// `import ...\n\nexport function <name>(<params>) { ... }`
    pub fn into_module(self, name: &str, params: &str) -> String {
        format!(
            "{}\n\nexport function {}({}) {{\n{}}}",
            self.imports_block(),
            name,
            params,
            self.function_body()
        )
    }

    /// Arrow function for inlining into `setup()`, plus the imports it needs.
    pub fn into_inline(self, params: &str) -> (VueImports, VueImports, String) {
        let code = format!("({}) => {{\n{}}}", params, self.function_body());
        (self.imports, self.ssr_imports, code)
    }
}

pub const RENDER_PARAMS: &str = "_ctx, _cache, $props, $setup, $data, $options";
pub const INLINE_RENDER_PARAMS: &str = "_ctx, _cache";

pub fn generate_render(
    ast: &TemplateAst,
    options: &RenderOptions,
) -> Result<GeneratedRender, Vec<TemplateParseError>> {
    let mut gen = Gen::new(options);
    let scope = ExpressionContext::new(options.bindings, options.inline);
    let roots = gen.children(&ast.children, &scope);
    let root = match roots.len() {
        0 => "null".to_string(),
        1 => roots.into_iter().next().unwrap_or_default(),
        _ => {
            let fragment = gen.helper("Fragment");
            let create = gen.helper("createVNode");
            format!("{}({}, null, [\n{}\n])", create, fragment, indent(&roots.join(",\n")))
        }
    };
    gen.finish(vec![format!("return {}", root)])
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED GENERATOR STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// State shared by the client and SSR generators.
pub(crate) struct Gen<'a> {
    pub(crate) bindings: Option<&'a BindingMetadata>,
    pub(crate) inline: bool,
    pub(crate) custom_elements: Vec<String>,
    pub(crate) is_prod: bool,
    pub(crate) scope_id: Option<String>,
    pub(crate) imports: VueImports,
    pub(crate) ssr_imports: VueImports,
    pub(crate) preamble: Vec<String>,
    hoisted: HashSet<String>,
    pub(crate) errors: Vec<TemplateParseError>,
}

/// Whether props are built for a client vnode or for SSR attribute rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropsMode {
    Client,
    Ssr,
}

enum Entry {
    Pair(String, String),
    Class,
    Style,
}

impl<'a> Gen<'a> {
    pub(crate) fn new(options: &RenderOptions<'a>) -> Self {
        Gen {
            bindings: options.bindings,
            inline: options.inline,
            custom_elements: options.custom_elements.clone(),
            is_prod: options.is_prod,
            scope_id: options.scope_id.clone(),
            imports: VueImports::new(),
            ssr_imports: VueImports::for_module(SERVER_RENDERER_MODULE),
            preamble: Vec::new(),
            hoisted: HashSet::new(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn finish(self, body: Vec<String>) -> Result<GeneratedRender, Vec<TemplateParseError>> {
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        Ok(GeneratedRender {
            imports: self.imports,
            ssr_imports: self.ssr_imports,
            preamble: self.preamble,
            body,
        })
    }

    pub(crate) fn helper(&mut self, name: &str) -> String {
        self.imports.helper(name)
    }

    pub(crate) fn ssr_helper(&mut self, name: &str) -> String {
        self.ssr_imports.helper(name)
    }

    pub(crate) fn error(&mut self, message: impl Into<String>, offset: usize) {
        self.errors.push(TemplateParseError {
            message: message.into(),
            offset,
        });
    }

    /// Prefixed expression; on a parse error records it and yields `undefined`.
    pub(crate) fn expr(&mut self, code: &str, offset: usize, scope: &ExpressionContext) -> String {
        match prefix_expression(code, scope) {
            Ok(out) => {
                for h in out.helpers {
                    self.helper(h);
                }
                out.code
            }
            Err(message) => {
                self.error(message, offset);
                "undefined".to_string()
            }
        }
    }

    fn statements(&mut self, code: &str, offset: usize, scope: &ExpressionContext) -> String {
        match prefix_statements(code, scope) {
            Ok(out) => {
                for h in out.helpers {
                    self.helper(h);
                }
                out.code
            }
            Err(message) => {
                self.error(message, offset);
                String::new()
            }
        }
    }

    fn hoist(&mut self, var: &str, statement: String) {
        if self.hoisted.insert(var.to_string()) {
            self.preamble.push(statement);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STRUCTURE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Group `v-if`/`v-else-if`/`v-else` siblings into chains.
    pub(crate) fn group_branches<'n>(&mut self, children: &'n [TemplateNode]) -> Vec<Branching<'n>> {
        let mut out: Vec<Branching<'n>> = Vec::new();
        let mut idx = 0;
        while idx < children.len() {
            let node = &children[idx];
            if let TemplateNode::Element(el) = node {
                if el.has_directive("else-if") || el.has_directive("else") {
                    self.error(
                        "v-else/v-else-if has no adjacent v-if or v-else-if.",
                        el.offset,
                    );
                    idx += 1;
                    continue;
                }
                if el.has_directive("if") {
                    let mut chain = vec![el];
                    let mut next = idx + 1;
                    let mut last = idx;
                    while next < children.len() {
                        match &children[next] {
                            TemplateNode::Comment(_) => next += 1,
                            TemplateNode::Text(t) if t.trim().is_empty() => next += 1,
                            TemplateNode::Element(e)
                                if e.has_directive("else-if") || e.has_directive("else") =>
                            {
                                let is_else = e.has_directive("else");
                                chain.push(e);
                                last = next;
                                next += 1;
                                if is_else {
                                    break;
                                }
                            }
                            _ => break,
                        }
                    }
                    out.push(Branching::Chain(chain));
                    idx = last + 1;
                    continue;
                }
            }
            out.push(Branching::Node(node));
            idx += 1;
        }
        out
    }

    pub(crate) fn branch_condition(&mut self, el: &ElementNode, scope: &ExpressionContext) -> Option<String> {
        let dir = el.directive("if").or_else(|| el.directive("else-if"))?;
        match &dir.exp {
            Some(exp) => Some(self.expr(exp, dir.offset, scope)),
            None => {
                self.error(format!("v-{} is missing expression.", dir.name), dir.offset);
                Some("false".to_string())
            }
        }
    }

    pub(crate) fn resolve_component(&mut self, el: &ElementNode, scope: &ExpressionContext) -> String {
        if el.tag == "component" {
            let is = el.props.iter().find_map(|p| match p {
                Prop::Directive(d) if d.name == "bind" && d.arg.as_deref() == Some("is") => {
                    d.exp.clone().map(|e| (e, d.offset))
                }
                _ => None,
            });
            if let Some((exp, offset)) = is {
                let value = self.expr(&exp, offset, scope);
                return format!("{}({})", self.helper("resolveDynamicComponent"), value);
            }
        }

        let camel = camelize(&el.tag);
        let candidates = [el.tag.clone(), camel.clone(), capitalize(&camel)];
        if let Some(bindings) = self.bindings {
            if let Some(name) = candidates.iter().find(|c| bindings.contains_key(c.as_str())) {
                let name = name.clone();
                return self.expr(&name, el.offset, &ExpressionContext::new(self.bindings, self.inline));
            }
        }

        let var = format!("_component_{}", el.tag.replace(|c: char| !c.is_ascii_alphanumeric(), "_"));
        let resolve = self.helper("resolveComponent");
        self.hoist(&var, format!("const {} = {}({})", var, resolve, js_string(&el.tag)));
        var
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PROPS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Object expression for an element's props, or `None` when it has none.
    pub(crate) fn props(
        &mut self,
        el: &ElementNode,
        scope: &ExpressionContext,
        mode: PropsMode,
        is_component: bool,
    ) -> Option<String> {
        let mut entries: Vec<Entry> = Vec::new();
        let mut class_parts: Vec<(String, bool)> = Vec::new();
        let mut style_parts: Vec<(String, bool)> = Vec::new();
        let mut merges: Vec<String> = Vec::new();

        for prop in &el.props {
            match prop {
                Prop::Attribute { name, value } => {
                    let value = value.clone().unwrap_or_default();
                    match name.as_str() {
                        "class" => {
                            if class_parts.is_empty() {
                                entries.push(Entry::Class);
                            }
                            class_parts.push((js_string(&value), false));
                        }
                        "style" => {
                            if style_parts.is_empty() {
                                entries.push(Entry::Style);
                            }
                            style_parts.push((js_string(&value), false));
                        }
                        "ref" => entries.extend(self.ref_entries(&value)),
                        _ => entries.push(Entry::Pair(prop_key(name), js_string(&value))),
                    }
                }
                Prop::Directive(dir) => match dir.name.as_str() {
                    "bind" => {
                        let Some(exp) = &dir.exp else {
                            self.error("v-bind is missing expression.", dir.offset);
                            continue;
                        };
                        let value = self.expr(exp, dir.offset, scope);
                        match dir.arg.as_deref() {
                            Some("is") if el.tag == "component" => {}
                            Some("class") => {
                                if class_parts.is_empty() {
                                    entries.push(Entry::Class);
                                }
                                class_parts.push((value, true));
                            }
                            Some("style") => {
                                if style_parts.is_empty() {
                                    entries.push(Entry::Style);
                                }
                                style_parts.push((value, true));
                            }
                            Some(arg) => {
                                let key = if dir.modifiers.iter().any(|m| m == "camel") {
                                    camelize(arg)
                                } else {
                                    arg.to_string()
                                };
                                entries.push(Entry::Pair(prop_key(&key), value));
                            }
                            None => merges.push(value),
                        }
                    }
                    "on" if mode == PropsMode::Client => match &dir.arg {
                        Some(arg) => {
                            let key = event_key(arg, &dir.modifiers);
                            let handler = self.handler(dir, scope);
                            entries.push(Entry::Pair(prop_key(&key), handler));
                        }
                        None => {
                            if let Some(exp) = &dir.exp {
                                let value = self.expr(exp, dir.offset, scope);
                                merges.push(format!("{}({})", self.helper("toHandlers"), value));
                            }
                        }
                    },
                    "model" => entries.extend(self.model_entries(el, dir, scope, mode, is_component)),
                    "html" => {
                        if let Some(exp) = &dir.exp {
                            let value = self.expr(exp, dir.offset, scope);
                            entries.push(Entry::Pair("innerHTML".to_string(), value));
                        }
                    }
                    "text" => {
                        if let Some(exp) = &dir.exp {
                            let value = self.expr(exp, dir.offset, scope);
                            let display = self.helper("toDisplayString");
                            entries.push(Entry::Pair(
                                "textContent".to_string(),
                                format!("{}({})", display, value),
                            ));
                        }
                    }
                    _ => {}
                },
            }
        }

        if mode == PropsMode::Ssr {
            if let Some(show) = el.directive("show") {
                if let Some(exp) = &show.exp {
                    let value = self.expr(exp, show.offset, scope);
                    if style_parts.is_empty() {
                        entries.push(Entry::Style);
                    }
                    style_parts.push((format!("({}) ? null : {{ display: \"none\" }}", value), true));
                }
            }
        }

        let mut pairs: Vec<String> = Vec::new();
        for entry in entries {
            match entry {
                Entry::Pair(k, v) => pairs.push(format!("{}: {}", k, v)),
                Entry::Class => pairs.push(format!(
                    "class: {}",
                    self.normalized("normalizeClass", &class_parts)
                )),
                Entry::Style => pairs.push(format!(
                    "style: {}",
                    self.normalized("normalizeStyle", &style_parts)
                )),
            }
        }

        let object = if pairs.is_empty() {
            None
        } else {
            Some(format!("{{\n{}\n}}", indent(&pairs.join(",\n"))))
        };
        if merges.is_empty() {
            return object;
        }
        let merge = self.helper("mergeProps");
        let mut args: Vec<String> = object.into_iter().collect();
        args.extend(merges);
        Some(format!("{}({})", merge, args.join(", ")))
    }

    fn normalized(&mut self, helper: &str, parts: &[(String, bool)]) -> String {
        let dynamic = parts.iter().any(|(_, d)| *d);
        if !dynamic && parts.len() == 1 {
            return parts[0].0.clone();
        }
        let values: Vec<&str> = parts.iter().map(|(v, _)| v.as_str()).collect();
        let arg = if values.len() == 1 {
            values[0].to_string()
        } else {
            format!("[{}]", values.join(", "))
        };
        format!("{}({})", self.helper(helper), arg)
    }

    fn ref_entries(&mut self, name: &str) -> Vec<Entry> {
        let is_setup_ref = self.inline
            && self
                .bindings
                .and_then(|b| b.get(name))
                .map(|b| b.is_setup())
                .unwrap_or(false);
        if is_setup_ref {
            vec![
                Entry::Pair("ref_key".to_string(), js_string(name)),
                Entry::Pair("ref".to_string(), name.to_string()),
            ]
        } else {
            vec![Entry::Pair("ref".to_string(), js_string(name))]
        }
    }

    fn handler(&mut self, dir: &Directive, scope: &ExpressionContext) -> String {
        let base = match &dir.exp {
            None => "() => {}".to_string(),
            Some(exp) if is_member_expression(exp) || is_function_expression(exp) => {
                self.expr(exp, dir.offset, scope)
            }
            Some(exp) => {
                let event_scope = scope.with_locals(["$event".to_string()]);
                let single = prefix_expression(exp, &event_scope).is_ok();
                if single {
                    format!("$event => ({})", self.expr(exp, dir.offset, &event_scope))
                } else {
                    format!("$event => {{ {} }}", self.statements(exp, dir.offset, &event_scope))
                }
            }
        };

        let is_key_event = dir.arg.as_deref().map(|a| a.starts_with("key")).unwrap_or(false);
        let mut modifiers: Vec<&str> = Vec::new();
        let mut keys: Vec<&str> = Vec::new();
        for m in &dir.modifiers {
            let m = m.as_str();
            if EVENT_OPTIONS.contains(m) {
                continue;
            }
            if EVENT_MODIFIERS.contains(m) || (!is_key_event && (m == "left" || m == "right")) {
                modifiers.push(m);
            } else {
                keys.push(m);
            }
        }

        let mut handler = base;
        if !modifiers.is_empty() {
            handler = format!(
                "{}({}, [{}])",
                self.helper("withModifiers"),
                handler,
                quoted_list(&modifiers)
            );
        }
        if !keys.is_empty() {
            handler = format!("{}({}, [{}])", self.helper("withKeys"), handler, quoted_list(&keys));
        }
        handler
    }

    fn model_entries(
        &mut self,
        el: &ElementNode,
        dir: &Directive,
        scope: &ExpressionContext,
        mode: PropsMode,
        is_component: bool,
    ) -> Vec<Entry> {
        let Some(exp) = &dir.exp else {
            self.error("v-model is missing expression.", dir.offset);
            return Vec::new();
        };
        let value = self.expr(exp, dir.offset, scope);
        let event_scope = scope.with_locals(["$event".to_string()]);
        let assign = self.statements(&format!("{} = $event", exp), dir.offset, &event_scope);
        let update = format!("$event => ({})", assign);

        if is_component {
            let prop = dir.arg.clone().unwrap_or_else(|| "modelValue".to_string());
            let mut entries = vec![Entry::Pair(prop_key(&prop), value)];
            if mode == PropsMode::Client {
                entries.push(Entry::Pair(prop_key(&format!("onUpdate:{}", prop)), update));
            }
            if !dir.modifiers.is_empty() {
                let key = if prop == "modelValue" {
                    "modelModifiers".to_string()
                } else {
                    format!("{}Modifiers", prop)
                };
                let mods: Vec<String> = dir.modifiers.iter().map(|m| format!("{}: true", prop_key(m))).collect();
                entries.push(Entry::Pair(prop_key(&key), format!("{{ {} }}", mods.join(", "))));
            }
            return entries;
        }

        match mode {
            PropsMode::Client => vec![Entry::Pair(prop_key("onUpdate:modelValue"), update)],
            PropsMode::Ssr => match model_kind(el) {
                ModelKind::Checkbox | ModelKind::Radio => {
                    let static_value = attribute(el, "value").map(|v| js_string(&v)).unwrap_or_else(|| "null".to_string());
                    let contain = self.ssr_helper("ssrLooseContain");
                    let equal = self.ssr_helper("ssrLooseEqual");
                    let checked = if model_kind(el) == ModelKind::Checkbox {
                        format!(
                            "Array.isArray({v}) ? {c}({v}, {s}) : {v}",
                            v = value,
                            c = contain,
                            s = static_value
                        )
                    } else {
                        format!("{}({}, {})", equal, value, static_value)
                    };
                    vec![Entry::Pair("checked".to_string(), checked)]
                }
                ModelKind::Select | ModelKind::Text | ModelKind::Dynamic => {
                    vec![Entry::Pair("value".to_string(), value)]
                }
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DIRECTIVES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Runtime directive tuples for `_withDirectives` (client only).
    fn runtime_directives(
        &mut self,
        el: &ElementNode,
        scope: &ExpressionContext,
        is_component: bool,
    ) -> Vec<String> {
        let mut out = Vec::new();
        for prop in &el.props {
            let Prop::Directive(dir) = prop else { continue };
            match dir.name.as_str() {
                "show" => {
                    let value = dir
                        .exp
                        .as_ref()
                        .map(|e| self.expr(e, dir.offset, scope))
                        .unwrap_or_else(|| "undefined".to_string());
                    out.push(format!("[{}, {}]", self.helper("vShow"), value));
                }
                "model" if !is_component => {
                    let Some(exp) = &dir.exp else { continue };
                    let value = self.expr(exp, dir.offset, scope);
                    let directive = match model_kind(el) {
                        ModelKind::Checkbox => "vModelCheckbox",
                        ModelKind::Radio => "vModelRadio",
                        ModelKind::Select => "vModelSelect",
                        ModelKind::Dynamic => "vModelDynamic",
                        ModelKind::Text => "vModelText",
                    };
                    let directive = self.helper(directive);
                    if dir.modifiers.is_empty() {
                        out.push(format!("[{}, {}]", directive, value));
                    } else {
                        let mods: Vec<String> = dir.modifiers.iter().map(|m| format!("{}: true", prop_key(m))).collect();
                        out.push(format!("[{}, {}, void 0, {{ {} }}]", directive, value, mods.join(", ")));
                    }
                }
                name if !BUILTIN_DIRECTIVES.contains(name) => {
                    let resolved = self.resolve_directive(name);
                    let mut parts = vec![resolved];
                    let value = dir.exp.as_ref().map(|e| self.expr(e, dir.offset, scope));
                    if value.is_some() || dir.arg.is_some() || !dir.modifiers.is_empty() {
                        parts.push(value.unwrap_or_else(|| "void 0".to_string()));
                    }
                    if dir.arg.is_some() || !dir.modifiers.is_empty() {
                        parts.push(dir.arg.as_deref().map(js_string).unwrap_or_else(|| "void 0".to_string()));
                    }
                    if !dir.modifiers.is_empty() {
                        let mods: Vec<String> = dir.modifiers.iter().map(|m| format!("{}: true", prop_key(m))).collect();
                        parts.push(format!("{{ {} }}", mods.join(", ")));
                    }
                    out.push(format!("[{}]", parts.join(", ")));
                }
                _ => {}
            }
        }
        out
    }

    fn resolve_directive(&mut self, name: &str) -> String {
        let binding_name = format!("v{}", capitalize(&camelize(name)));
        if self.bindings.map(|b| b.contains_key(&binding_name)).unwrap_or(false) {
            let scope = ExpressionContext::new(self.bindings, self.inline);
            return self.expr(&binding_name, 0, &scope);
        }
        let var = format!("_directive_{}", name.replace('-', "_"));
        let resolve = self.helper("resolveDirective");
        self.hoist(&var, format!("const {} = {}({})", var, resolve, js_string(name)));
        var
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CLIENT NODES
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn children(&mut self, children: &[TemplateNode], scope: &ExpressionContext) -> Vec<String> {
        let mut out = Vec::new();
        for item in self.group_branches(children) {
            match item {
                Branching::Chain(chain) => out.push(self.if_chain(&chain, scope)),
                Branching::Node(node) => {
                    if let Some(code) = self.node(node, scope) {
                        out.push(code);
                    }
                }
            }
        }
        out
    }

    fn if_chain(&mut self, chain: &[&ElementNode], scope: &ExpressionContext) -> String {
        let mut code = String::new();
        let mut closed = false;
        for el in chain {
            let body = self.element(el, scope);
            match self.branch_condition(el, scope) {
                Some(cond) => code.push_str(&format!("({})\n  ? {}\n  : ", cond, body)),
                None => {
                    code.push_str(&body);
                    closed = true;
                }
            }
        }
        if !closed {
            code.push_str(&format!("{}(\"v-if\", true)", self.helper("createCommentVNode")));
        }
        code
    }

    fn node(&mut self, node: &TemplateNode, scope: &ExpressionContext) -> Option<String> {
        match node {
            TemplateNode::Text(text) => Some(format!(
                "{}({})",
                self.helper("createTextVNode"),
                js_string(text)
            )),
            TemplateNode::Interpolation { content, offset } => {
                let value = self.expr(content, *offset, scope);
                let display = self.helper("toDisplayString");
                Some(format!("{}({}({}))", self.helper("createTextVNode"), display, value))
            }
            TemplateNode::Comment(text) => {
                if self.is_prod {
                    None
                } else {
                    Some(format!("{}({})", self.helper("createCommentVNode"), js_string(text)))
                }
            }
            TemplateNode::Element(el) => Some(self.element(el, scope)),
        }
    }

    fn element(&mut self, el: &ElementNode, scope: &ExpressionContext) -> String {
        if let Some(dir) = el.directive("for") {
            return self.for_loop(el, dir, scope);
        }
        if el.tag == "slot" {
            return self.slot_outlet(el, scope);
        }
        if el.tag == "template" && !el.has_directive("slot") {
            let children = self.children(&el.children, scope);
            let fragment = self.helper("Fragment");
            return format!(
                "{}({}, null, [\n{}\n])",
                self.helper("createVNode"),
                fragment,
                indent(&children.join(",\n"))
            );
        }

        let is_component = el.is_component(&self.custom_elements);
        let props = self.props(el, scope, PropsMode::Client, is_component);
        let vnode = if is_component {
            let component = self.resolve_component(el, scope);
            let slots = self.component_slots(el, scope);
            let create = self.helper("createVNode");
            match (props, slots) {
                (p, Some(s)) => format!("{}({}, {}, {})", create, component, p.unwrap_or_else(|| "null".into()), s),
                (Some(p), None) => format!("{}({}, {})", create, component, p),
                (None, None) => format!("{}({})", create, component),
            }
        } else {
            let create = self.helper("createElementVNode");
            let children = self.element_children(el, scope);
            match (props, children) {
                (p, Some(c)) => format!(
                    "{}({}, {}, {})",
                    create,
                    js_string(&el.tag),
                    p.unwrap_or_else(|| "null".into()),
                    c
                ),
                (Some(p), None) => format!("{}({}, {})", create, js_string(&el.tag), p),
                (None, None) => format!("{}({})", create, js_string(&el.tag)),
            }
        };

        let directives = self.runtime_directives(el, scope, is_component);
        if directives.is_empty() {
            vnode
        } else {
            format!(
                "{}({}, [\n{}\n])",
                self.helper("withDirectives"),
                vnode,
                indent(&directives.join(",\n"))
            )
        }
    }

    /// Text-only children collapse into one string expression.
    fn element_children(&mut self, el: &ElementNode, scope: &ExpressionContext) -> Option<String> {
        if el.children.is_empty() || el.has_directive("html") || el.has_directive("text") {
            return None;
        }
        let text_only = el
            .children
            .iter()
            .all(|c| matches!(c, TemplateNode::Text(_) | TemplateNode::Interpolation { .. }));
        if text_only {
            let mut parts = Vec::new();
            for child in &el.children {
                match child {
                    TemplateNode::Text(t) => parts.push(js_string(t)),
                    TemplateNode::Interpolation { content, offset } => {
                        let value = self.expr(content, *offset, scope);
                        parts.push(format!("{}({})", self.helper("toDisplayString"), value));
                    }
                    _ => {}
                }
            }
            return Some(parts.join(" + "));
        }
        let children = self.children(&el.children, scope);
        Some(format!("[\n{}\n]", indent(&children.join(",\n"))))
    }

    fn for_loop(&mut self, el: &ElementNode, dir: &Directive, scope: &ExpressionContext) -> String {
        let Some(parsed) = dir.exp.as_deref().and_then(parse_for_expression) else {
            self.error(
                format!("v-for has invalid expression: {}", dir.exp.as_deref().unwrap_or("")),
                dir.offset,
            );
            return "null".to_string();
        };
        let source = self.expr(&parsed.source, dir.offset, scope);
        let inner_scope = scope.with_locals(parsed.aliases());
        let inner = without_directive(el, "for");
        let body = self.element(&inner, &inner_scope);
        let fragment = self.helper("Fragment");
        let list = self.helper("renderList");
        format!(
            "{}({}, null, {}({}, ({}) => {{\n  return {}\n}}))",
            self.helper("createVNode"),
            fragment,
            list,
            source,
            parsed.params(),
            body
        )
    }

    fn slot_outlet(&mut self, el: &ElementNode, scope: &ExpressionContext) -> String {
        let name = attribute(el, "name").map(|n| js_string(&n)).unwrap_or_else(|| "\"default\"".to_string());
        let mut stripped = el.clone();
        stripped
            .props
            .retain(|p| !matches!(p, Prop::Attribute { name, .. } if name == "name"));
        let props = self
            .props(&stripped, scope, PropsMode::Client, false)
            .unwrap_or_else(|| "{}".to_string());
        let render_slot = self.helper("renderSlot");
        if el.children.is_empty() {
            format!("{}(_ctx.$slots, {}, {})", render_slot, name, props)
        } else {
            let fallback = self.children(&el.children, scope);
            format!(
                "{}(_ctx.$slots, {}, {}, () => [\n{}\n])",
                render_slot,
                name,
                props,
                indent(&fallback.join(",\n"))
            )
        }
    }

    pub(crate) fn slot_definitions<'n>(&mut self, el: &'n ElementNode) -> Vec<SlotDefinition<'n>> {
        let mut slots: Vec<SlotDefinition<'n>> = Vec::new();
        if let Some(dir) = el.directive("slot") {
            slots.push(SlotDefinition {
                name: dir.arg.clone().unwrap_or_else(|| "default".to_string()),
                params: dir.exp.clone(),
                children: el.children.iter().collect(),
            });
            return slots;
        }
        let mut default_children: Vec<&'n TemplateNode> = Vec::new();
        for child in &el.children {
            match child {
                TemplateNode::Element(t) if t.tag == "template" && t.has_directive("slot") => {
                    let dir = t.directive("slot");
                    slots.push(SlotDefinition {
                        name: dir
                            .and_then(|d| d.arg.clone())
                            .unwrap_or_else(|| "default".to_string()),
                        params: dir.and_then(|d| d.exp.clone()),
                        children: t.children.iter().collect(),
                    });
                }
                TemplateNode::Text(t) if t.trim().is_empty() => {}
                TemplateNode::Comment(_) => {}
                other => default_children.push(other),
            }
        }
        if !default_children.is_empty() && !slots.iter().any(|s| s.name == "default") {
            slots.insert(
                0,
                SlotDefinition {
                    name: "default".to_string(),
                    params: None,
                    children: default_children,
                },
            );
        }
        slots
    }

    fn component_slots(&mut self, el: &ElementNode, scope: &ExpressionContext) -> Option<String> {
        let slots = self.slot_definitions(el);
        if slots.is_empty() {
            return None;
        }
        let mut entries = Vec::new();
        for slot in slots {
            let slot_scope = scope.with_locals(slot_param_names(slot.params.as_deref()));
            let owned: Vec<TemplateNode> = slot.children.into_iter().cloned().collect();
            let children = self.children(&owned, &slot_scope);
            let with_ctx = self.helper("withCtx");
            entries.push(format!(
                "{}: {}(({}) => [\n{}\n])",
                prop_key(&slot.name),
                with_ctx,
                slot.params.as_deref().unwrap_or(""),
                indent(&children.join(",\n"))
            ));
        }
        entries.push("_: 1".to_string());
        Some(format!("{{\n{}\n}}", indent(&entries.join(",\n"))))
    }
}

pub(crate) enum Branching<'n> {
    Chain(Vec<&'n ElementNode>),
    Node(&'n TemplateNode),
}

pub(crate) struct SlotDefinition<'n> {
    pub(crate) name: String,
    pub(crate) params: Option<String>,
    pub(crate) children: Vec<&'n TemplateNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelKind {
    Text,
    Checkbox,
    Radio,
    Select,
    Dynamic,
}

fn model_kind(el: &ElementNode) -> ModelKind {
    if el.tag == "select" {
        return ModelKind::Select;
    }
    if el.tag != "input" {
        return ModelKind::Text;
    }
    let dynamic_type = el.props.iter().any(|p| {
        matches!(p, Prop::Directive(d) if d.name == "bind" && d.arg.as_deref() == Some("type"))
    });
    if dynamic_type {
        return ModelKind::Dynamic;
    }
    match attribute(el, "type").as_deref() {
        Some("checkbox") => ModelKind::Checkbox,
        Some("radio") => ModelKind::Radio,
        _ => ModelKind::Text,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// UTILITIES
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) fn attribute(el: &ElementNode, name: &str) -> Option<String> {
    el.props.iter().find_map(|p| match p {
        Prop::Attribute { name: n, value } if n == name => Some(value.clone().unwrap_or_default()),
        _ => None,
    })
}

pub(crate) fn without_directive(el: &ElementNode, name: &str) -> ElementNode {
    let mut out = el.clone();
    out.props
        .retain(|p| !matches!(p, Prop::Directive(d) if d.name == name));
    out
}

pub(crate) fn slot_param_names(params: Option<&str>) -> Vec<String> {
    params
        .map(|p| {
            p.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                .filter(|s| !s.is_empty() && !s.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(true))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

pub(crate) fn prop_key(name: &str) -> String {
    if IDENTIFIER_RE.is_match(name) {
        name.to_string()
    } else {
        js_string(name)
    }
}

pub(crate) fn camelize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper = false;
    for c in s.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `click` -> `onClick`, `update:modelValue` -> `onUpdate:modelValue`.
fn event_key(arg: &str, modifiers: &[String]) -> String {
    let mut key = format!("on{}", capitalize(&camelize(arg)));
    for m in modifiers {
        if EVENT_OPTIONS.contains(m.as_str()) {
            key.push_str(&capitalize(m));
        }
    }
    key
}

fn quoted_list(items: &[&str]) -> String {
    items.iter().map(|i| js_string(i)).collect::<Vec<_>>().join(",")
}

pub(crate) fn indent(code: &str) -> String {
    code.lines()
        .map(|l| if l.is_empty() { String::new() } else { format!("  {}", l) })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::template::parse_template;
    use crate::compiler::BindingType;

    fn render(src: &str, bindings: Option<&BindingMetadata>, inline: bool) -> GeneratedRender {
        let ast = parse_template(src);
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        let options = RenderOptions {
            bindings,
            inline,
            ..Default::default()
        };
        generate_render(&ast, &options).unwrap()
    }

    #[test]
    fn test_module_shape() {
        let code = render("<div class=\"box\">{{ msg }}</div>", None, false)
            .into_module("render", RENDER_PARAMS);
        assert!(code.starts_with("import { createElementVNode as _createElementVNode, toDisplayString as _toDisplayString } from \"vue\""));
        assert!(code.contains("\n\nexport function render(_ctx, _cache, $props, $setup, $data, $options) {"));
        assert!(code.contains("_createElementVNode(\"div\", {\n    class: \"box\"\n  }, _toDisplayString(_ctx.msg))"));
    }

    #[test]
    fn test_setup_bindings_function_mode() {
        let mut b = BindingMetadata::new();
        b.insert("count".into(), BindingType::SetupRef);
        let code = render("<button @click=\"count++\">{{ count }}</button>", Some(&b), false)
            .into_module("render", RENDER_PARAMS);
        assert!(code.contains("onClick: $event => ($setup.count++)"));
        assert!(code.contains("_toDisplayString($setup.count)"));
    }

    #[test]
    fn test_inline_closure() {
        let mut b = BindingMetadata::new();
        b.insert("count".into(), BindingType::SetupRef);
        let (imports, _, code) = render("<p>{{ count }}</p>", Some(&b), true).into_inline(INLINE_RENDER_PARAMS);
        assert!(code.starts_with("(_ctx, _cache) => {"));
        assert!(code.contains("count.value"));
        assert!(imports.contains_local("_toDisplayString"));
    }

    #[test]
    fn test_if_chain_and_for() {
        let code = render(
            "<ul><li v-for=\"(item, i) in items\" :key=\"item.id\">{{ i }}: {{ item.name }}</li></ul>\n<p v-if=\"ok\">yes</p>\n<p v-else>no</p>",
            None,
            false,
        )
        .into_module("render", RENDER_PARAMS);
        assert!(code.contains("_renderList(_ctx.items, (item, i) => {"));
        assert!(code.contains("key: item.id"));
        assert!(code.contains("(_ctx.ok)\n"));
        assert!(code.contains("_toDisplayString(item.name)"));
        assert!(!code.contains("_ctx.item."));
        assert!(!code.contains("_ctx.i)"));
    }

    #[test]
    fn test_unresolved_component_is_hoisted() {
        let code = render("<my-card title=\"x\"><span>hi</span></my-card>", None, false)
            .into_module("render", RENDER_PARAMS);
        assert!(code.contains("const _component_my_card = _resolveComponent(\"my-card\")"));
        assert!(code.contains("default: _withCtx(() => ["));
    }

    #[test]
    fn test_v_model_text() {
        let mut b = BindingMetadata::new();
        b.insert("text".into(), BindingType::SetupRef);
        let (_, _, code) = render("<input v-model=\"text\">", Some(&b), true).into_inline(INLINE_RENDER_PARAMS);
        assert!(code.contains("\"onUpdate:modelValue\": $event => (text.value = $event)"));
        assert!(code.contains("[_vModelText, text.value]"));
    }

    #[test]
    fn test_else_without_if_is_error() {
        let ast = parse_template("<p v-else>no</p>");
        let errors = generate_render(&ast, &RenderOptions::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
    }
}
