//! SSR render codegen
//!
//! Emits an `ssrRender` function that pushes HTML strings. Static markup is
//! folded into template literals; control flow becomes plain statements.

use super::expression::ExpressionContext;
use super::render::{
    attribute, indent, js_string, slot_param_names, without_directive, Branching, Gen,
    GeneratedRender, PropsMode, RenderOptions,
};
use super::template::{parse_for_expression, ElementNode, Prop, TemplateAst, TemplateNode, TemplateParseError};

pub const SSR_RENDER_PARAMS: &str = "_ctx, _push, _parent, _attrs, $props, $setup, $data, $options";
pub const INLINE_SSR_RENDER_PARAMS: &str = "_ctx, _push, _parent, _attrs";

pub fn generate_ssr_render(
    ast: &TemplateAst,
    options: &RenderOptions,
) -> Result<GeneratedRender, Vec<TemplateParseError>> {
    let mut gen = Gen::new(options);
    let scope = ExpressionContext::new(options.bindings, options.inline);
    let mut buf = Buffer::default();

    let significant = ast
        .children
        .iter()
        .filter(|n| !matches!(n, TemplateNode::Comment(_)))
        .filter(|n| !matches!(n, TemplateNode::Text(t) if t.trim().is_empty()))
        .count();
    let single_root = significant == 1
        && ast.children.iter().any(|n| {
            matches!(n, TemplateNode::Element(e) if !e.has_directive("for") && e.tag != "template" && e.tag != "slot")
        });

    if single_root {
        gen.ssr_children(&ast.children, &mut buf, &scope, true);
    } else {
        buf.text("<!--[-->");
        gen.ssr_children(&ast.children, &mut buf, &scope, false);
        buf.text("<!--]-->");
    }
    gen.finish(buf.finish())
}

/// Accumulates `_push` calls, merging adjacent output into one literal.
#[derive(Default)]
struct Buffer {
    statements: Vec<String>,
    literal: String,
}

impl Buffer {
    fn text(&mut self, s: &str) {
        let escaped = s.replace('\\', "\\\\").replace('`', "\\`").replace("${", "\\${");
        self.literal.push_str(&escaped);
    }

    fn dynamic(&mut self, expr: &str) {
        self.literal.push_str("${");
        self.literal.push_str(expr);
        self.literal.push('}');
    }

    fn statement(&mut self, s: String) {
        self.flush();
        self.statements.push(s);
    }

    fn flush(&mut self) {
        if !self.literal.is_empty() {
            let literal = std::mem::take(&mut self.literal);
            self.statements.push(format!("_push(`{}`)", literal));
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.statements
    }
}

impl<'a> Gen<'a> {
    fn ssr_children(
        &mut self,
        children: &[TemplateNode],
        buf: &mut Buffer,
        scope: &ExpressionContext,
        root: bool,
    ) {
        for item in self.group_branches(children) {
            match item {
                Branching::Chain(chain) => self.ssr_if_chain(&chain, buf, scope, root),
                Branching::Node(node) => self.ssr_node(node, buf, scope, root),
            }
        }
    }

    fn ssr_node(&mut self, node: &TemplateNode, buf: &mut Buffer, scope: &ExpressionContext, root: bool) {
        match node {
            TemplateNode::Text(text) => buf.text(&escape_html(text)),
            TemplateNode::Interpolation { content, offset } => {
                let value = self.expr(content, *offset, scope);
                buf.dynamic(&format!("{}({})", self.ssr_helper("ssrInterpolate"), value));
            }
            TemplateNode::Comment(text) => {
                if !self.is_prod {
                    buf.text(&format!("<!--{}-->", text));
                }
            }
            TemplateNode::Element(el) => self.ssr_element(el, buf, scope, root),
        }
    }

    fn ssr_if_chain(&mut self, chain: &[&ElementNode], buf: &mut Buffer, scope: &ExpressionContext, root: bool) {
        let mut code = String::new();
        let mut closed = false;
        for (idx, el) in chain.iter().enumerate() {
            let cond = self.branch_condition(el, scope);
            let mut inner = Buffer::default();
            self.ssr_element(el, &mut inner, scope, root);
            let body = indent(&inner.finish().join("\n"));
            match cond {
                Some(cond) if idx == 0 => code.push_str(&format!("if ({}) {{\n{}\n", cond, body)),
                Some(cond) => code.push_str(&format!("}} else if ({}) {{\n{}\n", cond, body)),
                None => {
                    code.push_str(&format!("}} else {{\n{}\n", body));
                    closed = true;
                }
            }
        }
        if !closed {
            code.push_str("} else {\n  _push(`<!---->`)\n");
        }
        code.push('}');
        buf.statement(code);
    }

    fn ssr_element(&mut self, el: &ElementNode, buf: &mut Buffer, scope: &ExpressionContext, root: bool) {
        if let Some(dir) = el.directive("for") {
            let Some(parsed) = dir.exp.as_deref().and_then(parse_for_expression) else {
                self.error(
                    format!("v-for has invalid expression: {}", dir.exp.as_deref().unwrap_or("")),
                    dir.offset,
                );
                return;
            };
            let source = self.expr(&parsed.source, dir.offset, scope);
            let inner_scope = scope.with_locals(parsed.aliases());
            let inner_el = without_directive(el, "for");
            let mut inner = Buffer::default();
            self.ssr_element(&inner_el, &mut inner, &inner_scope, false);
            let list = self.ssr_helper("ssrRenderList");
            buf.text("<!--[-->");
            buf.statement(format!(
                "{}({}, ({}) => {{\n{}\n}})",
                list,
                source,
                parsed.params(),
                indent(&inner.finish().join("\n"))
            ));
            buf.text("<!--]-->");
            return;
        }

        if el.tag == "slot" {
            self.ssr_slot_outlet(el, buf, scope);
            return;
        }

        if el.tag == "template" && !el.has_directive("slot") {
            buf.text("<!--[-->");
            self.ssr_children(&el.children, buf, scope, false);
            buf.text("<!--]-->");
            return;
        }

        if el.is_component(&self.custom_elements) {
            self.ssr_component(el, buf, scope, root);
            return;
        }

        buf.text(&format!("<{}", el.tag));
        let dynamic = el.props.iter().any(|p| {
            matches!(p, Prop::Directive(d) if matches!(d.name.as_str(), "bind" | "model" | "show"))
        });
        if root || dynamic {
            let props = self.props(el, scope, PropsMode::Ssr, false);
            let attrs = self.ssr_helper("ssrRenderAttrs");
            let value = if root {
                let merge = self.helper("mergeProps");
                match props {
                    Some(p) => format!("{}({}, _attrs)", merge, p),
                    None => "_attrs".to_string(),
                }
            } else {
                props.unwrap_or_else(|| "{}".to_string())
            };
            buf.dynamic(&format!("{}({})", attrs, value));
        } else {
            for prop in &el.props {
                if let Prop::Attribute { name, value } = prop {
                    if name == "ref" || name == "key" {
                        continue;
                    }
                    match value {
                        Some(v) => buf.text(&format!(" {}=\"{}\"", name, escape_attr(v))),
                        None => buf.text(&format!(" {}", name)),
                    }
                }
            }
        }
        if let Some(id) = &self.scope_id {
            buf.text(&format!(" {}", id));
        }
        buf.text(">");

        if el.is_void() {
            return;
        }

        if let Some(dir) = el.directive("html") {
            if let Some(exp) = &dir.exp {
                let value = self.expr(exp, dir.offset, scope);
                buf.dynamic(&format!("({}) ?? \"\"", value));
            }
        } else if let Some(dir) = el.directive("text") {
            if let Some(exp) = &dir.exp {
                let value = self.expr(exp, dir.offset, scope);
                buf.dynamic(&format!("{}({})", self.ssr_helper("ssrInterpolate"), value));
            }
        } else if let (true, Some(dir)) = (el.tag == "textarea", el.directive("model")) {
            if let Some(exp) = &dir.exp {
                let value = self.expr(exp, dir.offset, scope);
                buf.dynamic(&format!("{}({})", self.ssr_helper("ssrInterpolate"), value));
            }
        } else {
            self.ssr_children(&el.children, buf, scope, false);
        }
        buf.text(&format!("</{}>", el.tag));
    }

    fn ssr_component(&mut self, el: &ElementNode, buf: &mut Buffer, scope: &ExpressionContext, root: bool) {
        let component = self.resolve_component(el, scope);
        let props = self.props(el, scope, PropsMode::Ssr, true);
        let props = if root {
            match props {
                Some(p) => format!("{}({}, _attrs)", self.helper("mergeProps"), p),
                None => "_attrs".to_string(),
            }
        } else {
            props.unwrap_or_else(|| "null".to_string())
        };

        let mut slots = Vec::new();
        for slot in self.slot_definitions(el) {
            let slot_scope = scope.with_locals(slot_param_names(slot.params.as_deref()));
            let owned: Vec<TemplateNode> = slot.children.into_iter().cloned().collect();

            let mut inner = Buffer::default();
            self.ssr_children(&owned, &mut inner, &slot_scope, false);
            let ssr_body = indent(&indent(&inner.finish().join("\n")));
            let client = self.children(&owned, &slot_scope);
            let client_body = indent(&indent(&indent(&client.join(",\n"))));

            let params = slot.params.clone().unwrap_or_else(|| "_".to_string());
            let with_ctx = self.helper("withCtx");
            slots.push(format!(
                "{}: {}(({}, _push, _parent, _scopeId) => {{\n  if (_push) {{\n{}\n  }} else {{\n    return [\n{}\n    ]\n  }}\n}})",
                super::render::prop_key(&slot.name),
                with_ctx,
                params,
                ssr_body,
                client_body
            ));
        }
        let slots = if slots.is_empty() {
            "null".to_string()
        } else {
            slots.push("_: 1".to_string());
            format!("{{\n{}\n}}", indent(&slots.join(",\n")))
        };

        let render = self.ssr_helper("ssrRenderComponent");
        buf.statement(format!("_push({}({}, {}, {}, _parent))", render, component, props, slots));
    }

    fn ssr_slot_outlet(&mut self, el: &ElementNode, buf: &mut Buffer, scope: &ExpressionContext) {
        let name = attribute(el, "name")
            .map(|n| js_string(&n))
            .unwrap_or_else(|| "\"default\"".to_string());
        let mut stripped = el.clone();
        stripped
            .props
            .retain(|p| !matches!(p, Prop::Attribute { name, .. } if name == "name"));
        let props = self
            .props(&stripped, scope, PropsMode::Ssr, false)
            .unwrap_or_else(|| "{}".to_string());
        let fallback = if el.children.is_empty() {
            "null".to_string()
        } else {
            let mut inner = Buffer::default();
            self.ssr_children(&el.children, &mut inner, scope, false);
            format!("() => {{\n{}\n}}", indent(&inner.finish().join("\n")))
        };
        let render_slot = self.ssr_helper("ssrRenderSlot");
        buf.statement(format!(
            "{}(_ctx.$slots, {}, {}, {}, _push, _parent)",
            render_slot, name, props, fallback
        ));
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::template::parse_template;
    use crate::compiler::{BindingMetadata, BindingType};

    fn ssr(src: &str, options: &RenderOptions) -> String {
        let ast = parse_template(src);
        generate_ssr_render(&ast, options)
            .unwrap()
            .into_module("ssrRender", SSR_RENDER_PARAMS)
    }

    #[test]
    fn test_root_receives_attrs() {
        let code = ssr("<div class=\"a\">{{ msg }}</div>", &RenderOptions::default());
        assert!(code.contains("import { mergeProps as _mergeProps } from \"vue\""));
        assert!(code.contains("from \"vue/server-renderer\""));
        assert!(code.contains("_push(`<div${_ssrRenderAttrs(_mergeProps({"));
        assert!(code.contains("}, _attrs))}>${_ssrInterpolate(_ctx.msg)}</div>`)"));
        assert!(code.contains("\nexport function ssrRender(_ctx, _push, _parent, _attrs, $props, $setup, $data, $options) {"));
    }

    #[test]
    fn test_fragment_and_static_children() {
        let code = ssr("<h1>Hi &amp; bye</h1><p>static</p>", &RenderOptions::default());
        assert!(code.contains("_push(`<!--[--><h1>Hi &amp; bye</h1><p>static</p><!--]-->`)"));
    }

    #[test]
    fn test_scope_id_on_elements() {
        let options = RenderOptions {
            scope_id: Some("data-v-1234abcd".to_string()),
            ..Default::default()
        };
        let code = ssr("<div><span>x</span></div>", &options);
        assert!(code.contains("<span data-v-1234abcd>x</span>"));
    }

    #[test]
    fn test_if_and_for_statements() {
        let mut b = BindingMetadata::new();
        b.insert("items".into(), BindingType::SetupConst);
        let options = RenderOptions {
            bindings: Some(&b),
            inline: true,
            ..Default::default()
        };
        let code = ssr("<ul><li v-for=\"i in items\">{{ i }}</li><li v-if=\"!items.length\">none</li></ul>", &options);
        assert!(code.contains("_ssrRenderList(items, (i) => {"));
        assert!(code.contains("if (!items.length) {"));
        assert!(code.contains("_push(`<!---->`)"));
    }
}
