//! Script compilation
//!
//! Binding analysis and `<script setup>` lowering. The setup block becomes
//! the body of a `setup()` function; its imports are hoisted, compiler
//! macros (`defineProps`, `defineEmits`, `defineExpose`, `withDefaults`)
//! are replaced, and the template render function is inlined as the return
//! value when requested.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, ArrayExpressionElement, BindingPattern, CallExpression, ExportDefaultDeclarationKind,
    Expression, ImportDeclarationSpecifier, ObjectPropertyKind, Program, Statement, TSSignature,
    TSType, VariableDeclarationKind,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use regex::Regex;
use std::collections::HashMap;

use super::expression::{prefix_expression, ExpressionContext};
use super::render::{generate_render, indent, js_string, RenderOptions, INLINE_RENDER_PARAMS};
use super::ssr::{generate_ssr_render, INLINE_SSR_RENDER_PARAMS};
use super::style::css_var_name;
use super::template::parse_template;
use super::{
    BindingMetadata, BindingType, CompiledScript, ScriptCompileError, ScriptCompileOptions,
    SfcBlock, SfcDescriptor,
};
use crate::imports::{VueImports, SERVER_RENDERER_MODULE};

lazy_static! {
    static ref EMIT_SIGNATURE_RE: Regex =
        Regex::new(r#"\(\s*[\w$]+\s*:\s*['"]([^'"]+)['"]"#).unwrap();
}

const DEFAULT_VAR: &str = "__default__";

pub fn compile_script(
    descriptor: &SfcDescriptor,
    options: &ScriptCompileOptions,
) -> Result<CompiledScript, ScriptCompileError> {
    match (&descriptor.script, &descriptor.script_setup) {
        (_, Some(setup)) => compile_setup(descriptor, setup, options),
        (Some(script), None) => compile_normal(descriptor, script, options),
        (None, None) => Err(ScriptCompileError::new(format!(
            "{} contains no <script> tags.",
            descriptor.filename
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse as TS (or JS+JSX), falling back to the other JSX mode on failure.
fn parse_program<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    is_ts: bool,
) -> Result<Program<'a>, ScriptCompileError> {
    let base = SourceType::default().with_module(true).with_typescript(is_ts);
    let first = Parser::new(allocator, source, base.with_jsx(!is_ts)).parse();
    if first.errors.is_empty() {
        return Ok(first.program);
    }
    let retry = Parser::new(allocator, source, base.with_jsx(is_ts)).parse();
    if retry.errors.is_empty() {
        return Ok(retry.program);
    }
    let error = &first.errors[0];
    let offset = error
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map(|label| label.offset())
        .unwrap_or(0);
    Err(ScriptCompileError::new(error.to_string()).with_frame(source, offset))
}

fn text(source: &str, span: Span) -> &str {
    &source[span.start as usize..span.end as usize]
}

fn callee_name<'s>(call: &'s CallExpression) -> Option<&'s str> {
    match &call.callee {
        Expression::Identifier(id) => Some(id.name.as_str()),
        _ => None,
    }
}

fn unwrap_ts<'e, 'a>(expr: &'e Expression<'a>) -> &'e Expression<'a> {
    match expr {
        Expression::TSAsExpression(e) => unwrap_ts(&e.expression),
        Expression::TSSatisfiesExpression(e) => unwrap_ts(&e.expression),
        Expression::TSNonNullExpression(e) => unwrap_ts(&e.expression),
        Expression::ParenthesizedExpression(e) => unwrap_ts(&e.expression),
        _ => expr,
    }
}

fn collect_pattern_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_pattern_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_pattern_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for elem in arr.elements.iter().flatten() {
                collect_pattern_names(elem, names);
            }
            if let Some(rest) = &arr.rest {
                collect_pattern_names(&rest.argument, names);
            }
        }
        BindingPattern::AssignmentPattern(assign) => collect_pattern_names(&assign.left, names),
    }
}

fn classify_const(init: &Expression) -> BindingType {
    match unwrap_ts(init) {
        Expression::CallExpression(call) => match callee_name(call) {
            Some("ref" | "shallowRef" | "customRef" | "toRef" | "computed") => BindingType::SetupRef,
            Some("reactive" | "shallowReactive" | "readonly" | "shallowReadonly") => {
                BindingType::SetupReactiveConst
            }
            Some("defineProps" | "withDefaults") => BindingType::SetupReactiveConst,
            Some("defineEmits") => BindingType::SetupConst,
            _ => BindingType::SetupMaybeRef,
        },
        Expression::StringLiteral(_)
        | Expression::NumericLiteral(_)
        | Expression::BooleanLiteral(_)
        | Expression::NullLiteral(_)
        | Expression::BigIntLiteral(_)
        | Expression::RegExpLiteral(_)
        | Expression::ArrowFunctionExpression(_)
        | Expression::FunctionExpression(_)
        | Expression::ClassExpression(_) => BindingType::SetupConst,
        Expression::TemplateLiteral(t) if t.expressions.is_empty() => BindingType::SetupConst,
        _ => BindingType::SetupMaybeRef,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS API ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

/// Bindings exposed by an options-API `export default { ... }`.
pub fn analyze_options_api(program: &Program) -> BindingMetadata {
    let mut bindings = BindingMetadata::new();
    for stmt in &program.body {
        let Statement::ExportDefaultDeclaration(decl) = stmt else {
            continue;
        };
        let object = match &decl.declaration {
            ExportDefaultDeclarationKind::ObjectExpression(obj) => Some(&**obj),
            ExportDefaultDeclarationKind::CallExpression(call) => {
                call.arguments.first().and_then(|a| match a {
                    Argument::ObjectExpression(obj) => Some(&**obj),
                    _ => None,
                })
            }
            _ => None,
        };
        let Some(object) = object else { continue };

        for prop in &object.properties {
            let ObjectPropertyKind::ObjectProperty(prop) = prop else {
                continue;
            };
            let Some(key) = prop.key.static_name() else {
                continue;
            };
            match key.as_ref() {
                "props" => insert_keys(&prop.value, BindingType::Props, &mut bindings),
                "inject" | "computed" | "methods" => {
                    insert_keys(&prop.value, BindingType::Options, &mut bindings)
                }
                "data" => {
                    if let Some(obj) = returned_object(&prop.value) {
                        insert_keys(obj, BindingType::Data, &mut bindings);
                    }
                }
                "setup" => {
                    if let Some(obj) = returned_object(&prop.value) {
                        insert_keys(obj, BindingType::SetupMaybeRef, &mut bindings);
                    }
                }
                _ => {}
            }
        }
    }
    bindings
}

fn insert_keys(value: &Expression, kind: BindingType, bindings: &mut BindingMetadata) {
    match unwrap_ts(value) {
        Expression::ArrayExpression(arr) => {
            for elem in &arr.elements {
                if let ArrayExpressionElement::StringLiteral(s) = elem {
                    bindings.insert(s.value.to_string(), kind);
                }
            }
        }
        Expression::ObjectExpression(obj) => {
            for prop in &obj.properties {
                if let ObjectPropertyKind::ObjectProperty(p) = prop {
                    if let Some(key) = p.key.static_name() {
                        bindings.insert(key.to_string(), kind);
                    }
                }
            }
        }
        _ => {}
    }
}

/// The object literal returned by `data() { return {...} }` or `() => ({...})`.
fn returned_object<'e, 'a>(value: &'e Expression<'a>) -> Option<&'e Expression<'a>> {
    let statements = match value {
        Expression::FunctionExpression(func) => &func.body.as_ref()?.statements,
        Expression::ArrowFunctionExpression(arrow) => {
            if arrow.expression {
                if let Some(Statement::ExpressionStatement(es)) = arrow.body.statements.first() {
                    let inner = unwrap_ts(&es.expression);
                    return matches!(inner, Expression::ObjectExpression(_)).then_some(inner);
                }
                return None;
            }
            &arrow.body.statements
        }
        _ => return None,
    };
    statements.iter().find_map(|s| match s {
        Statement::ReturnStatement(ret) => ret
            .argument
            .as_ref()
            .map(unwrap_ts)
            .filter(|e| matches!(e, Expression::ObjectExpression(_))),
        _ => None,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// NORMAL SCRIPT
// ═══════════════════════════════════════════════════════════════════════════════

fn compile_normal(
    descriptor: &SfcDescriptor,
    script: &SfcBlock,
    options: &ScriptCompileOptions,
) -> Result<CompiledScript, ScriptCompileError> {
    let allocator = Allocator::default();
    let program = parse_program(&allocator, &script.content, options.is_ts)?;
    let bindings = analyze_options_api(&program);

    if descriptor.css_vars.is_empty() || options.ssr {
        return Ok(CompiledScript {
            content: script.content.clone(),
            bindings: Some(bindings),
            notices: Vec::new(),
        });
    }

    let mut imports = VueImports::new();
    let css_vars = css_vars_call(descriptor, options, &ExpressionContext::new(None, false), &mut imports);
    let content = format!(
        "{}\n{}\nconst __injectCSSVars__ = () => {{\n{}\n}}\nconst __setup__ = {d}.setup\n{d}.setup = __setup__\n  ? (props, ctx) => {{ __injectCSSVars__();return __setup__(props, ctx) }}\n  : __injectCSSVars__\n\nexport default {d}",
        rewrite_default(&script.content, DEFAULT_VAR, options.is_ts)?,
        imports.to_statement(),
        css_vars,
        d = DEFAULT_VAR,
    );
    Ok(CompiledScript {
        content,
        bindings: Some(bindings),
        notices: Vec::new(),
    })
}

fn css_vars_call(
    descriptor: &SfcDescriptor,
    options: &ScriptCompileOptions,
    scope: &ExpressionContext,
    imports: &mut VueImports,
) -> String {
    let short_id = options.id.trim_start_matches("data-v-");
    let entries: Vec<String> = descriptor
        .css_vars
        .iter()
        .map(|var| {
            let value = match prefix_expression(var, scope) {
                Ok(out) => {
                    for h in out.helpers {
                        imports.helper(h);
                    }
                    out.code
                }
                Err(_) => format!("_ctx.{}", var),
            };
            format!("{}: ({})", js_string(&css_var_name(short_id, var)), value)
        })
        .collect();
    format!(
        "{}(_ctx => ({{\n{}\n}}))",
        imports.helper("useCssVars"),
        indent(&entries.join(",\n"))
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPT SETUP
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct SetupAnalysis {
    bindings: BindingMetadata,
    props: Option<PropsDecl>,
    emits: Option<String>,
    has_expose: bool,
    user_imports: Vec<String>,
    replacements: Vec<(u32, u32, String)>,
}

struct PropsDecl {
    keys: Vec<String>,
    runtime: String,
    defaults: Option<String>,
}

fn compile_setup(
    descriptor: &SfcDescriptor,
    setup: &SfcBlock,
    options: &ScriptCompileOptions,
) -> Result<CompiledScript, ScriptCompileError> {
    let mut bindings = BindingMetadata::new();
    let mut user_imports: Vec<String> = Vec::new();
    let mut normal_code = String::new();

    if let Some(script) = &descriptor.script {
        let allocator = Allocator::default();
        let program = parse_program(&allocator, &script.content, options.is_ts)?;
        let mut normal = SetupAnalysis::default();
        analyze_statements(&program, &script.content, false, &mut normal)?;
        bindings.extend(analyze_options_api(&program));
        bindings.extend(normal.bindings);
        normal_code = rewrite_default(&script.content, DEFAULT_VAR, options.is_ts)?;
    }

    let allocator = Allocator::default();
    let program = parse_program(&allocator, &setup.content, options.is_ts)?;
    let mut analysis = SetupAnalysis::default();
    analyze_statements(&program, &setup.content, true, &mut analysis)?;
    user_imports.append(&mut analysis.user_imports);

    let mut all_bindings = BindingMetadata::new();
    if let Some(props) = &analysis.props {
        for key in &props.keys {
            all_bindings.insert(key.clone(), BindingType::Props);
        }
    }
    all_bindings.extend(bindings);
    all_bindings.extend(analysis.bindings.clone());

    let mut body = setup.content.clone();
    analysis.replacements.sort_by(|a, b| b.0.cmp(&a.0));
    for (start, end, replacement) in &analysis.replacements {
        body.replace_range(*start as usize..*end as usize, replacement);
    }

    let mut imports = VueImports::new();
    let mut ssr_imports = VueImports::for_module(SERVER_RENDERER_MODULE);
    let inline_scope = ExpressionContext::new(Some(&all_bindings), true);

    let mut setup_lines: Vec<String> = Vec::new();
    if !analysis.has_expose {
        setup_lines.push("__expose();".to_string());
    }
    if !descriptor.css_vars.is_empty() && !options.ssr {
        setup_lines.push(css_vars_call(descriptor, options, &inline_scope, &mut imports));
    }
    let mut setup_body = setup_lines.join("\n");
    setup_body.push_str("\n\n");
    setup_body.push_str(body.trim_matches('\n'));
    setup_body.push_str("\n\n");

    if options.inline_template {
        match &descriptor.template {
            Some(template) => {
                let render = inline_render_function(&template.content, &all_bindings, options)?;
                imports.extend(&render.0);
                ssr_imports.extend(&render.1);
                setup_body.push_str(&format!("return {}", render.2));
            }
            None => setup_body.push_str("return () => {}"),
        }
    } else {
        let returned: Vec<&str> = all_bindings
            .iter()
            .filter(|(_, kind)| **kind != BindingType::Props)
            .map(|(name, _)| name.as_str())
            .collect();
        setup_body.push_str(&format!(
            "const __returned__ = {{ {} }}\nObject.defineProperty(__returned__, '__isScriptSetup', {{ enumerable: false, value: true }})\nreturn __returned__",
            returned.join(", ")
        ));
    }

    let mut members: Vec<String> = vec![format!("__name: {}", js_string(&component_name(&descriptor.filename)))];
    if let Some(props) = &analysis.props {
        let runtime = match &props.defaults {
            Some(defaults) => format!("{}({}, {})", imports.helper("mergeDefaults"), props.runtime, defaults),
            None => props.runtime.clone(),
        };
        members.push(format!("props: {}", runtime));
    }
    if let Some(emits) = &analysis.emits {
        members.push(format!("emits: {}", emits));
    }
    let props_param = if options.is_ts { "__props: any" } else { "__props" };
    let ctx_param = if analysis.emits.is_some() {
        "{ expose: __expose, emit: __emit }"
    } else {
        "{ expose: __expose }"
    };
    members.push(format!(
        "setup({}, {}) {{\n{}\n}}",
        props_param,
        ctx_param,
        indent(&setup_body)
    ));
    let object_body = indent(&members.join(",\n"));

    let export = if options.is_ts {
        let define = imports.helper("defineComponent");
        if descriptor.script.is_some() {
            format!("export default /*#__PURE__*/{}({{\n  ...{},\n{}\n}})", define, DEFAULT_VAR, object_body)
        } else {
            format!("export default /*#__PURE__*/{}({{\n{}\n}})", define, object_body)
        }
    } else if descriptor.script.is_some() {
        format!("export default /*#__PURE__*/Object.assign({}, {{\n{}\n}})", DEFAULT_VAR, object_body)
    } else {
        format!("export default {{\n{}\n}}", object_body)
    };

    let mut content = String::new();
    for statement in [imports.to_statement(), ssr_imports.to_statement()] {
        if !statement.is_empty() {
            content.push_str(&statement);
            content.push('\n');
        }
    }
    for import in &user_imports {
        content.push_str(import);
        content.push('\n');
    }
    if !normal_code.trim().is_empty() {
        content.push('\n');
        content.push_str(normal_code.trim());
        content.push('\n');
    }
    content.push('\n');
    content.push_str(&export);
    content.push('\n');

    Ok(CompiledScript {
        content,
        bindings: Some(all_bindings),
        notices: Vec::new(),
    })
}

fn inline_render_function(
    template: &str,
    bindings: &BindingMetadata,
    options: &ScriptCompileOptions,
) -> Result<(VueImports, VueImports, String), ScriptCompileError> {
    let ast = parse_template(template);
    if let Some(error) = ast.errors.first() {
        return Err(ScriptCompileError::new(error.message.clone()).with_frame(template, error.offset));
    }
    let render_options = RenderOptions {
        bindings: Some(bindings),
        inline: true,
        custom_elements: options.custom_elements.clone(),
        is_prod: options.is_prod,
        scope_id: None,
    };
    let generated = if options.ssr {
        generate_ssr_render(&ast, &render_options)
    } else {
        generate_render(&ast, &render_options)
    };
    match generated {
        Ok(render) => Ok(render.into_inline(if options.ssr {
            INLINE_SSR_RENDER_PARAMS
        } else {
            INLINE_RENDER_PARAMS
        })),
        Err(errors) => {
            let first = &errors[0];
            Err(ScriptCompileError::new(first.message.clone()).with_frame(template, first.offset))
        }
    }
}

/// `src/components/HelloWorld.vue` -> `HelloWorld`
fn component_name(filename: &str) -> String {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    base.split('.').next().unwrap_or(base).to_string()
}

fn analyze_statements(
    program: &Program,
    source: &str,
    from_setup: bool,
    analysis: &mut SetupAnalysis,
) -> Result<(), ScriptCompileError> {
    let type_decls = collect_type_declarations(program);

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                if let Some(specifiers) = &decl.specifiers {
                    let source_name = decl.source.value.as_str();
                    for spec in specifiers {
                        let (local, imported, is_type) = match spec {
                            ImportDeclarationSpecifier::ImportSpecifier(s) => (
                                s.local.name.to_string(),
                                s.imported.name().to_string(),
                                s.import_kind.is_type(),
                            ),
                            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                                (s.local.name.to_string(), "default".to_string(), false)
                            }
                            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                (s.local.name.to_string(), "*".to_string(), false)
                            }
                        };
                        if is_type || decl.import_kind.is_type() {
                            continue;
                        }
                        let is_const = imported == "*"
                            || (imported == "default" && source_name.ends_with(".vue"))
                            || source_name == "vue";
                        analysis.bindings.insert(
                            local,
                            if is_const {
                                BindingType::SetupConst
                            } else {
                                BindingType::SetupMaybeRef
                            },
                        );
                    }
                }
                if from_setup {
                    analysis.user_imports.push(text(source, decl.span).to_string());
                    analysis.replacements.push((decl.span.start, decl.span.end, String::new()));
                }
            }
            Statement::ExportNamedDeclaration(decl) if from_setup => {
                return Err(ScriptCompileError::new(
                    "<script setup> cannot contain ES module exports.",
                )
                .with_frame(source, decl.span.start as usize));
            }
            Statement::ExportDefaultDeclaration(decl) if from_setup => {
                return Err(ScriptCompileError::new(
                    "<script setup> cannot contain ES module exports.",
                )
                .with_frame(source, decl.span.start as usize));
            }
            Statement::VariableDeclaration(var) => {
                let is_const = var.kind == VariableDeclarationKind::Const;
                for decl in &var.declarations {
                    if let (true, Some(Expression::CallExpression(call))) = (from_setup, &decl.init) {
                        if handle_macro(call, source, &type_decls, analysis)? {
                            let replacement = match callee_name(call) {
                                Some("defineEmits") => "__emit",
                                Some("defineExpose") => "undefined",
                                _ => "__props",
                            };
                            analysis
                                .replacements
                                .push((call.span.start, call.span.end, replacement.to_string()));
                        }
                    }
                    let mut names = Vec::new();
                    collect_pattern_names(&decl.id, &mut names);
                    let kind = match (&decl.id, &decl.init, is_const) {
                        (BindingPattern::BindingIdentifier(_), Some(init), true) => classify_const(init),
                        (_, _, true) => BindingType::SetupMaybeRef,
                        _ => BindingType::SetupLet,
                    };
                    for name in names {
                        analysis.bindings.insert(name, kind);
                    }
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    analysis.bindings.insert(id.name.to_string(), BindingType::SetupConst);
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    analysis.bindings.insert(id.name.to_string(), BindingType::SetupConst);
                }
            }
            Statement::TSEnumDeclaration(decl) => {
                analysis.bindings.insert(decl.id.name.to_string(), BindingType::SetupConst);
            }
            Statement::ExpressionStatement(es) if from_setup => {
                if let Expression::CallExpression(call) = &es.expression {
                    if handle_macro(call, source, &type_decls, analysis)? {
                        if callee_name(call) == Some("defineExpose") {
                            let span = call.callee.span();
                            analysis.replacements.push((span.start, span.end, "__expose".to_string()));
                        } else {
                            analysis.replacements.push((es.span.start, es.span.end, String::new()));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Record a compiler macro call. Returns whether `call` was one.
fn handle_macro(
    call: &CallExpression,
    source: &str,
    type_decls: &HashMap<String, Vec<PropMember>>,
    analysis: &mut SetupAnalysis,
) -> Result<bool, ScriptCompileError> {
    match callee_name(call) {
        Some("defineProps") => {
            analysis.props = Some(props_from_define(call, source, type_decls)?);
            Ok(true)
        }
        Some("withDefaults") => {
            let inner = call.arguments.first().and_then(|a| match a {
                Argument::CallExpression(inner) if callee_name(inner) == Some("defineProps") => Some(inner),
                _ => None,
            });
            let Some(inner) = inner else {
                return Err(ScriptCompileError::new(
                    "The 1st argument of withDefaults must be a defineProps() call.",
                )
                .with_frame(source, call.span.start as usize));
            };
            let mut props = props_from_define(inner, source, type_decls)?;
            props.defaults = call.arguments.get(1).map(|a| text(source, a.span()).to_string());
            analysis.props = Some(props);
            Ok(true)
        }
        Some("defineEmits") => {
            analysis.emits = Some(emits_from_define(call, source));
            Ok(true)
        }
        Some("defineExpose") => {
            analysis.has_expose = true;
            Ok(true)
        }
        _ => Ok(false),
    }
}

struct PropMember {
    key: String,
    optional: bool,
    type_text: String,
}

/// Local `interface X {}` and `type X = {}` declarations usable as props types.
fn collect_type_declarations(program: &Program) -> HashMap<String, Vec<PropMember>> {
    let source = program.source_text;
    let mut decls = HashMap::new();
    for stmt in &program.body {
        match stmt {
            Statement::TSInterfaceDeclaration(decl) => {
                decls.insert(decl.id.name.to_string(), members_of(&decl.body.body, source));
            }
            Statement::TSTypeAliasDeclaration(decl) => {
                if let TSType::TSTypeLiteral(lit) = &decl.type_annotation {
                    decls.insert(decl.id.name.to_string(), members_of(&lit.members, source));
                }
            }
            _ => {}
        }
    }
    decls
}

fn members_of(signatures: &[TSSignature], source: &str) -> Vec<PropMember> {
    signatures
        .iter()
        .filter_map(|sig| match sig {
            TSSignature::TSPropertySignature(p) => Some(PropMember {
                key: p.key.static_name()?.to_string(),
                optional: p.optional,
                type_text: p
                    .type_annotation
                    .as_ref()
                    .map(|t| text(source, t.type_annotation.span()).trim().to_string())
                    .unwrap_or_default(),
            }),
            TSSignature::TSMethodSignature(m) => Some(PropMember {
                key: m.key.static_name()?.to_string(),
                optional: m.optional,
                type_text: "() => void".to_string(),
            }),
            _ => None,
        })
        .collect()
}

fn props_from_define(
    call: &CallExpression,
    source: &str,
    type_decls: &HashMap<String, Vec<PropMember>>,
) -> Result<PropsDecl, ScriptCompileError> {
    if let Some(arg) = call.arguments.first() {
        let mut keys = BindingMetadata::new();
        if let Some(expr) = arg.as_expression() {
            insert_keys(expr, BindingType::Props, &mut keys);
        }
        return Ok(PropsDecl {
            keys: keys.into_keys().collect(),
            runtime: text(source, arg.span()).to_string(),
            defaults: None,
        });
    }

    let Some(type_args) = &call.type_arguments else {
        return Ok(PropsDecl {
            keys: Vec::new(),
            runtime: "{}".to_string(),
            defaults: None,
        });
    };
    let members: Vec<PropMember> = match type_args.params.first() {
        Some(TSType::TSTypeLiteral(lit)) => members_of(&lit.members, source),
        Some(TSType::TSTypeReference(r)) => {
            let name = text(source, r.type_name.span());
            match type_decls.get(name) {
                Some(members) => members
                    .iter()
                    .map(|m| PropMember {
                        key: m.key.clone(),
                        optional: m.optional,
                        type_text: m.type_text.clone(),
                    })
                    .collect(),
                None => {
                    return Err(ScriptCompileError::new(format!(
                        "Unresolvable type reference or unsupported built-in utility type: {}",
                        name
                    ))
                    .with_frame(source, r.span.start as usize))
                }
            }
        }
        _ => {
            return Err(ScriptCompileError::new(
                "type argument passed to defineProps() must be a literal type, or a reference to an interface or literal type.",
            )
            .with_frame(source, type_args.span.start as usize))
        }
    };

    let entries: Vec<String> = members
        .iter()
        .map(|m| {
            format!(
                "{}: {{ type: {}, required: {} }}",
                super::render::prop_key(&m.key),
                runtime_type(&m.type_text),
                !m.optional
            )
        })
        .collect();
    Ok(PropsDecl {
        keys: members.into_iter().map(|m| m.key).collect(),
        runtime: if entries.is_empty() {
            "{}".to_string()
        } else {
            format!("{{\n{}\n}}", indent(&entries.join(",\n")))
        },
        defaults: None,
    })
}

/// Runtime constructor for a TS prop type, `null` when it cannot be inferred.
fn runtime_type(ts: &str) -> &'static str {
    let ts = ts.trim();
    if ts.ends_with("[]") || ts.starts_with("Array<") || ts.starts_with('[') {
        "Array"
    } else if ts == "string" || ts.starts_with('\'') || ts.starts_with('"') {
        "String"
    } else if ts == "number" {
        "Number"
    } else if ts == "boolean" {
        "Boolean"
    } else if ts.starts_with('(') && ts.contains("=>") || ts == "Function" {
        "Function"
    } else if ts.starts_with('{') || ts.starts_with("Record<") || ts == "object" {
        "Object"
    } else if ts == "Date" {
        "Date"
    } else {
        "null"
    }
}

fn emits_from_define(call: &CallExpression, source: &str) -> String {
    if let Some(arg) = call.arguments.first() {
        return text(source, arg.span()).to_string();
    }
    let mut names: Vec<String> = Vec::new();
    if let Some(TSType::TSTypeLiteral(lit)) = call.type_arguments.as_ref().and_then(|t| t.params.first()) {
        for member in &lit.members {
            match member {
                TSSignature::TSCallSignatureDeclaration(sig) => {
                    for caps in EMIT_SIGNATURE_RE.captures_iter(text(source, sig.span)) {
                        names.push(caps[1].to_string());
                    }
                }
                TSSignature::TSPropertySignature(p) => {
                    if let Some(key) = p.key.static_name() {
                        names.push(key.to_string());
                    }
                }
                _ => {}
            }
        }
    }
    names.dedup();
    format!(
        "[{}]",
        names.iter().map(|n| js_string(n)).collect::<Vec<_>>().join(", ")
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULT EXPORT REWRITE
// ═══════════════════════════════════════════════════════════════════════════════

/// Turn the default export of `source` into `const <as_name> = ...`.
pub fn rewrite_default(source: &str, as_name: &str, is_ts: bool) -> Result<String, ScriptCompileError> {
    let allocator = Allocator::default();
    let program = parse_program(&allocator, source, is_ts)?;

    let mut replacements: Vec<(u32, u32, String)> = Vec::new();
    let mut appended: Option<String> = None;

    for stmt in &program.body {
        match stmt {
            Statement::ExportDefaultDeclaration(decl) => {
                let inner = decl.declaration.span();
                let named = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => f.id.as_ref().map(|id| id.name.to_string()),
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => c.id.as_ref().map(|id| id.name.to_string()),
                    _ => None,
                };
                match named {
                    Some(name) => {
                        replacements.push((decl.span.start, inner.start, String::new()));
                        appended = Some(format!("\nconst {} = {}", as_name, name));
                    }
                    None => replacements.push((decl.span.start, inner.start, format!("const {} = ", as_name))),
                }
            }
            Statement::ExportNamedDeclaration(decl) => {
                let Some(default_spec) = decl
                    .specifiers
                    .iter()
                    .find(|s| s.exported.name().as_str() == "default")
                else {
                    continue;
                };
                let local = default_spec.local.name().to_string();
                if let Some(src) = &decl.source {
                    replacements.push((
                        decl.span.start,
                        decl.span.end,
                        format!(
                            "import {{ {} as __VUE_DEFAULT__ }} from {}",
                            local,
                            text(source, src.span)
                        ),
                    ));
                    appended = Some(format!("\nconst {} = __VUE_DEFAULT__", as_name));
                    continue;
                }
                let remaining: Vec<&str> = decl
                    .specifiers
                    .iter()
                    .filter(|s| s.exported.name().as_str() != "default")
                    .map(|s| text(source, s.span))
                    .collect();
                let replacement = if remaining.is_empty() {
                    String::new()
                } else {
                    format!("export {{ {} }}", remaining.join(", "))
                };
                replacements.push((decl.span.start, decl.span.end, replacement));
                appended = Some(format!("\nconst {} = {}", as_name, local));
            }
            _ => {}
        }
    }

    let found = !replacements.is_empty() && (appended.is_some() || replacements.iter().any(|r| r.2.starts_with("const ")));
    let mut result = source.to_string();
    replacements.sort_by(|a, b| b.0.cmp(&a.0));
    for (start, end, replacement) in replacements {
        result.replace_range(start as usize..end as usize, &replacement);
    }
    match appended {
        Some(tail) => result.push_str(&tail),
        None if !found => result.push_str(&format!("\nconst {} = {{}}", as_name)),
        None => {}
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::sfc_parse::parse_sfc;

    fn options() -> ScriptCompileOptions {
        ScriptCompileOptions {
            id: "1a2b3c4d".to_string(),
            inline_template: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_rewrite_default_forms() {
        assert_eq!(
            rewrite_default("export default { name: 'a' }", "__sfc__", false).unwrap(),
            "const __sfc__ = { name: 'a' }"
        );
        assert_eq!(
            rewrite_default("export default function foo() {}", "__sfc__", false).unwrap(),
            "function foo() {}\nconst __sfc__ = foo"
        );
        assert_eq!(
            rewrite_default("const a = {}\nexport { a as default }", "__sfc__", false).unwrap(),
            "const a = {}\n\nconst __sfc__ = a"
        );
        assert_eq!(
            rewrite_default("const a = 1", "__sfc__", false).unwrap(),
            "const a = 1\nconst __sfc__ = {}"
        );
        assert!(rewrite_default("export default {", "__sfc__", false).is_err());
    }

    #[test]
    fn test_setup_bindings_and_inline_render() {
        let src = r#"<script setup>
import { ref, reactive } from 'vue'
import Child from './Child.vue'
const props = defineProps(['title'])
const count = ref(0)
const state = reactive({ n: 1 })
let flag = false
const msg = 'hi'
function inc() { count.value++ }
</script>
<template><Child :title="title" @click="inc">{{ count }} {{ msg }}</Child></template>"#;
        let descriptor = parse_sfc(src, "src/App.vue").descriptor;
        let out = compile_script(&descriptor, &options()).unwrap();
        let bindings = out.bindings.unwrap();
        assert_eq!(bindings.get("title"), Some(&BindingType::Props));
        assert_eq!(bindings.get("ref"), Some(&BindingType::SetupConst));
        assert_eq!(bindings.get("Child"), Some(&BindingType::SetupConst));
        assert_eq!(bindings.get("props"), Some(&BindingType::SetupReactiveConst));
        assert_eq!(bindings.get("count"), Some(&BindingType::SetupRef));
        assert_eq!(bindings.get("state"), Some(&BindingType::SetupReactiveConst));
        assert_eq!(bindings.get("flag"), Some(&BindingType::SetupLet));
        assert_eq!(bindings.get("msg"), Some(&BindingType::SetupConst));
        assert_eq!(bindings.get("inc"), Some(&BindingType::SetupConst));

        let code = out.content;
        assert!(code.starts_with("import { "));
        assert!(code.contains("import { ref, reactive } from 'vue'\nimport Child from './Child.vue'\n"));
        assert!(code.contains("const props = __props"));
        assert!(code.contains("props: ['title']"));
        assert!(code.contains("__name: \"App\""));
        assert!(code.contains("setup(__props, { expose: __expose }) {"));
        assert!(code.contains("return (_ctx, _cache) => {"));
        assert!(code.contains("_createVNode(Child, {"));
        assert!(code.contains("title: __props.title"));
        assert!(code.contains("_toDisplayString(count.value)"));
        assert!(code.contains("export default {"));
    }

    #[test]
    fn test_ssr_inline_and_css_vars_excluded() {
        let src = "<script setup>\nconst color = 'red'\n</script>\n<template><p>x</p></template>\n<style>p { color: v-bind(color) }</style>";
        let descriptor = parse_sfc(src, "src/App.vue").descriptor;

        let client = compile_script(&descriptor, &options()).unwrap().content;
        assert!(client.contains("_useCssVars(_ctx => ({"));
        assert!(client.contains("\"1a2b3c4d-color\": (color)"));

        let ssr_options = ScriptCompileOptions { ssr: true, ..options() };
        let ssr = compile_script(&descriptor, &ssr_options).unwrap().content;
        assert!(!ssr.contains("useCssVars"));
        assert!(ssr.contains("return (_ctx, _push, _parent, _attrs) => {"));
        assert!(ssr.contains("from \"vue/server-renderer\""));
    }

    #[test]
    fn test_ts_props_and_emits() {
        let src = "<script setup lang=\"ts\">\ninterface Props { msg: string; count?: number }\nconst props = defineProps<Props>()\nconst emit = defineEmits<{ (e: 'change', id: number): void }>()\n</script>";
        let descriptor = parse_sfc(src, "src/Comp.vue").descriptor;
        let opts = ScriptCompileOptions { is_ts: true, ..options() };
        let out = compile_script(&descriptor, &opts).unwrap();
        let code = out.content;
        assert!(code.contains("msg: { type: String, required: true }"));
        assert!(code.contains("count: { type: Number, required: false }"));
        assert!(code.contains("emits: [\"change\"]"));
        assert!(code.contains("const emit = __emit"));
        assert!(code.contains("export default /*#__PURE__*/_defineComponent({"));
        assert!(code.contains("return () => {}"));
    }

    #[test]
    fn test_non_inline_returns_bindings() {
        let src = "<script setup>\nimport { ref } from 'vue'\nconst n = ref(1)\n</script>\n<template><p>{{ n }}</p></template>";
        let descriptor = parse_sfc(src, "src/App.vue").descriptor;
        let opts = ScriptCompileOptions { inline_template: false, ..options() };
        let code = compile_script(&descriptor, &opts).unwrap().content;
        assert!(code.contains("const __returned__ = { ref, n }"));
    }

    #[test]
    fn test_normal_script_options_bindings() {
        let src = "<script>\nexport default {\n  props: ['a'],\n  data() { return { b: 1 } },\n  computed: { c() { return 2 } }\n}\n</script>";
        let descriptor = parse_sfc(src, "src/Opt.vue").descriptor;
        let out = compile_script(&descriptor, &options()).unwrap();
        let bindings = out.bindings.unwrap();
        assert_eq!(bindings.get("a"), Some(&BindingType::Props));
        assert_eq!(bindings.get("b"), Some(&BindingType::Data));
        assert_eq!(bindings.get("c"), Some(&BindingType::Options));
        assert!(out.content.contains("export default {"));
    }

    #[test]
    fn test_exports_in_setup_rejected() {
        let src = "<script setup>\nexport const a = 1\n</script>";
        let descriptor = parse_sfc(src, "src/App.vue").descriptor;
        let err = compile_script(&descriptor, &options()).unwrap_err();
        assert!(err.message.contains("cannot contain ES module exports"));
    }
}
