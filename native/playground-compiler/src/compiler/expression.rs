//! Template expression prefixing
//!
//! Rewrites bare identifiers of template expressions so they resolve against
//! the right binding container at runtime (`$setup.x`, `$props.x`, `_ctx.x`,
//! or the inlined setup locals). Replacements are collected by span and
//! applied back to front.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Expression, IdentifierReference, ObjectProperty, SimpleAssignmentTarget};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::collections::{BTreeSet, HashSet};

use super::{BindingMetadata, BindingType};

lazy_static! {
    static ref GLOBALS_ALLOWED: HashSet<&'static str> = [
        "Infinity", "undefined", "NaN", "isFinite", "isNaN", "parseFloat", "parseInt",
        "decodeURI", "decodeURIComponent", "encodeURI", "encodeURIComponent", "Math",
        "Number", "Date", "Array", "Object", "Boolean", "String", "RegExp", "Map", "Set",
        "JSON", "Intl", "BigInt", "console", "Error", "Symbol", "require", "arguments",
    ]
    .into_iter()
    .collect();
}

/// Where identifiers of a template expression resolve to.
#[derive(Debug, Clone, Default)]
pub struct ExpressionContext<'a> {
    pub bindings: Option<&'a BindingMetadata>,
    /// Render function inlined into `setup()`.
    pub inline: bool,
    /// Names bound by the template itself (`v-for` aliases, `$event`).
    pub locals: HashSet<String>,
}

impl<'a> ExpressionContext<'a> {
    pub fn new(bindings: Option<&'a BindingMetadata>, inline: bool) -> Self {
        ExpressionContext {
            bindings,
            inline,
            locals: HashSet::new(),
        }
    }

    pub fn with_locals<I: IntoIterator<Item = String>>(&self, names: I) -> Self {
        let mut next = self.clone();
        next.locals.extend(names);
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixedExpression {
    pub code: String,
    /// Runtime helpers the rewritten code calls (e.g. `unref`).
    pub helpers: BTreeSet<&'static str>,
}

/// Prefix a single expression. `Err` carries the parser message.
pub fn prefix_expression(code: &str, ctx: &ExpressionContext) -> Result<PrefixedExpression, String> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let expr = Parser::new(&allocator, code, source_type)
        .parse_expression()
        .map_err(|errors| {
            errors
                .first()
                .map(|e| format!("Error parsing JavaScript expression: {}", e))
                .unwrap_or_else(|| "Error parsing JavaScript expression".to_string())
        })?;

    let mut collector = ReferenceCollector::default();
    collector.visit_expression(&expr);
    Ok(apply(code, collector, ctx))
}

/// Prefix a statement list, used for multi-statement event handlers.
pub fn prefix_statements(code: &str, ctx: &ExpressionContext) -> Result<PrefixedExpression, String> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ret = Parser::new(&allocator, code, source_type).parse();
    if let Some(e) = ret.errors.first() {
        return Err(format!("Error parsing JavaScript expression: {}", e));
    }
    let mut collector = ReferenceCollector::default();
    collector.visit_program(&ret.program);
    Ok(apply(code, collector, ctx))
}

/// `a.b`, `a['b']` and `foo` handlers can be passed through as values.
pub fn is_member_expression(code: &str) -> bool {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    match Parser::new(&allocator, code, source_type).parse_expression() {
        Ok(expr) => matches!(
            expr,
            Expression::Identifier(_)
                | Expression::StaticMemberExpression(_)
                | Expression::ComputedMemberExpression(_)
        ),
        Err(_) => false,
    }
}

/// `() => ...` and `function () {}` handlers are used as-is.
pub fn is_function_expression(code: &str) -> bool {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    match Parser::new(&allocator, code, source_type).parse_expression() {
        Ok(expr) => matches!(
            expr,
            Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_)
        ),
        Err(_) => false,
    }
}

fn apply(code: &str, collector: ReferenceCollector, ctx: &ExpressionContext) -> PrefixedExpression {
    let mut helpers = BTreeSet::new();
    let mut replacements: Vec<(u32, u32, String)> = Vec::new();

    for reference in collector.references {
        if is_local(&reference.name, ctx, &collector.bindings) {
            continue;
        }
        let rewritten = rewrite_identifier(&reference.name, reference.write, ctx, &mut helpers);
        let replacement = if reference.shorthand {
            format!("{}: {}", reference.name, rewritten)
        } else {
            rewritten
        };
        replacements.push((reference.start, reference.end, replacement));
    }

    // Sort reverse to apply safely
    replacements.sort_by(|a, b| b.0.cmp(&a.0));
    let mut result = code.to_string();
    for (start, end, replacement) in replacements {
        result.replace_range((start as usize)..(end as usize), &replacement);
    }

    PrefixedExpression {
        code: result,
        helpers,
    }
}

fn is_local(name: &str, ctx: &ExpressionContext, bound: &HashSet<String>) -> bool {
    ctx.locals.contains(name) || bound.contains(name) || GLOBALS_ALLOWED.contains(name)
}

fn rewrite_identifier(
    name: &str,
    write: bool,
    ctx: &ExpressionContext,
    helpers: &mut BTreeSet<&'static str>,
) -> String {
    let binding = ctx.bindings.and_then(|b| b.get(name)).copied();
    if ctx.inline {
        match binding {
            Some(BindingType::SetupConst) | Some(BindingType::SetupReactiveConst) => name.to_string(),
            Some(BindingType::SetupRef) => format!("{}.value", name),
            Some(BindingType::SetupMaybeRef) if write => format!("{}.value", name),
            Some(BindingType::SetupLet) if write => name.to_string(),
            Some(BindingType::SetupMaybeRef) | Some(BindingType::SetupLet) => {
                helpers.insert("unref");
                format!("_unref({})", name)
            }
            Some(BindingType::Props) => format!("__props.{}", name),
            _ => format!("_ctx.{}", name),
        }
    } else {
        match binding {
            Some(b) if b.is_setup() => format!("$setup.{}", name),
            Some(BindingType::Props) => format!("$props.{}", name),
            Some(BindingType::Data) => format!("$data.{}", name),
            Some(BindingType::Options) => format!("$options.{}", name),
            _ => format!("_ctx.{}", name),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REFERENCE COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

struct Reference {
    name: String,
    start: u32,
    end: u32,
    write: bool,
    shorthand: bool,
}

#[derive(Default)]
struct ReferenceCollector {
    references: Vec<Reference>,
    /// Names bound inside the expression itself (arrow params, destructuring).
    bindings: HashSet<String>,
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.references.push(Reference {
            name: ident.name.to_string(),
            start: ident.span.start,
            end: ident.span.end,
            write: false,
            shorthand: false,
        });
    }

    fn visit_binding_identifier(&mut self, ident: &oxc_ast::ast::BindingIdentifier<'a>) {
        self.bindings.insert(ident.name.to_string());
    }

    fn visit_simple_assignment_target(&mut self, target: &SimpleAssignmentTarget<'a>) {
        if let SimpleAssignmentTarget::AssignmentTargetIdentifier(ident) = target {
            self.references.push(Reference {
                name: ident.name.to_string(),
                start: ident.span.start,
                end: ident.span.end,
                write: true,
                shorthand: false,
            });
            return;
        }
        oxc_ast_visit::walk::walk_simple_assignment_target(self, target);
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(ident) = &prop.value {
                self.references.push(Reference {
                    name: ident.name.to_string(),
                    start: prop.span.start,
                    end: prop.span.end,
                    write: false,
                    shorthand: true,
                });
                return;
            }
        }
        oxc_ast_visit::walk::walk_object_property(self, prop);
    }
}
