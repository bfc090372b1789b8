//! Script transforms
//!
//! Type erasure (with optional classic-runtime JSX) through `oxc_transformer`,
//! and the `$ref` reactivity sugar rewrite.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPattern, CallExpression, Expression, IdentifierReference, ObjectProperty, Statement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::{GetSpan, SourceType};
use oxc_syntax::symbol::SymbolId;
use oxc_transformer::{JsxOptions, JsxRuntime, TransformOptions, Transformer, TypeScriptOptions};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

use crate::imports::VueImports;

lazy_static! {
    static ref REF_SUGAR_RE: Regex = Regex::new(r"(?:^|[^\w$])\$(?:\$|ref|computed|shallowRef)?\s*[(<]").unwrap();
}

/// JSX factory names used by the classic runtime.
pub const JSX_PRAGMA: &str = "_h";
pub const JSX_PRAGMA_FRAG: &str = "_Fragment";

#[derive(Debug, Clone, Default)]
pub struct ScriptTransformOptions {
    /// Used for diagnostics and to pick the source type.
    pub filename: String,
    pub typescript: bool,
    pub jsx: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub code: String,
}

pub trait ScriptTransformer: Send + Sync {
    fn transform(
        &self,
        source: &str,
        options: &ScriptTransformOptions,
    ) -> Result<TransformOutput, Vec<String>>;
}

/// Strips TypeScript syntax and, in JSX mode, lowers JSX to `_h(...)` calls
/// with a matching `import { h as _h, Fragment as _Fragment } from "vue"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OxcTransformer;

impl ScriptTransformer for OxcTransformer {
    fn transform(
        &self,
        source: &str,
        options: &ScriptTransformOptions,
    ) -> Result<TransformOutput, Vec<String>> {
        let allocator = Allocator::default();
        let source_type = SourceType::default()
            .with_module(true)
            .with_typescript(options.typescript)
            .with_jsx(options.jsx);
        let ret = Parser::new(&allocator, source, source_type).parse();
        if !ret.errors.is_empty() {
            return Err(ret.errors.iter().map(|e| e.to_string()).collect());
        }
        let mut program = ret.program;

        let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
        let mut transform_options = TransformOptions {
            typescript: TypeScriptOptions::default(),
            ..TransformOptions::default()
        };
        if options.jsx {
            transform_options.jsx = JsxOptions {
                runtime: JsxRuntime::Classic,
                pragma: Some(JSX_PRAGMA.to_string()),
                pragma_frag: Some(JSX_PRAGMA_FRAG.to_string()),
                ..JsxOptions::default()
            };
        }
        let filename = if options.filename.is_empty() {
            "module.ts"
        } else {
            options.filename.as_str()
        };
        let transformed = Transformer::new(&allocator, Path::new(filename), &transform_options)
            .build_with_scoping(scoping, &mut program);
        if !transformed.errors.is_empty() {
            return Err(transformed.errors.iter().map(|e| e.to_string()).collect());
        }

        let mut code = Codegen::new().build(&program).code;
        if options.jsx {
            let mut imports = VueImports::new();
            imports.insert("h", JSX_PRAGMA);
            imports.insert("Fragment", JSX_PRAGMA_FRAG);
            code = format!("{}\n{}", imports.to_statement(), code);
        }
        Ok(TransformOutput { code })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REACTIVITY SUGAR
// ═══════════════════════════════════════════════════════════════════════════════

/// Cheap textual check for `$ref(`, `$computed(`, `$$(`, `$(` and friends.
pub fn should_transform_ref(source: &str) -> bool {
    REF_SUGAR_RE.is_match(source)
}

const REF_MACROS: &[(&str, &str)] = &[
    ("$ref", "ref"),
    ("$computed", "computed"),
    ("$shallowRef", "shallowRef"),
    ("$customRef", "customRef"),
    ("$toRef", "toRef"),
];

/// Rewrite `let x = $ref(0)` style declarations into real refs.
///
/// References to the declared variables get `.value`, shorthand properties
/// are expanded and `$$(x)` escapes are unwrapped to the raw ref.
pub fn transform_ref(source: &str, filename: &str) -> Result<String, Vec<String>> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(filename)
        .unwrap_or_default()
        .with_module(true);
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return Err(ret.errors.iter().map(|e| e.to_string()).collect());
    }
    let program = ret.program;
    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();

    let mut imports = VueImports::new();
    let mut edits: Vec<(u32, u32, String)> = Vec::new();
    let mut symbols: HashSet<SymbolId> = HashSet::new();

    for stmt in &program.body {
        let declaration = match stmt {
            Statement::VariableDeclaration(var) => var,
            Statement::ExportNamedDeclaration(export) => match &export.declaration {
                Some(oxc_ast::ast::Declaration::VariableDeclaration(var)) => var,
                _ => continue,
            },
            _ => continue,
        };
        for declarator in &declaration.declarations {
            let (BindingPattern::BindingIdentifier(id), Some(Expression::CallExpression(call))) =
                (&declarator.id, &declarator.init)
            else {
                continue;
            };
            let Expression::Identifier(callee) = &call.callee else {
                continue;
            };
            let Some((_, helper)) = REF_MACROS.iter().find(|(m, _)| *m == callee.name.as_str()) else {
                continue;
            };
            let local = imports.helper(helper);
            edits.push((callee.span.start, callee.span.end, local));
            if let Some(symbol) = id.symbol_id.get() {
                symbols.insert(symbol);
            }
        }
    }

    if symbols.is_empty() && edits.is_empty() {
        return Ok(source.to_string());
    }

    let mut rewriter = RefRewriter {
        scoping: &scoping,
        symbols,
        edits: Vec::new(),
        escape_depth: 0,
    };
    rewriter.visit_program(&program);
    edits.append(&mut rewriter.edits);

    let mut code = source.to_string();
    edits.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    for (start, end, replacement) in edits {
        code.replace_range(start as usize..end as usize, &replacement);
    }
    Ok(format!("{}\n{}", imports.to_statement(), code))
}

struct RefRewriter<'s> {
    scoping: &'s Scoping,
    symbols: HashSet<SymbolId>,
    edits: Vec<(u32, u32, String)>,
    /// Inside `$$()`.
    escape_depth: usize,
}

impl RefRewriter<'_> {
    fn is_ref(&self, id: &IdentifierReference) -> bool {
        id.reference_id
            .get()
            .and_then(|r| self.scoping.get_reference(r).symbol_id())
            .is_some_and(|s| self.symbols.contains(&s))
    }
}

impl<'a> Visit<'a> for RefRewriter<'_> {
    fn visit_identifier_reference(&mut self, id: &IdentifierReference<'a>) {
        if self.escape_depth == 0 && self.is_ref(id) {
            self.edits.push((id.span.end, id.span.end, ".value".to_string()));
        }
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand && self.escape_depth == 0 {
            if let Expression::Identifier(id) = &prop.value {
                if self.is_ref(id) {
                    self.edits.push((id.span.end, id.span.end, format!(": {}.value", id.name)));
                    return;
                }
            }
        }
        walk::walk_object_property(self, prop);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        let is_escape = matches!(&call.callee, Expression::Identifier(id) if id.name == "$$");
        if let (true, Some(arg)) = (is_escape, call.arguments.first()) {
            let inner = arg.span();
            self.edits.push((call.span.start, inner.start, String::new()));
            self.edits.push((inner.end, call.span.end, String::new()));
            self.escape_depth += 1;
            for arg in &call.arguments {
                self.visit_argument(arg);
            }
            self.escape_depth -= 1;
            return;
        }
        walk::walk_call_expression(self, call);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_transform_ref() {
        assert!(should_transform_ref("let a = $ref(0)"));
        assert!(should_transform_ref("const b = $computed(() => a)"));
        assert!(should_transform_ref("fn($$(a))"));
        assert!(!should_transform_ref("const price = '$5'"));
        assert!(!should_transform_ref("const ref = ref(0)"));
    }

    #[test]
    fn test_transform_ref_rewrites_references() {
        let src = "let count = $ref(0)\nconst double = $computed(() => count * 2)\nfunction inc() { count++ }\nconst obj = { count }\nwatch($$(count), () => {})\n";
        let out = transform_ref(src, "src/counter.js").unwrap();
        assert!(out.starts_with("import { ref as _ref, computed as _computed } from \"vue\"\n"));
        assert!(out.contains("let count = _ref(0)"));
        assert!(out.contains("_computed(() => count.value * 2)"));
        assert!(out.contains("count.value++"));
        assert!(out.contains("{ count: count.value }"));
        assert!(out.contains("watch(count, () => {})"));
    }

    #[test]
    fn test_transform_ref_respects_shadowing() {
        let src = "let n = $ref(1)\nfunction f(n) { return n }\n";
        let out = transform_ref(src, "a.js").unwrap();
        assert!(out.contains("function f(n) { return n }"));
    }

    #[test]
    fn test_oxc_transformer_strips_types() {
        let out = OxcTransformer
            .transform(
                "const a: number = 1\nexport function f(x: string): string { return x }\n",
                &ScriptTransformOptions {
                    filename: "a.ts".to_string(),
                    typescript: true,
                    jsx: false,
                },
            )
            .unwrap();
        assert!(!out.code.contains(": number"));
        assert!(out.code.contains("export function f(x)"));
    }

    #[test]
    fn test_oxc_transformer_classic_jsx() {
        let out = OxcTransformer
            .transform(
                "export const view = () => <div class=\"a\">hi</div>\n",
                &ScriptTransformOptions {
                    filename: "a.tsx".to_string(),
                    typescript: true,
                    jsx: true,
                },
            )
            .unwrap();
        assert!(out.code.starts_with("import { h as _h, Fragment as _Fragment } from \"vue\""));
        assert!(out.code.contains("_h(\"div\""));
    }

    #[test]
    fn test_parse_errors_are_reported() {
        let err = OxcTransformer
            .transform("const = 1", &ScriptTransformOptions::default())
            .unwrap_err();
        assert!(!err.is_empty());
    }
}
