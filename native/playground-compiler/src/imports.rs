//! Named imports from the framework module, kept as an ordered set.
//!
//! Code generators ask for helpers by name and get back the local alias;
//! independently generated chunks are merged at statement level, never by
//! splicing import text.

use indexmap::IndexMap;
use oxc_allocator::Allocator;
use oxc_ast::ast::{ImportDeclarationSpecifier, Statement};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};

pub const VUE_MODULE: &str = "vue";
pub const SERVER_RENDERER_MODULE: &str = "vue/server-renderer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VueImports {
    source: String,
    /// local name -> imported name
    specifiers: IndexMap<String, String>,
}

impl Default for VueImports {
    fn default() -> Self {
        Self::new()
    }
}

impl VueImports {
    pub fn new() -> Self {
        Self::for_module(VUE_MODULE)
    }

    pub fn for_module(source: &str) -> Self {
        VueImports {
            source: source.to_string(),
            specifiers: IndexMap::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Register `name as _name` and return the local alias.
    pub fn helper(&mut self, name: &str) -> String {
        let local = format!("_{}", name);
        self.insert(name, &local);
        local
    }

    pub fn insert(&mut self, imported: &str, local: &str) {
        self.specifiers
            .entry(local.to_string())
            .or_insert_with(|| imported.to_string());
    }

    pub fn extend(&mut self, other: &VueImports) {
        for (local, imported) in &other.specifiers {
            self.insert(imported, local);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.specifiers.len()
    }

    pub fn contains_local(&self, local: &str) -> bool {
        self.specifiers.contains_key(local)
    }

    /// `import { a as _a, b } from "vue"`, or nothing when empty.
    pub fn to_statement(&self) -> String {
        if self.specifiers.is_empty() {
            return String::new();
        }
        let names: Vec<String> = self
            .specifiers
            .iter()
            .map(|(local, imported)| {
                if local == imported {
                    local.clone()
                } else {
                    format!("{} as {}", imported, local)
                }
            })
            .collect();
        format!("import {{ {} }} from \"{}\"", names.join(", "), self.source)
    }

    /// Pull every named-only import of this module out of `code`.
    ///
    /// Returns the remaining code; imports with a default or namespace
    /// specifier are left in place. Unparseable code is returned untouched.
    pub fn extract(&mut self, code: &str) -> String {
        let allocator = Allocator::default();
        let source_type = SourceType::default().with_module(true).with_typescript(true).with_jsx(true);
        let ret = Parser::new(&allocator, code, source_type).parse();
        if !ret.errors.is_empty() {
            return code.to_string();
        }

        let mut removals: Vec<(u32, u32)> = Vec::new();
        for stmt in &ret.program.body {
            let Statement::ImportDeclaration(decl) = stmt else {
                continue;
            };
            if decl.source.value.as_str() != self.source || decl.import_kind.is_type() {
                continue;
            }
            let Some(specifiers) = &decl.specifiers else {
                continue;
            };
            let named_only = specifiers
                .iter()
                .all(|s| matches!(s, ImportDeclarationSpecifier::ImportSpecifier(_)));
            if !named_only {
                continue;
            }
            for spec in specifiers {
                if let ImportDeclarationSpecifier::ImportSpecifier(spec) = spec {
                    if spec.import_kind.is_type() {
                        continue;
                    }
                    self.insert(spec.imported.name().as_str(), spec.local.name.as_str());
                }
            }
            removals.push((stmt.span().start, stmt.span().end));
        }

        let mut result = code.to_string();
        for (start, end) in removals.into_iter().rev() {
            let mut end = end as usize;
            if result[end..].starts_with('\n') {
                end += 1;
            }
            result.replace_range(start as usize..end, "");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_aliases_are_deduplicated() {
        let mut imports = VueImports::new();
        assert_eq!(imports.helper("toDisplayString"), "_toDisplayString");
        imports.helper("openBlock");
        imports.helper("toDisplayString");
        assert_eq!(imports.len(), 2);
        assert_eq!(
            imports.to_statement(),
            "import { toDisplayString as _toDisplayString, openBlock as _openBlock } from \"vue\""
        );
    }

    #[test]
    fn test_extract_merges_statements() {
        let code = "import { h as _h, Fragment as _Fragment } from 'vue'\nimport { ref } from \"vue\"\nimport Vue from 'vue'\nconst a = ref(1)\n";
        let mut imports = VueImports::new();
        let rest = imports.extract(code);
        assert_eq!(rest, "import Vue from 'vue'\nconst a = ref(1)\n");
        assert_eq!(
            imports.to_statement(),
            "import { h as _h, Fragment as _Fragment, ref } from \"vue\""
        );
    }

    #[test]
    fn test_extract_ignores_other_modules() {
        let code = "import { ref } from './ref'\nexport default {}\n";
        let mut imports = VueImports::new();
        assert_eq!(imports.extract(code), code);
        assert!(imports.is_empty());
        assert_eq!(imports.to_statement(), "");
    }
}
