use super::*;
use crate::version::CompilerFamily;

fn compilers() -> Vec<Box<dyn SfcCompiler>> {
    vec![Box::new(V3Compiler::new("3.4.21")), Box::new(V2Compiler::new("2.7.16"))]
}

#[test]
fn test_families_match_versions() {
    let families: Vec<(CompilerFamily, String)> = compilers()
        .iter()
        .map(|c| (c.family(), c.version().to_string()))
        .collect();
    assert_eq!(
        families,
        vec![
            (CompilerFamily::V3, "3.4.21".to_string()),
            (CompilerFamily::V2, "2.7.16".to_string())
        ]
    );
}

#[test]
fn test_shared_style_compiler_scopes_selectors() {
    for compiler in compilers() {
        let out = compiler.compile_style(&StyleCompileOptions {
            source: ".a { color: red }".to_string(),
            filename: "src/App.vue".to_string(),
            id: "data-v-1a2b3c4d".to_string(),
            scoped: true,
            modules: false,
            trim: true,
        });
        assert!(out.errors.is_empty());
        assert!(out.code.contains(".a[data-v-1a2b3c4d]"), "{}", out.code);
    }
}

#[test]
fn test_options_component_compiles_on_both_families() {
    let source = "<script>\nexport default {\n  data() { return { n: 1 } }\n}\n</script>\n<template><p>{{ n }}</p></template>";
    for compiler in compilers() {
        let descriptor = compiler.parse(source, "src/Counter.vue").descriptor;
        let script = compiler
            .compile_script(&descriptor, &ScriptCompileOptions::default())
            .unwrap();
        assert_eq!(
            script.bindings.as_ref().and_then(|b| b.get("n")),
            Some(&BindingType::Data)
        );
        let rewritten = compiler
            .rewrite_default(&script.content, COMP_IDENTIFIER, false)
            .unwrap();
        assert!(rewritten.contains("const __sfc__ = {"));
    }
}

#[test]
fn test_template_output_shapes_differ_by_family() {
    let options = TemplateCompileOptions {
        source: "<p>{{ n }}</p>".to_string(),
        filename: "src/Counter.vue".to_string(),
        id: "1a2b3c4d".to_string(),
        ..Default::default()
    };
    let kinds: Vec<TemplateCodeKind> = compilers()
        .iter()
        .map(|c| c.compile_template(&options).kind)
        .collect();
    assert_eq!(kinds, vec![TemplateCodeKind::RenderFunction, TemplateCodeKind::Attached]);
}
