//! Native compiler for the 3.x framework family.

use super::render::{generate_render, RenderOptions, RENDER_PARAMS};
use super::sfc_parse::parse_sfc;
use super::ssr::{generate_ssr_render, SSR_RENDER_PARAMS};
use super::template::parse_template;
use super::{
    script, style, CompiledScript, ParseOutput, ScriptCompileError, ScriptCompileOptions,
    SfcCompiler, SfcDescriptor, StyleCompileOptions, StyleOutput, TemplateCodeKind,
    TemplateCompileOptions, TemplateOutput,
};
use crate::diagnostics::{Diagnostic, E_TEMPLATE_COMPILE};
use crate::version::CompilerFamily;

#[derive(Debug, Clone)]
pub struct V3Compiler {
    version: String,
}

impl V3Compiler {
    pub fn new(version: impl Into<String>) -> Self {
        V3Compiler {
            version: version.into(),
        }
    }
}

impl SfcCompiler for V3Compiler {
    fn family(&self) -> CompilerFamily {
        CompilerFamily::V3
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn parse(&self, source: &str, filename: &str) -> ParseOutput {
        parse_sfc(source, filename)
    }

    fn compile_script(
        &self,
        descriptor: &SfcDescriptor,
        options: &ScriptCompileOptions,
    ) -> Result<CompiledScript, ScriptCompileError> {
        script::compile_script(descriptor, options)
    }

    fn compile_template(&self, options: &TemplateCompileOptions) -> TemplateOutput {
        let ast = parse_template(&options.source);
        let to_diagnostic = |message: &str, offset: usize| {
            Diagnostic::new(E_TEMPLATE_COMPILE, message, &options.filename)
                .with_offset(&options.source, offset)
        };
        if !ast.errors.is_empty() {
            return TemplateOutput {
                code: String::new(),
                kind: TemplateCodeKind::RenderFunction,
                errors: ast.errors.iter().map(|e| to_diagnostic(&e.message, e.offset)).collect(),
                notices: Vec::new(),
            };
        }

        let render_options = RenderOptions {
            bindings: options.binding_metadata.as_ref(),
            inline: false,
            custom_elements: options.custom_elements.clone(),
            is_prod: options.is_prod,
            scope_id: (options.scoped && options.ssr).then(|| format!("data-v-{}", options.id)),
        };
        let generated = if options.ssr {
            generate_ssr_render(&ast, &render_options)
                .map(|r| r.into_module("ssrRender", SSR_RENDER_PARAMS))
        } else {
            generate_render(&ast, &render_options).map(|r| r.into_module("render", RENDER_PARAMS))
        };

        match generated {
            Ok(code) => TemplateOutput {
                code,
                kind: TemplateCodeKind::RenderFunction,
                errors: Vec::new(),
                notices: Vec::new(),
            },
            Err(errors) => TemplateOutput {
                code: String::new(),
                kind: TemplateCodeKind::RenderFunction,
                errors: errors.iter().map(|e| to_diagnostic(&e.message, e.offset)).collect(),
                notices: Vec::new(),
            },
        }
    }

    fn compile_style(&self, options: &StyleCompileOptions) -> StyleOutput {
        style::compile_style(options)
    }

    fn rewrite_default(
        &self,
        source: &str,
        as_name: &str,
        is_ts: bool,
    ) -> Result<String, ScriptCompileError> {
        script::rewrite_default(source, as_name, is_ts)
    }
}
