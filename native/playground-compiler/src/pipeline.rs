//! Per-file compilation pipeline
//!
//! Routes a `SourceUnit` by kind and writes its compiled artifacts. File
//! errors are returned; errors that belong to the whole project (style
//! failures, preprocessor failures, compiler notices) travel separately in
//! `FileReport::shared`. Artifacts are replaced in one assignment at the end
//! of a successful route, so a failed compile never leaves them half written.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::compiler::{
    BindingMetadata, ScriptCompileError, ScriptCompileOptions, SfcCompiler, SfcDescriptor,
    StyleCompileOptions, TemplateCodeKind, TemplateCompileOptions, COMP_IDENTIFIER,
};
use crate::config::ReplOptions;
use crate::diagnostics::{
    Diagnostic, E_JSON_PARSE, E_PREPROCESS, E_SCRIPT_COMPILE, E_SCRIPT_LANG, E_STYLE_COMPILE,
    E_STYLE_MODULE, E_TRANSFORM, E_UNSUPPORTED_LANG,
};
use crate::imports::VueImports;
use crate::preprocess::{LessPreprocessor, StylePreprocessor};
use crate::transform::{
    should_transform_ref, transform_ref, OxcTransformer, ScriptTransformOptions, ScriptTransformer,
};
use crate::unit::{CompiledArtifacts, SourceKind, SourceUnit};

lazy_static! {
    static ref RENDER_EXPORT_RE: Regex = Regex::new(r"\nexport (function|const) (render|ssrRender)").unwrap();
}

/// Lines of a script compile error kept in the report.
const MAX_ERROR_LINES: usize = 12;

pub const NO_STYLE_PLACEHOLDER: &str = "/* No <style> tags present */";

pub struct CompileContext<'a> {
    /// `None` until the loader has produced a compiler; components are
    /// skipped until then.
    pub compiler: Option<&'a dyn SfcCompiler>,
    pub options: &'a ReplOptions,
    pub transformer: &'a dyn ScriptTransformer,
    pub preprocessor: &'a dyn StylePreprocessor,
}

impl<'a> CompileContext<'a> {
    pub fn new(compiler: Option<&'a dyn SfcCompiler>, options: &'a ReplOptions) -> Self {
        CompileContext {
            compiler,
            options,
            transformer: &OxcTransformer,
            preprocessor: &LessPreprocessor,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    /// Errors of this file. Empty means success.
    pub errors: Vec<Diagnostic>,
    /// Errors to be written into the project-wide error list.
    pub shared: Vec<Diagnostic>,
}

impl FileReport {
    fn failed(errors: Vec<Diagnostic>, shared: Vec<Diagnostic>) -> Self {
        FileReport { errors, shared }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// `data-v-` scope token: the first 8 hex chars of SHA-256 over the path.
pub fn scope_id(filename: &str) -> String {
    Sha256::digest(filename.as_bytes())
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub async fn compile_file(ctx: &CompileContext<'_>, unit: &mut SourceUnit) -> FileReport {
    if unit.code.trim().is_empty() {
        return FileReport::default();
    }
    debug!(file = %unit.filename, "compiling");

    match unit.kind() {
        SourceKind::Css => {
            unit.compiled.css = Some(unit.code.clone());
            FileReport::default()
        }
        SourceKind::Less => match ctx.preprocessor.render(&unit.code) {
            Ok(out) => {
                unit.compiled.css = Some(out.css);
                FileReport::default()
            }
            Err(e) => FileReport::failed(
                Vec::new(),
                vec![Diagnostic::new(E_PREPROCESS, e.to_string(), &unit.filename)],
            ),
        },
        SourceKind::Script { typescript } => match compile_plain_script(ctx, unit, typescript) {
            Ok(code) => {
                unit.compiled.js = Some(code.clone());
                unit.compiled.ssr = Some(code);
                FileReport::default()
            }
            Err(errors) => FileReport::failed(errors, Vec::new()),
        },
        SourceKind::Json => match serde_json::from_str::<serde_json::Value>(&unit.code) {
            Ok(value) => {
                let code = format!("export default {}", value);
                unit.compiled.js = Some(code.clone());
                unit.compiled.ssr = Some(code);
                FileReport::default()
            }
            Err(e) => {
                warn!(file = %unit.filename, error = %e, "invalid JSON");
                FileReport::failed(
                    vec![Diagnostic::at(
                        E_JSON_PARSE,
                        e.to_string(),
                        &unit.filename,
                        e.line() as u32,
                        e.column() as u32,
                    )],
                    Vec::new(),
                )
            }
        },
        SourceKind::Unsupported => FileReport::default(),
        SourceKind::Component => {
            let Some(compiler) = ctx.compiler else {
                debug!(file = %unit.filename, "no compiler loaded yet, deferring");
                return FileReport::default();
            };
            let mut shared = Vec::new();
            match compile_component(ctx, compiler, unit, &mut shared) {
                Ok(artifacts) => {
                    unit.compiled = artifacts;
                    FileReport::failed(Vec::new(), shared)
                }
                Err(errors) => FileReport::failed(errors, shared),
            }
        }
    }
}

fn compile_plain_script(
    ctx: &CompileContext<'_>,
    unit: &SourceUnit,
    typescript: bool,
) -> Result<String, Vec<Diagnostic>> {
    let to_diagnostics = |errors: Vec<String>| {
        errors
            .into_iter()
            .map(|e| Diagnostic::new(E_TRANSFORM, e, &unit.filename))
            .collect::<Vec<_>>()
    };
    let mut code = unit.code.clone();
    if should_transform_ref(&code) {
        code = transform_ref(&code, &unit.filename).map_err(to_diagnostics)?;
    }
    if typescript {
        let options = ScriptTransformOptions {
            filename: unit.filename.clone(),
            typescript: true,
            jsx: false,
        };
        code = ctx
            .transformer
            .transform(&code, &options)
            .map_err(to_diagnostics)?
            .code;
    }
    Ok(code)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Script language of a component, after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScriptLang {
    typescript: bool,
    jsx: bool,
}

impl ScriptLang {
    fn needs_transform(self) -> bool {
        self.typescript || self.jsx
    }
}

fn compile_component(
    ctx: &CompileContext<'_>,
    compiler: &dyn SfcCompiler,
    unit: &SourceUnit,
    shared: &mut Vec<Diagnostic>,
) -> Result<CompiledArtifacts, Vec<Diagnostic>> {
    let filename = unit.filename.as_str();
    let parsed = compiler.parse(&unit.code, filename);
    if !parsed.errors.is_empty() {
        return Err(parsed.errors);
    }
    let descriptor = parsed.descriptor;

    let unsupported = descriptor
        .styles
        .iter()
        .filter_map(|s| s.block.lang.as_deref())
        .find(|lang| !matches!(*lang, "css" | "less"))
        .or_else(|| descriptor.template.as_ref().and_then(|t| t.lang.as_deref()));
    if let Some(lang) = unsupported {
        return Err(vec![Diagnostic::new(
            E_UNSUPPORTED_LANG,
            format!(
                "lang=\"{}\" pre-processors for <template> or <style> are currently not supported.",
                lang
            ),
            filename,
        )]);
    }

    let lang = match descriptor
        .script
        .as_ref()
        .or(descriptor.script_setup.as_ref())
        .and_then(|s| s.lang.as_deref())
    {
        None => ScriptLang { typescript: false, jsx: false },
        Some("ts") => ScriptLang { typescript: true, jsx: false },
        Some("tsx") => ScriptLang { typescript: true, jsx: true },
        Some("jsx") => ScriptLang { typescript: false, jsx: true },
        Some(_) => {
            return Err(vec![Diagnostic::new(
                E_SCRIPT_LANG,
                "Only lang=\"ts\" is supported for <script> blocks.",
                filename,
            )])
        }
    };

    if descriptor.styles.iter().any(|s| s.module.is_some()) {
        return Err(vec![Diagnostic::new(
            E_STYLE_MODULE,
            "<style module> is not supported in the playground.",
            filename,
        )]);
    }

    let id = scope_id(filename);
    let has_scoped = descriptor.has_scoped_style();

    let (mut client_code, bindings) =
        compile_script_block(ctx, compiler, &descriptor, &id, false, lang, shared)
            .map_err(|e| vec![script_error(&e, filename)])?;

    let mut ssr_code = if descriptor.script_setup.is_some() || !descriptor.css_vars.is_empty() {
        let mut ignored = Vec::new();
        match compile_script_block(ctx, compiler, &descriptor, &id, true, lang, &mut ignored) {
            Ok((code, _)) => code,
            Err(e) => format!("\n/* SSR compile error: {} */", e.message),
        }
    } else {
        client_code.clone()
    };

    if let Some(template) = &descriptor.template {
        if descriptor.script_setup.is_none() || !ctx.options.script.inline_template {
            let compile = |ssr: bool, sink: &mut Vec<Diagnostic>| {
                let out = compiler.compile_template(&TemplateCompileOptions {
                    source: template.content.clone(),
                    filename: filename.to_string(),
                    id: id.clone(),
                    scoped: has_scoped,
                    ssr,
                    is_prod: ctx.options.template.is_prod,
                    binding_metadata: bindings.clone(),
                    custom_elements: ctx.options.template.custom_elements.clone(),
                });
                sink.extend(out.notices);
                if !out.errors.is_empty() {
                    return Err(out.errors);
                }
                Ok(match out.kind {
                    TemplateCodeKind::RenderFunction => {
                        let name = if ssr { "ssrRender" } else { "render" };
                        format!(
                            "\n{}\n{}.{} = {}",
                            RENDER_EXPORT_RE.replace(&out.code, format!("$1 {}", name).as_str()),
                            COMP_IDENTIFIER,
                            name,
                            name
                        )
                    }
                    TemplateCodeKind::Attached => out.code,
                })
            };

            client_code.push_str(&compile(false, shared)?);
            let mut ignored = Vec::new();
            match compile(true, &mut ignored) {
                Ok(code) => ssr_code.push_str(&code),
                Err(errors) => {
                    let message = errors.first().map(|e| e.message.as_str()).unwrap_or_default();
                    ssr_code.push_str(&format!("\n/* SSR compile error: {} */", message));
                }
            }
        }
    }

    let mut tail = String::new();
    if has_scoped {
        tail.push_str(&format!("\n{}.__scopeId = \"data-v-{}\"", COMP_IDENTIFIER, id));
    }
    tail.push_str(&format!(
        "\n{}.__file = {}",
        COMP_IDENTIFIER,
        serde_json::Value::from(filename)
    ));
    tail.push_str(&format!("\nexport default {}", COMP_IDENTIFIER));
    client_code.push_str(&tail);
    ssr_code.push_str(&tail);

    let css = compile_styles(ctx, compiler, &descriptor, &id, shared);

    Ok(CompiledArtifacts {
        js: Some(hoist_vue_imports(&client_code)),
        ssr: Some(hoist_vue_imports(&ssr_code)),
        css: Some(css),
    })
}

fn script_error(error: &ScriptCompileError, filename: &str) -> Diagnostic {
    let text = error.to_string();
    let truncated: Vec<&str> = text.lines().take(MAX_ERROR_LINES).collect();
    Diagnostic::new(E_SCRIPT_COMPILE, truncated.join("\n"), filename)
}

/// Compile, rewrite the default export to `__sfc__` and erase types.
fn compile_script_block(
    ctx: &CompileContext<'_>,
    compiler: &dyn SfcCompiler,
    descriptor: &SfcDescriptor,
    id: &str,
    ssr: bool,
    lang: ScriptLang,
    shared: &mut Vec<Diagnostic>,
) -> Result<(String, Option<BindingMetadata>), ScriptCompileError> {
    if descriptor.script.is_none() && descriptor.script_setup.is_none() {
        return Ok((format!("\nconst {} = {{}}", COMP_IDENTIFIER), None));
    }

    let compiled = compiler.compile_script(
        descriptor,
        &ScriptCompileOptions {
            id: id.to_string(),
            is_ts: lang.typescript,
            inline_template: ctx.options.script.inline_template,
            ssr,
            is_prod: ctx.options.template.is_prod,
            custom_elements: ctx.options.template.custom_elements.clone(),
        },
    )?;
    shared.extend(compiled.notices);

    let mut code = String::new();
    if let Some(bindings) = &compiled.bindings {
        let pretty = serde_json::to_string_pretty(bindings).unwrap_or_default();
        code.push_str(&format!("\n/* Analyzed bindings: {} */", pretty));
    }
    code.push('\n');
    code.push_str(&compiler.rewrite_default(&compiled.content, COMP_IDENTIFIER, lang.typescript)?);

    if lang.needs_transform() {
        let options = ScriptTransformOptions {
            filename: descriptor.filename.clone(),
            typescript: lang.typescript,
            jsx: lang.jsx,
        };
        code = ctx
            .transformer
            .transform(&code, &options)
            .map_err(|errors| ScriptCompileError::new(errors.join("\n")))?
            .code;
    }
    Ok((code, compiled.bindings))
}

/// Merge every named `vue` import into one statement at the top.
fn hoist_vue_imports(code: &str) -> String {
    let mut imports = VueImports::new();
    let rest = imports.extract(code);
    if imports.is_empty() {
        return code.to_string();
    }
    format!("{}\n{}", imports.to_statement(), rest)
}

fn compile_styles(
    ctx: &CompileContext<'_>,
    compiler: &dyn SfcCompiler,
    descriptor: &SfcDescriptor,
    id: &str,
    shared: &mut Vec<Diagnostic>,
) -> String {
    let filename = descriptor.filename.as_str();
    let mut css = String::new();
    for style in &descriptor.styles {
        let source = if style.block.lang.as_deref() == Some("less") {
            match ctx.preprocessor.render(&style.block.content) {
                Ok(out) => out.css,
                Err(e) => {
                    shared.push(Diagnostic::new(E_PREPROCESS, e.to_string(), filename));
                    continue;
                }
            }
        } else {
            style.block.content.clone()
        };

        let out = compiler.compile_style(&StyleCompileOptions {
            source: source.clone(),
            filename: filename.to_string(),
            id: format!("data-v-{}", id),
            scoped: style.scoped,
            modules: false,
            trim: ctx.options.style.trim,
        });
        let (benign, errors): (Vec<_>, Vec<_>) = out.errors.into_iter().partition(|e| e.is_benign());
        for error in &benign {
            debug!(file = %filename, message = %error.message, "skipping benign style error");
        }
        if errors.is_empty() {
            css.push_str(&out.code);
            css.push('\n');
            continue;
        }
        for error in errors {
            shared.push(
                Diagnostic::new(E_STYLE_COMPILE, error.message, filename)
                    .with_offset(&source, error.offset),
            );
        }
    }

    let css = css.trim();
    if css.is_empty() {
        NO_STYLE_PLACEHOLDER.to_string()
    } else {
        css.to_string()
    }
}
