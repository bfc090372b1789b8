//! Node bindings. Compiled only with the `napi` feature.

use napi_derive::napi;
use serde_json::json;

use crate::compiler::{SfcCompiler, V2Compiler, V3Compiler};
use crate::config::ReplOptions;
use crate::import_map::{merge_import_map, ImportMap};
use crate::pipeline::{compile_file, CompileContext};
use crate::unit::SourceUnit;
use crate::version::{is_major_v3, CompilerFamily};

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Compile one file with the native compiler of `version`'s family.
/// Returns `{ compiled, errors, shared }`.
#[napi]
pub async fn compile_file_native(
    version: String,
    filename: String,
    code: String,
    options_json: Option<String>,
) -> napi::Result<serde_json::Value> {
    let options: ReplOptions = match options_json.as_deref() {
        Some(text) => serde_json::from_str(text).map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => ReplOptions::default(),
    };
    let compiler: Box<dyn SfcCompiler> = match CompilerFamily::of(&version) {
        CompilerFamily::V3 => Box::new(V3Compiler::new(&version)),
        CompilerFamily::V2 => Box::new(V2Compiler::new(&version)),
    };

    let ctx = CompileContext::new(Some(compiler.as_ref()), &options);
    let mut unit = SourceUnit::new(filename, code);
    let report = compile_file(&ctx, &mut unit).await;
    Ok(json!({
        "compiled": unit.compiled,
        "errors": report.errors,
        "shared": report.shared,
    }))
}

#[napi]
pub fn is_major_v3_native(version: String) -> bool {
    is_major_v3(&version)
}

/// Both arguments are import-map JSON texts; malformed input counts as empty.
#[napi]
pub fn merge_import_map_native(generated: String, user: String) -> napi::Result<serde_json::Value> {
    let merged = merge_import_map(&ImportMap::parse_user(&generated), &ImportMap::parse_user(&user));
    serde_json::to_value(merged).map_err(|e| napi::Error::from_reason(e.to_string()))
}
