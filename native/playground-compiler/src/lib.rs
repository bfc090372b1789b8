//! # Playground Compiler
//!
//! Compilation engine of an in-browser Vue SFC playground.
//!
//! ## Layers
//!
//! 1. **Version Resolver** (`version`): classifies a Vue version into the v2 or
//!    v3 compiler family and filters CDN version lists.
//!
//! 2. **Dynamic Compiler Loader** (`loader`): resolves version-pinned compiler
//!    and runtime URLs on the configured CDN and hands back the matching
//!    `SfcCompiler`.
//!
//! 3. **Source Unit Model** (`unit`): one virtual file and its compiled
//!    `js`/`ssr`/`css` artifacts.
//!
//! 4. **Per-File Compilation Pipeline** (`pipeline`): routes a file by kind.
//!    Components go through parse, validation, script, template and style
//!    compilation and end up as an ES module whose default export is
//!    `__sfc__`.
//!
//! 5. **Import Map Composer** (`dependency`, `import_map`): generated CDN
//!    entries merged with the user's `import-map.json`.
//!
//! 6. **Project State Coordinator** (`project`): file set, active file,
//!    edit events, version switches and serialized state.
//!
//! ## Invariants
//!
//! - A failed compile never leaves partially written artifacts.
//! - Blank files compile to nothing and report nothing.
//! - Switching between compiler families requests exactly one full reload;
//!   compilation is suspended until it happens.

#[cfg(feature = "napi")]
mod bridge;

pub mod compiler;
pub mod config;
pub mod dependency;
pub mod diagnostics;
pub mod import_map;
pub mod imports;
pub mod loader;
pub mod pipeline;
pub mod preprocess;
pub mod project;
pub mod state_codec;
pub mod templates;
pub mod transform;
pub mod unit;
pub mod version;

#[cfg(test)]
mod project_tests;

#[cfg(feature = "napi")]
pub use bridge::{compile_file_native, is_major_v3_native, merge_import_map_native};

pub use compiler::{SfcCompiler, V2Compiler, V3Compiler};
pub use config::{Cdn, PlaygroundConfig, ReplOptions, UserOptions, VersionKey, Versions};
pub use diagnostics::Diagnostic;
pub use import_map::{merge_import_map, ImportMap};
pub use loader::{CompilerLoader, HttpFetcher, LoadError, LoadedCompiler, ModuleFetcher};
pub use pipeline::{compile_file, CompileContext, FileReport};
pub use project::{Host, Initial, Notice, NoticeKind, Project, ProjectError};
pub use unit::{CompiledArtifacts, SourceKind, SourceUnit};
pub use version::{is_major_v3, CompilerFamily};
