//! Project State Coordinator
//!
//! Owns the file set, the active file, the loaded compiler and the error
//! list. Text edits arrive as events on a channel and are compiled when the
//! host flushes them; a version switch that crosses compiler families asks
//! the host for a full reload and suspends compilation until then.

use futures_util::future::{join_all, BoxFuture};
use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::config::{PlaygroundConfig, UserOptions, VersionKey, Versions};
use crate::dependency::gen_import_map;
use crate::diagnostics::{Diagnostic, E_LOAD, E_PROJECT};
use crate::import_map::{merge_import_map, ImportMap};
use crate::loader::{CompilerLoader, LoadError, LoadedCompiler};
use crate::pipeline::{compile_file, CompileContext, FileReport};
use crate::state_codec::{decode_state, encode_state, SerializedProject, StateCodecError};
use crate::templates::{opentiny_code, EMPTY_IMPORT_MAP, MAIN_CODE, TSCONFIG_CODE, WELCOME_CODE};
use crate::unit::SourceUnit;

pub const MAIN_FILE: &str = "src/PlaygroundMain.vue";
pub const APP_FILE: &str = "src/App.vue";
pub const OPENTINY_FILE: &str = "src/opentiny.js";
pub const IMPORT_MAP: &str = "import-map.json";
pub const TSCONFIG: &str = "tsconfig.json";
pub const LEGACY_IMPORT_MAP: &str = "src/import_map.json";

const UNDELETABLE: [&str; 5] = [MAIN_FILE, APP_FILE, OPENTINY_FILE, IMPORT_MAP, TSCONFIG];
const UNRENAMABLE: [&str; 4] = [APP_FILE, MAIN_FILE, OPENTINY_FILE, IMPORT_MAP];

// ═══════════════════════════════════════════════════════════════════════════════
// HOST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

/// The embedding environment: dialogs, notifications, reloads and storage.
pub trait Host: Send + Sync {
    fn confirm_delete<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, bool>;

    fn notify(&self, notice: Notice);

    /// Destroy and recreate the whole runtime context.
    fn reload(&self);

    fn persist_versions(&self, versions: &Versions);
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Could not rename \"{0}\", file not found")]
    RenameMissing(String),

    #[error("Cannot rename \"{old}\" to \"{new}\"")]
    RenameInvalid { old: String, new: String },

    #[error("Cannot rename {0}")]
    RenameProtected(String),

    #[error("Cannot rename \"{old}\", \"{new}\" already exists")]
    RenameExists { old: String, new: String },

    #[error("Cannot remove {0}")]
    DeleteProtected(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    State(#[from] StateCodecError),
}

#[derive(Debug, Clone, Default)]
pub struct Initial {
    pub serialized_state: Option<String>,
    pub versions: Option<Versions>,
    pub user_options: Option<UserOptions>,
}

/// A text change coming from the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub filename: String,
    pub code: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROJECT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Project {
    config: PlaygroundConfig,
    files: IndexMap<String, SourceUnit>,
    active: String,
    errors: Vec<Diagnostic>,
    versions: Versions,
    user_options: UserOptions,
    loader: CompilerLoader,
    compiler: Option<LoadedCompiler>,
    host: Arc<dyn Host>,
    edits_tx: UnboundedSender<FileEvent>,
    edits_rx: UnboundedReceiver<FileEvent>,
    /// Set by the first full compile; edits only trigger compiles from then on.
    watching: bool,
    reload_pending: bool,
}

impl Project {
    pub fn new(
        config: PlaygroundConfig,
        initial: Initial,
        loader: CompilerLoader,
        host: Arc<dyn Host>,
    ) -> Result<Self, ProjectError> {
        let versions = initial.versions.clone().unwrap_or_else(|| config.versions.clone());
        let mut user_options = initial.user_options.clone().unwrap_or_default();

        let mut files: IndexMap<String, SourceUnit> = IndexMap::new();
        match initial.serialized_state.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(text) => {
                let saved = decode_state(text)?;
                for (name, code) in saved.files {
                    let name = normalize_path(&name);
                    files.insert(name.clone(), SourceUnit::new(name, code));
                }
                user_options = saved.options;
            }
            None => {
                files.insert(APP_FILE.to_string(), SourceUnit::new(APP_FILE, WELCOME_CODE));
            }
        }

        let hide = !(config.show_hidden || user_options.show_hidden.unwrap_or(false));
        let main = SourceUnit {
            hidden: hide,
            ..SourceUnit::new(MAIN_FILE, MAIN_CODE)
        };
        files.insert(MAIN_FILE.to_string(), main);
        let style_url = user_options
            .style_source
            .clone()
            .unwrap_or_else(|| config.theme_style.clone());
        let bootstrap = SourceUnit {
            hidden: hide,
            ..SourceUnit::new(OPENTINY_FILE, opentiny_code(&style_url))
        };
        files.insert(OPENTINY_FILE.to_string(), bootstrap);
        if !files.contains_key(IMPORT_MAP) {
            files.insert(IMPORT_MAP.to_string(), SourceUnit::new(IMPORT_MAP, EMPTY_IMPORT_MAP));
        }
        if !files.contains_key(TSCONFIG) {
            files.insert(TSCONFIG.to_string(), SourceUnit::new(TSCONFIG, TSCONFIG_CODE));
        }

        let active = default_active(&files);

        let (edits_tx, edits_rx) = unbounded_channel();
        Ok(Project {
            config,
            files,
            active,
            errors: Vec::new(),
            versions,
            user_options,
            loader,
            compiler: None,
            host,
            edits_tx,
            edits_rx,
            watching: false,
            reload_pending: false,
        })
    }

    // ─── accessors ────────────────────────────────────────────────────────────

    pub fn files(&self) -> &IndexMap<String, SourceUnit> {
        &self.files
    }

    pub fn file(&self, filename: &str) -> Option<&SourceUnit> {
        self.files.get(filename)
    }

    pub fn active_file(&self) -> Option<&SourceUnit> {
        self.files.get(&self.active)
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn versions(&self) -> &Versions {
        &self.versions
    }

    pub fn user_options(&self) -> &UserOptions {
        &self.user_options
    }

    pub fn compiler(&self) -> Option<&LoadedCompiler> {
        self.compiler.as_ref()
    }

    pub fn runtime_url(&self) -> Option<&str> {
        self.compiler.as_ref().map(|c| c.runtime_url.as_str())
    }

    pub fn is_reload_pending(&self) -> bool {
        self.reload_pending
    }

    // ─── lifecycle ────────────────────────────────────────────────────────────

    /// Load the compiler, compile every file once and start reacting to edits.
    pub async fn init(&mut self) -> Result<(), ProjectError> {
        let version = self.versions.vue.clone();
        self.set_vue_version(&version).await
    }

    /// Errors accumulate across files. Edits compile from here on.
    async fn compile_all(&mut self) {
        if self.reload_pending {
            return;
        }
        self.errors.clear();
        let compiler = self.compiler.as_ref().map(|c| c.compiler.clone());
        let ctx = CompileContext::new(compiler.as_deref(), &self.config.options);
        let reports = join_all(self.files.values_mut().map(|unit| compile_file(&ctx, unit))).await;
        for report in reports {
            self.errors.extend(report.errors);
            self.errors.extend(report.shared);
        }
        self.watching = true;
        debug!(files = self.files.len(), errors = self.errors.len(), "project compiled");
    }

    async fn compile_unit(&mut self, filename: &str) -> Option<FileReport> {
        if self.reload_pending {
            return None;
        }
        let compiler = self.compiler.as_ref().map(|c| c.compiler.clone());
        let ctx = CompileContext::new(compiler.as_deref(), &self.config.options);
        let unit = self.files.get_mut(filename)?;
        Some(compile_file(&ctx, unit).await)
    }

    fn replace_errors(&mut self, report: FileReport) {
        self.errors = report.errors;
        self.errors.extend(report.shared);
    }

    fn project_error(&mut self, error: ProjectError, filename: &str) -> ProjectError {
        let code = if matches!(error, ProjectError::Load(_)) { E_LOAD } else { E_PROJECT };
        self.errors = vec![Diagnostic::new(code, error.to_string(), filename)];
        error
    }

    // ─── files ────────────────────────────────────────────────────────────────

    /// Hidden and unknown files cannot be activated.
    pub fn set_active(&mut self, filename: &str) -> bool {
        match self.files.get(filename) {
            Some(file) if !file.hidden => {
                self.active = filename.to_string();
                true
            }
            _ => false,
        }
    }

    /// Insert (or overwrite) a file and make it active.
    pub fn add_file(&mut self, unit: SourceUnit) {
        let filename = unit.filename.clone();
        self.files.insert(filename.clone(), unit);
        self.set_active(&filename);
    }

    pub async fn rename_file(&mut self, old: &str, new: &str) -> Result<(), ProjectError> {
        let Some(file) = self.files.get(old) else {
            return Err(self.project_error(ProjectError::RenameMissing(old.to_string()), old));
        };
        if new.is_empty() || old == new {
            let error = ProjectError::RenameInvalid {
                old: old.to_string(),
                new: new.to_string(),
            };
            return Err(self.project_error(error, old));
        }
        if file.hidden || UNRENAMABLE.contains(&old) {
            return Err(self.project_error(ProjectError::RenameProtected(old.to_string()), old));
        }
        if self.files.contains_key(new) {
            let error = ProjectError::RenameExists {
                old: old.to_string(),
                new: new.to_string(),
            };
            return Err(self.project_error(error, old));
        }

        let files = std::mem::take(&mut self.files);
        self.files = files
            .into_iter()
            .map(|(name, mut unit)| {
                if name == old {
                    unit.filename = new.to_string();
                    (new.to_string(), unit)
                } else {
                    (name, unit)
                }
            })
            .collect();
        if self.active == old {
            self.active = new.to_string();
        }

        if let Some(report) = self.compile_unit(new).await {
            self.replace_errors(report);
        }
        Ok(())
    }

    /// Returns whether the file was removed; declining the confirmation is not an error.
    pub async fn delete_file(&mut self, filename: &str) -> Result<bool, ProjectError> {
        if UNDELETABLE.contains(&filename) {
            self.host.notify(Notice {
                kind: NoticeKind::Warning,
                title: "Cannot remove".to_string(),
                message: "You cannot remove it, because OpenTiny requires it.".to_string(),
            });
            return Err(ProjectError::DeleteProtected(filename.to_string()));
        }
        if !self.files.contains_key(filename) {
            return Err(ProjectError::NotFound(filename.to_string()));
        }

        let host = self.host.clone();
        if !host.confirm_delete(filename).await {
            return Ok(false);
        }
        let short = filename.strip_prefix("src/").unwrap_or(filename);
        host.notify(Notice {
            kind: NoticeKind::Success,
            title: format!("Delete {}", short),
            message: "Deleted successfully".to_string(),
        });
        self.files.shift_remove(filename);
        if self.active == filename {
            self.active = default_active(&self.files);
        }
        Ok(true)
    }

    // ─── edits ────────────────────────────────────────────────────────────────

    /// Sender side of the edit channel, for editors living elsewhere.
    pub fn edit_sender(&self) -> UnboundedSender<FileEvent> {
        self.edits_tx.clone()
    }

    pub fn update_file(&self, filename: &str, code: impl Into<String>) {
        let event = FileEvent {
            filename: filename.to_string(),
            code: code.into(),
        };
        if self.edits_tx.send(event).is_err() {
            warn!(file = filename, "edit channel closed");
        }
    }

    /// Apply queued edits, last write per file wins, and recompile the
    /// active file if it changed. Returns whether a compile ran.
    pub async fn flush_edits(&mut self) -> bool {
        let mut latest: IndexMap<String, String> = IndexMap::new();
        while let Ok(event) = self.edits_rx.try_recv() {
            latest.insert(event.filename, event.code);
        }
        if latest.is_empty() {
            return false;
        }

        let mut active_changed = false;
        for (filename, code) in latest {
            if let Some(unit) = self.files.get_mut(&filename) {
                unit.code = code;
                active_changed |= filename == self.active;
            }
        }
        if !active_changed || !self.watching {
            return false;
        }
        let active = self.active.clone();
        match self.compile_unit(&active).await {
            Some(report) => {
                self.replace_errors(report);
                true
            }
            None => false,
        }
    }

    // ─── versions ─────────────────────────────────────────────────────────────

    pub async fn set_version(&mut self, key: VersionKey, version: &str) -> Result<(), ProjectError> {
        match key {
            VersionKey::Vue => self.set_vue_version(version).await,
            VersionKey::OpenTiny => {
                self.set_opentiny_version(version).await;
                Ok(())
            }
        }
    }

    async fn set_vue_version(&mut self, version: &str) -> Result<(), ProjectError> {
        let loaded = match self.loader.load(version).await {
            Ok(loaded) => loaded,
            Err(e) => return Err(self.project_error(e.into(), APP_FILE)),
        };
        let crosses_family = self
            .compiler
            .as_ref()
            .is_some_and(|current| current.family != loaded.family);

        self.compiler = Some(loaded);
        self.versions.vue = version.to_string();
        self.host.persist_versions(&self.versions);
        info!("Now using Vue version: {}", version);

        if crosses_family && !self.reload_pending {
            self.reload_pending = true;
            self.host.reload();
        }
        self.compile_all().await;
        Ok(())
    }

    async fn set_opentiny_version(&mut self, version: &str) {
        self.versions.open_tiny = version.to_string();
        self.host.persist_versions(&self.versions);

        let style_url = self
            .user_options
            .style_source
            .clone()
            .unwrap_or_else(|| self.config.theme_style.clone());
        let hidden = self.files.get(OPENTINY_FILE).map(|f| f.hidden).unwrap_or(true);
        let unit = SourceUnit {
            hidden,
            ..SourceUnit::new(OPENTINY_FILE, opentiny_code(&style_url))
        };
        self.files.insert(OPENTINY_FILE.to_string(), unit);
        if let Some(report) = self.compile_unit(OPENTINY_FILE).await {
            self.replace_errors(report);
        }
    }

    // ─── derived views ────────────────────────────────────────────────────────

    /// Generated map with the user's `import-map.json` entries on top.
    pub fn import_map(&self) -> ImportMap {
        let generated = gen_import_map(self.loader.cdn(), &self.versions);
        let user = self
            .files
            .get(IMPORT_MAP)
            .map(|f| ImportMap::parse_user(&f.code))
            .unwrap_or_default();
        merge_import_map(&generated, &user)
    }

    pub fn tsconfig(&self) -> serde_json::Value {
        self.files
            .get(TSCONFIG)
            .and_then(|f| serde_json::from_str(&f.code).ok())
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Visible files and user options, encoded for a URL fragment.
    pub fn serialize(&self) -> Result<String, ProjectError> {
        let project = SerializedProject {
            files: self
                .files
                .values()
                .filter(|f| !f.hidden)
                .map(|f| (f.filename.clone(), f.code.clone()))
                .collect(),
            options: self.user_options.clone(),
        };
        Ok(encode_state(&project)?)
    }
}

/// App.vue when present, else the first visible file. The hidden main file
/// is never deletable, so the result is always a member of `files`.
fn default_active(files: &IndexMap<String, SourceUnit>) -> String {
    if files.contains_key(APP_FILE) {
        return APP_FILE.to_string();
    }
    files
        .values()
        .find(|f| !f.hidden)
        .map(|f| f.filename.clone())
        .unwrap_or_else(|| MAIN_FILE.to_string())
}

/// Saved paths are relative to `src/`; the import map and tsconfig live at the root.
fn normalize_path(name: &str) -> String {
    let name = if name == IMPORT_MAP || name == TSCONFIG || name.starts_with("src/") {
        name.to_string()
    } else {
        format!("src/{}", name)
    };
    if name == LEGACY_IMPORT_MAP {
        IMPORT_MAP.to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("App.vue"), "src/App.vue");
        assert_eq!(normalize_path("src/Comp.vue"), "src/Comp.vue");
        assert_eq!(normalize_path("import-map.json"), "import-map.json");
        assert_eq!(normalize_path("import_map.json"), "import-map.json");
        assert_eq!(normalize_path("src/import_map.json"), "import-map.json");
    }
}
