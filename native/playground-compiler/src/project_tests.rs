use crate::config::{PlaygroundConfig, UserOptions, VersionKey, Versions};
use crate::diagnostics::E_LOAD;
use crate::loader::testing::FakeFetcher;
use crate::loader::CompilerLoader;
use crate::project::*;
use crate::unit::SourceUnit;
use crate::version::CompilerFamily;
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeHost {
    decline: bool,
    notices: Mutex<Vec<Notice>>,
    reloads: AtomicUsize,
    persisted: Mutex<Vec<Versions>>,
}

impl Host for FakeHost {
    fn confirm_delete<'a>(&'a self, _filename: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move { !self.decline })
    }

    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }

    fn persist_versions(&self, versions: &Versions) {
        self.persisted.lock().unwrap().push(versions.clone());
    }
}

fn project_with(host: Arc<FakeHost>, fetcher: FakeFetcher, initial: Initial) -> Project {
    let config = PlaygroundConfig::default();
    let loader = CompilerLoader::new(config.cdn.clone(), Arc::new(fetcher));
    Project::new(config, initial, loader, host).unwrap()
}

fn fresh(host: Arc<FakeHost>) -> Project {
    project_with(host, FakeFetcher::default(), Initial::default())
}

const COMP: &str = "<template><p>comp</p></template>";

fn saved_state(files: &[(&str, &str)]) -> Initial {
    let mut saved = crate::state_codec::SerializedProject::default();
    for (name, code) in files {
        saved.files.insert(name.to_string(), code.to_string());
    }
    Initial {
        serialized_state: Some(crate::state_codec::encode_state(&saved).unwrap()),
        ..Default::default()
    }
}

#[test]
fn test_fresh_project_layout() {
    let project = fresh(Arc::new(FakeHost::default()));
    let names: Vec<&str> = project.files().keys().map(String::as_str).collect();
    assert_eq!(names, vec![APP_FILE, MAIN_FILE, OPENTINY_FILE, IMPORT_MAP, TSCONFIG]);
    assert_eq!(project.active_file().unwrap().filename, APP_FILE);
    assert!(project.file(MAIN_FILE).unwrap().hidden);
    assert!(project.file(OPENTINY_FILE).unwrap().hidden);
    assert!(project
        .file(OPENTINY_FILE)
        .unwrap()
        .code
        .contains(&PlaygroundConfig::default().theme_style));
    assert!(project.compiler().is_none());
}

#[test]
fn test_hidden_files_cannot_be_activated() {
    let mut project = fresh(Arc::new(FakeHost::default()));
    assert!(!project.set_active(MAIN_FILE));
    assert!(!project.set_active("src/Missing.vue"));
    assert!(project.set_active(TSCONFIG));
    assert_eq!(project.active_file().unwrap().filename, TSCONFIG);
}

#[tokio::test]
async fn test_init_loads_compiler_and_compiles_everything() {
    let host = Arc::new(FakeHost::default());
    let mut project = fresh(host.clone());
    project.init().await.unwrap();

    let loaded = project.compiler().unwrap();
    assert_eq!(loaded.family, CompilerFamily::V3);
    assert_eq!(loaded.version, "3.4.21");
    assert!(project.file(OPENTINY_FILE).unwrap().compiled.js.is_some());
    assert!(project.file(IMPORT_MAP).unwrap().compiled.js.is_some());
    assert_eq!(host.persisted.lock().unwrap().len(), 1);
    assert_eq!(host.reloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rename_preserves_order_and_active() {
    let mut project = fresh(Arc::new(FakeHost::default()));
    project.add_file(SourceUnit::new("src/Comp.vue", COMP));
    project.add_file(SourceUnit::new("src/util.js", "export const x = 1"));
    project.set_active("src/Comp.vue");

    project.rename_file("src/Comp.vue", "src/Card.vue").await.unwrap();

    let names: Vec<&str> = project.files().keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec![APP_FILE, MAIN_FILE, OPENTINY_FILE, IMPORT_MAP, TSCONFIG, "src/Card.vue", "src/util.js"]
    );
    let active = project.active_file().unwrap();
    assert_eq!(active.filename, "src/Card.vue");
    assert_eq!(active.code, COMP);
}

#[tokio::test]
async fn test_rename_keeps_compiled_output() {
    let mut project = fresh(Arc::new(FakeHost::default()));
    project.init().await.unwrap();
    project.add_file(SourceUnit::new("src/util.js", "export const a = 1"));
    project.update_file("src/util.js", "export const a = 2");
    assert!(project.flush_edits().await);
    let compiled = project.file("src/util.js").unwrap().compiled.clone();

    project.rename_file("src/util.js", "src/helpers.js").await.unwrap();
    assert_eq!(project.file("src/helpers.js").unwrap().compiled, compiled);
    assert!(project.file("src/util.js").is_none());
}

#[tokio::test]
async fn test_rename_rejections() {
    let mut project = fresh(Arc::new(FakeHost::default()));
    project.add_file(SourceUnit::new("src/Comp.vue", COMP));

    let err = project.rename_file("src/Nope.vue", "src/X.vue").await.unwrap_err();
    assert!(matches!(err, ProjectError::RenameMissing(_)));
    assert_eq!(err.to_string(), "Could not rename \"src/Nope.vue\", file not found");
    assert_eq!(project.errors().len(), 1);

    let err = project.rename_file("src/Comp.vue", "").await.unwrap_err();
    assert!(matches!(err, ProjectError::RenameInvalid { .. }));

    project.add_file(SourceUnit::new("src/Card.vue", "<template><p>card</p></template>"));
    let err = project.rename_file("src/Comp.vue", "src/Card.vue").await.unwrap_err();
    assert!(matches!(err, ProjectError::RenameExists { .. }));
    assert_eq!(project.file("src/Comp.vue").unwrap().code, COMP);
    assert_eq!(project.file("src/Card.vue").unwrap().code, "<template><p>card</p></template>");

    let err = project.rename_file(APP_FILE, "src/Main.vue").await.unwrap_err();
    assert_eq!(err.to_string(), "Cannot rename src/App.vue");
    assert!(project.file(APP_FILE).is_some());
}

#[tokio::test]
async fn test_protected_delete_warns() {
    let host = Arc::new(FakeHost::default());
    let mut project = fresh(host.clone());

    let before: Vec<String> = project.files().keys().cloned().collect();
    for protected in [MAIN_FILE, APP_FILE, OPENTINY_FILE, IMPORT_MAP, TSCONFIG] {
        let err = project.delete_file(protected).await.unwrap_err();
        assert!(matches!(err, ProjectError::DeleteProtected(_)));
    }
    let after: Vec<String> = project.files().keys().cloned().collect();
    assert_eq!(before, after);

    let notices = host.notices.lock().unwrap();
    assert_eq!(notices.len(), 5);
    assert_eq!(notices[0].kind, NoticeKind::Warning);
    assert_eq!(notices[0].title, "Cannot remove");
}

#[tokio::test]
async fn test_delete_confirmed_falls_back_to_app() {
    let host = Arc::new(FakeHost::default());
    let mut project = fresh(host.clone());
    project.add_file(SourceUnit::new("src/Comp.vue", COMP));
    assert_eq!(project.active_file().unwrap().filename, "src/Comp.vue");

    assert!(project.delete_file("src/Comp.vue").await.unwrap());
    assert!(project.file("src/Comp.vue").is_none());
    assert_eq!(project.active_file().unwrap().filename, APP_FILE);
    let notices = host.notices.lock().unwrap();
    assert_eq!(notices[0].kind, NoticeKind::Success);
    assert_eq!(notices[0].title, "Delete Comp.vue");
}

#[tokio::test]
async fn test_delete_without_app_activates_first_visible_file() {
    let mut project = project_with(
        Arc::new(FakeHost::default()),
        FakeFetcher::default(),
        saved_state(&[("Comp.vue", COMP)]),
    );
    assert!(project.file(APP_FILE).is_none());
    assert_eq!(project.active_file().unwrap().filename, "src/Comp.vue");

    assert!(project.delete_file("src/Comp.vue").await.unwrap());
    let active = project.active_file().unwrap();
    assert_eq!(active.filename, IMPORT_MAP);
    assert!(!active.hidden);
}

#[tokio::test]
async fn test_delete_declined_keeps_file() {
    let host = Arc::new(FakeHost {
        decline: true,
        ..Default::default()
    });
    let mut project = fresh(host);
    project.add_file(SourceUnit::new("src/Comp.vue", COMP));
    assert!(!project.delete_file("src/Comp.vue").await.unwrap());
    assert!(project.file("src/Comp.vue").is_some());
}

#[tokio::test]
async fn test_family_switch_reloads_once_and_suspends() {
    let host = Arc::new(FakeHost::default());
    let mut project = fresh(host.clone());
    project.init().await.unwrap();

    project.set_version(VersionKey::Vue, "2.6.14").await.unwrap();
    assert_eq!(host.reloads.load(Ordering::SeqCst), 1);
    assert!(project.is_reload_pending());
    assert_eq!(project.compiler().unwrap().family, CompilerFamily::V2);
    assert_eq!(project.versions().vue, "2.6.14");

    project.set_version(VersionKey::Vue, "3.3.4").await.unwrap();
    assert_eq!(host.reloads.load(Ordering::SeqCst), 1);

    project.update_file(APP_FILE, COMP);
    assert!(!project.flush_edits().await);
    assert_eq!(project.active_file().unwrap().code, COMP);
}

#[tokio::test]
async fn test_same_family_switch_does_not_reload() {
    let host = Arc::new(FakeHost::default());
    let mut project = fresh(host.clone());
    project.init().await.unwrap();
    project.set_version(VersionKey::Vue, "3.3.4").await.unwrap();
    assert_eq!(host.reloads.load(Ordering::SeqCst), 0);
    assert!(!project.is_reload_pending());
    assert_eq!(host.persisted.lock().unwrap().last().unwrap().vue, "3.3.4");
}

#[tokio::test]
async fn test_failed_load_keeps_previous_compiler() {
    let fetcher = FakeFetcher {
        missing: vec!["3.0.0-broken".to_string()],
        ..Default::default()
    };
    let mut project = project_with(Arc::new(FakeHost::default()), fetcher, Initial::default());
    project.init().await.unwrap();

    let err = project.set_version(VersionKey::Vue, "3.0.0-broken").await.unwrap_err();
    assert!(matches!(err, ProjectError::Load(_)));
    assert_eq!(project.compiler().unwrap().version, "3.4.21");
    assert_eq!(project.versions().vue, "3.4.21");
    assert_eq!(project.errors().len(), 1);
    assert_eq!(project.errors()[0].code, E_LOAD);
}

#[tokio::test]
async fn test_version_switch_after_failed_init_compiles_project() {
    let fetcher = FakeFetcher {
        missing: vec!["3.4.21".to_string()],
        ..Default::default()
    };
    let mut project = project_with(
        Arc::new(FakeHost::default()),
        fetcher,
        saved_state(&[("App.vue", COMP)]),
    );
    assert!(project.init().await.is_err());
    assert!(project.compiler().is_none());
    assert_eq!(project.errors()[0].code, E_LOAD);

    project.set_version(VersionKey::Vue, "3.4.0").await.unwrap();
    assert_eq!(project.compiler().unwrap().version, "3.4.0");
    assert!(project.errors().iter().all(|e| e.code != E_LOAD));
    let app = project.file(APP_FILE).unwrap();
    assert!(app.compiled.js.as_deref().unwrap().contains("__sfc__.render = render"));

    project.update_file(APP_FILE, "<template><p>edited</p></template>");
    assert!(project.flush_edits().await);
    assert!(project.file(APP_FILE).unwrap().compiled.js.as_deref().unwrap().contains("edited"));
}

#[tokio::test]
async fn test_flush_coalesces_edits() {
    let mut project = fresh(Arc::new(FakeHost::default()));
    project.init().await.unwrap();
    project.add_file(SourceUnit::new("src/util.js", "export const a = 1"));

    project.update_file("src/util.js", "export const a = 2");
    project.update_file("src/util.js", "export const a = 3");
    assert!(project.flush_edits().await);

    let unit = project.active_file().unwrap();
    assert_eq!(unit.code, "export const a = 3");
    assert!(unit.compiled.js.as_deref().unwrap().contains("a = 3"));
    assert!(project.errors().is_empty());
    assert!(!project.flush_edits().await);
}

#[tokio::test]
async fn test_edits_before_init_are_applied_without_compiling() {
    let mut project = fresh(Arc::new(FakeHost::default()));
    project.update_file(APP_FILE, COMP);
    assert!(!project.flush_edits().await);
    assert_eq!(project.file(APP_FILE).unwrap().code, COMP);
    assert!(project.file(APP_FILE).unwrap().compiled.js.is_none());
}

#[tokio::test]
async fn test_opentiny_version_regenerates_bootstrap() {
    let host = Arc::new(FakeHost::default());
    let initial = Initial {
        user_options: Some(UserOptions {
            style_source: Some("https://mirror.test/theme.css".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mut project = project_with(host.clone(), FakeFetcher::default(), initial);
    project.init().await.unwrap();

    project.set_version(VersionKey::OpenTiny, "3.15.0").await.unwrap();
    assert_eq!(project.versions().open_tiny, "3.15.0");
    let bootstrap = project.file(OPENTINY_FILE).unwrap();
    assert!(bootstrap.hidden);
    assert!(bootstrap.code.contains("https://mirror.test/theme.css"));
    assert!(bootstrap.compiled.js.is_some());
    assert!(project
        .import_map()
        .resolve("@opentiny/vue")
        .unwrap()
        .contains("3.15.0"));
}

#[tokio::test]
async fn test_import_map_prefers_user_entries() {
    let mut project = fresh(Arc::new(FakeHost::default()));
    project.update_file(IMPORT_MAP, r#"{"imports":{"vue":"https://local/vue.js","lodash":"https://cdn/lodash.js"}}"#);
    project.flush_edits().await;

    let map = project.import_map();
    assert_eq!(map.resolve("vue"), Some("https://local/vue.js"));
    assert_eq!(map.resolve("lodash"), Some("https://cdn/lodash.js"));
    assert!(map.resolve("@vue/shared").is_some());
}

#[test]
fn test_tsconfig_is_parsed() {
    let project = fresh(Arc::new(FakeHost::default()));
    assert_eq!(project.tsconfig()["compilerOptions"]["target"], "ESNext");
}

#[test]
fn test_serialize_round_trip() {
    let mut project = fresh(Arc::new(FakeHost::default()));
    project.add_file(SourceUnit::new("src/Comp.vue", COMP));
    let state = project.serialize().unwrap();

    let restored = project_with(
        Arc::new(FakeHost::default()),
        FakeFetcher::default(),
        Initial {
            serialized_state: Some(state),
            ..Default::default()
        },
    );
    assert_eq!(restored.file("src/Comp.vue").unwrap().code, COMP);
    assert_eq!(
        restored.file(APP_FILE).unwrap().code,
        project.file(APP_FILE).unwrap().code
    );
    assert!(restored.file(MAIN_FILE).unwrap().hidden);
    assert_eq!(restored.files().len(), project.files().len());
}

#[test]
fn test_legacy_state_paths_are_normalised() {
    let project = project_with(
        Arc::new(FakeHost::default()),
        FakeFetcher::default(),
        saved_state(&[("App.vue", COMP), ("import_map.json", "{}")]),
    );
    assert_eq!(project.file(APP_FILE).unwrap().code, COMP);
    assert_eq!(project.file(IMPORT_MAP).unwrap().code, "{}");
    assert!(project.file("src/import_map.json").is_none());
}

#[test]
fn test_corrupt_state_is_an_error() {
    let config = PlaygroundConfig::default();
    let loader = CompilerLoader::new(config.cdn.clone(), Arc::new(FakeFetcher::default()));
    let result = Project::new(
        config,
        Initial {
            serialized_state: Some("!!!".to_string()),
            ..Default::default()
        },
        loader,
        Arc::new(FakeHost::default()),
    );
    assert!(matches!(result, Err(ProjectError::State(_))));
}
