//! CDN link generation for framework builds and the generated import map.

use crate::config::{Cdn, Versions};
use crate::import_map::ImportMap;
use crate::version::CompilerFamily;

/// `{origin}/{package}{@version}{path}`
pub fn gen_cdn_link(cdn: &Cdn, pkg: &str, version: Option<&str>, path: &str) -> String {
    let version = match version {
        Some(v) if !v.is_empty() => format!("@{}", v),
        _ => String::new(),
    };
    format!("{}/{}{}{}", cdn.origin(), pkg, version, path)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VueLinks {
    pub compiler_sfc: String,
    pub runtime_dom: String,
}

/// The v3 family publishes scoped sub-packages with `.esm-browser.js` builds,
/// the v2 family a single package with an `.esm.browser.js` build.
pub fn gen_vue_link(cdn: &Cdn, family: CompilerFamily, version: &str) -> VueLinks {
    match family {
        CompilerFamily::V3 => VueLinks {
            compiler_sfc: gen_cdn_link(
                cdn,
                "@vue/compiler-sfc",
                Some(version),
                "/dist/compiler-sfc.esm-browser.js",
            ),
            runtime_dom: gen_cdn_link(
                cdn,
                "@vue/runtime-dom",
                Some(version),
                "/dist/runtime-dom.esm-browser.js",
            ),
        },
        CompilerFamily::V2 => {
            let bundle = gen_cdn_link(cdn, "vue", Some(version), "/dist/vue.esm.browser.js");
            VueLinks {
                compiler_sfc: bundle.clone(),
                runtime_dom: bundle,
            }
        }
    }
}

struct Dependency<'a> {
    pkg: Option<&'a str>,
    version: Option<&'a str>,
    path: &'a str,
}

pub fn gen_import_map(cdn: &Cdn, versions: &Versions) -> ImportMap {
    let vue = versions.vue.as_str();
    let open_tiny = versions.open_tiny.as_str();
    let family = CompilerFamily::of(vue);
    let vue_path = match family {
        CompilerFamily::V3 => "/dist/vue.esm-browser.js",
        CompilerFamily::V2 => "/dist/vue.esm.browser.js",
    };

    let mut deps: Vec<(&str, Dependency)> = vec![
        ("vue", Dependency { pkg: Some("vue"), version: Some(vue), path: vue_path }),
        (
            "@vue/shared",
            Dependency { pkg: None, version: Some(vue), path: "/dist/shared.esm-bundler.js" },
        ),
        (
            "@opentiny/vue",
            Dependency {
                pkg: Some("@opentiny/vue"),
                version: Some(open_tiny),
                path: "/runtime/tiny-vue.mjs",
            },
        ),
        (
            "@opentiny/vue-common",
            Dependency {
                pkg: Some("@opentiny/vue"),
                version: Some(open_tiny),
                path: "/runtime/tiny-vue-common.mjs",
            },
        ),
        (
            "@opentiny/vue-icon",
            Dependency {
                pkg: Some("@opentiny/vue"),
                version: Some(open_tiny),
                path: "/runtime/tiny-vue-icon.mjs",
            },
        ),
        (
            "@opentiny/vue-locale",
            Dependency {
                pkg: Some("@opentiny/vue"),
                version: Some(open_tiny),
                path: "/runtime/tiny-vue-locale.mjs",
            },
        ),
    ];
    if family == CompilerFamily::V2 {
        deps.push((
            "@vue/composition-api",
            Dependency {
                pkg: Some("@vue/composition-api"),
                version: Some("1.2.2"),
                path: "/dist/vue-composition-api.mjs",
            },
        ));
    }

    let mut map = ImportMap::new();
    for (key, dep) in deps {
        map.insert(key, gen_cdn_link(cdn, dep.pkg.unwrap_or(key), dep.version, dep.path));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_cdn_link() {
        assert_eq!(
            gen_cdn_link(&Cdn::Unpkg, "vue", Some("3.4.0"), "/dist/vue.js"),
            "https://unpkg.com/vue@3.4.0/dist/vue.js"
        );
        assert_eq!(
            gen_cdn_link(&Cdn::Jsdelivr, "vue", None, "/dist/vue.js"),
            "https://cdn.jsdelivr.net/npm/vue/dist/vue.js"
        );
        assert_eq!(
            gen_cdn_link(&Cdn::Unpkg, "vue", Some(""), "/x.js"),
            "https://unpkg.com/vue/x.js"
        );
    }

    #[test]
    fn test_vue_links_per_family() {
        let v3 = gen_vue_link(&Cdn::Unpkg, CompilerFamily::V3, "3.4.21");
        assert_eq!(
            v3.compiler_sfc,
            "https://unpkg.com/@vue/compiler-sfc@3.4.21/dist/compiler-sfc.esm-browser.js"
        );
        assert_eq!(
            v3.runtime_dom,
            "https://unpkg.com/@vue/runtime-dom@3.4.21/dist/runtime-dom.esm-browser.js"
        );

        let v2 = gen_vue_link(&Cdn::Unpkg, CompilerFamily::V2, "2.6.14");
        assert_eq!(v2.compiler_sfc, "https://unpkg.com/vue@2.6.14/dist/vue.esm.browser.js");
        assert_eq!(v2.compiler_sfc, v2.runtime_dom);
    }

    #[test]
    fn test_latest_version_uses_v3_links() {
        let latest = gen_vue_link(&Cdn::Unpkg, CompilerFamily::of(""), "");
        assert_eq!(
            latest.compiler_sfc,
            "https://unpkg.com/@vue/compiler-sfc/dist/compiler-sfc.esm-browser.js"
        );
        assert_eq!(
            latest.runtime_dom,
            "https://unpkg.com/@vue/runtime-dom/dist/runtime-dom.esm-browser.js"
        );

        let versions = Versions {
            vue: String::new(),
            open_tiny: "3.1.0".to_string(),
        };
        let map = gen_import_map(&Cdn::Unpkg, &versions);
        assert_eq!(map.resolve("vue"), Some("https://unpkg.com/vue/dist/vue.esm-browser.js"));
        assert!(map.resolve("@vue/composition-api").is_none());
    }

    #[test]
    fn test_import_map_v2_adds_composition_api() {
        let versions = Versions {
            vue: "2.6.14".to_string(),
            open_tiny: "3.1.0".to_string(),
        };
        let map = gen_import_map(&Cdn::Unpkg, &versions);
        assert_eq!(
            map.resolve("vue"),
            Some("https://unpkg.com/vue@2.6.14/dist/vue.esm.browser.js")
        );
        assert_eq!(
            map.resolve("@vue/shared"),
            Some("https://unpkg.com/@vue/shared@2.6.14/dist/shared.esm-bundler.js")
        );
        assert_eq!(
            map.resolve("@opentiny/vue-icon"),
            Some("https://unpkg.com/@opentiny/vue@3.1.0/runtime/tiny-vue-icon.mjs")
        );
        assert!(map.resolve("@vue/composition-api").is_some());
    }

    #[test]
    fn test_import_map_v3() {
        let map = gen_import_map(&Cdn::Unpkg, &Versions::default());
        assert!(map.resolve("vue").unwrap().ends_with("/dist/vue.esm-browser.js"));
        assert!(map.resolve("@vue/composition-api").is_none());
    }
}
