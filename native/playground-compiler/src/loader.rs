//! Dynamic compiler loader
//!
//! Resolves the version-pinned compiler and runtime module URLs, fetches the
//! compiler module to make sure the requested build exists, and hands back
//! the native `SfcCompiler` of the matching family pinned to that version.

use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::compiler::{SfcCompiler, V2Compiler, V3Compiler};
use crate::config::Cdn;
use crate::dependency::gen_vue_link;
use crate::version::CompilerFamily;

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("module not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to load compiler for version {version}: {source}")]
    Fetch {
        version: String,
        #[source]
        source: FetchError,
    },

    #[error("{url} did not return a compiler module")]
    InvalidModule { url: String },
}

/// Fetches module source text by URL.
pub trait ModuleFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>>;
}

/// `reqwest`-backed fetcher used outside of tests.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

impl ModuleFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            debug!(url, "fetching module");
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            Ok(response.text().await?)
        })
    }
}

/// A compiler ready for the pipeline, plus where its runtime lives.
#[derive(Clone)]
pub struct LoadedCompiler {
    pub compiler: Arc<dyn SfcCompiler>,
    pub version: String,
    pub family: CompilerFamily,
    pub compiler_url: String,
    pub runtime_url: String,
}

impl std::fmt::Debug for LoadedCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedCompiler")
            .field("version", &self.version)
            .field("family", &self.family)
            .field("compiler_url", &self.compiler_url)
            .field("runtime_url", &self.runtime_url)
            .finish()
    }
}

#[derive(Clone)]
pub struct CompilerLoader {
    cdn: Cdn,
    fetcher: Arc<dyn ModuleFetcher>,
}

impl CompilerLoader {
    pub fn new(cdn: Cdn, fetcher: Arc<dyn ModuleFetcher>) -> Self {
        CompilerLoader { cdn, fetcher }
    }

    pub fn cdn(&self) -> &Cdn {
        &self.cdn
    }

    /// On error the caller keeps whatever compiler it already had.
    pub async fn load(&self, version: &str) -> Result<LoadedCompiler, LoadError> {
        let family = CompilerFamily::of(version);
        let links = gen_vue_link(&self.cdn, family, version);
        debug!(version, url = %links.compiler_sfc, "loading compiler");

        let body = self
            .fetcher
            .fetch(&links.compiler_sfc)
            .await
            .map_err(|source| LoadError::Fetch {
                version: version.to_string(),
                source,
            })?;
        if body.trim().is_empty() {
            return Err(LoadError::InvalidModule {
                url: links.compiler_sfc,
            });
        }

        let compiler: Arc<dyn SfcCompiler> = match family {
            CompilerFamily::V3 => Arc::new(V3Compiler::new(version)),
            CompilerFamily::V2 => Arc::new(V2Compiler::new(version)),
        };
        info!(version, family = ?family, "compiler loaded");
        Ok(LoadedCompiler {
            compiler,
            version: version.to_string(),
            family,
            compiler_url: links.compiler_sfc,
            runtime_url: links.runtime_dom,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves every URL with a stub module unless it is listed as missing.
    #[derive(Default)]
    pub struct FakeFetcher {
        pub missing: Vec<String>,
        pub requests: Mutex<Vec<String>>,
        pub bodies: HashMap<String, String>,
    }

    impl ModuleFetcher for FakeFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
            Box::pin(async move {
                if let Ok(mut requests) = self.requests.lock() {
                    requests.push(url.to_string());
                }
                if self.missing.iter().any(|m| url.contains(m.as_str())) {
                    return Err(FetchError::NotFound(url.to_string()));
                }
                Ok(self
                    .bodies
                    .get(url)
                    .cloned()
                    .unwrap_or_else(|| "export function parse() {}".to_string()))
            })
        }
    }
}
