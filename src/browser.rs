//! Browser connection planning.
//!
//! Turns [`FlexConfig`] into a [`BrowserPlan`]: either attach to an already
//! running browser over CDP or launch a local one.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::FlexConfig;

/// Error surfaced while building a browser plan.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("invalid CDP url '{0}': expected ws://, wss://, http:// or https://")]
    InvalidCdpUrl(String),
    #[error("chrome executable not found at {0}")]
    MissingExecutable(PathBuf),
}

/// Viewport dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 1288,
            height: 711,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
    pub headless: bool,
    pub args: Vec<String>,
    pub viewport: Viewport,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LaunchStrategy {
    AttachCdp { url: String },
    Launch { user_data_dir: Option<PathBuf> },
}

/// What the runtime should do to obtain a browser.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserPlan {
    pub strategy: LaunchStrategy,
    pub launch_options: LaunchOptions,
    pub chrome_executable: Option<PathBuf>,
}

impl BrowserPlan {
    pub fn from_config(config: &FlexConfig) -> Result<Self, BrowserError> {
        let strategy = match config.cdp_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                let scheme_ok = ["ws://", "wss://", "http://", "https://"]
                    .iter()
                    .any(|scheme| url.starts_with(scheme));
                if !scheme_ok {
                    return Err(BrowserError::InvalidCdpUrl(url.to_string()));
                }
                LaunchStrategy::AttachCdp {
                    url: url.to_string(),
                }
            }
            _ => LaunchStrategy::Launch {
                user_data_dir: config.user_data_dir.as_ref().map(PathBuf::from),
            },
        };

        let chrome_executable = config.chrome_executable.as_ref().map(PathBuf::from);
        if let (LaunchStrategy::Launch { .. }, Some(path)) = (&strategy, &chrome_executable) {
            if !path.exists() {
                return Err(BrowserError::MissingExecutable(path.clone()));
            }
        }

        let args = if config.launch_args.is_empty() {
            vec!["--disable-blink-features=AutomationControlled".to_string()]
        } else {
            config.launch_args.clone()
        };

        Ok(BrowserPlan {
            strategy,
            launch_options: LaunchOptions {
                headless: config.headless,
                args,
                viewport: Viewport::default(),
            },
            chrome_executable,
        })
    }
}

#[derive(Debug, Error)]
pub enum BrowserRuntimeError {
    #[error("browser runtime error: {0}")]
    Message(String),
    #[error("browser runtime not initialized")]
    NotInitialized,
    #[error("no page with id '{0}'")]
    UnknownPage(String),
}

/// Adapter that carries out a [`BrowserPlan`].
#[async_trait]
pub trait BrowserRuntime: Send + Sync {
    async fn start(&self, plan: &BrowserPlan) -> Result<(), BrowserRuntimeError>;

    /// Open `url` in a new page and return the page id.
    async fn new_page(&self, url: &str) -> Result<String, BrowserRuntimeError>;

    async fn list_pages(&self) -> Result<Vec<String>, BrowserRuntimeError>;

    async fn shutdown(&self) -> Result<(), BrowserRuntimeError>;
}

/// Plan plus the runtime that executes it.
pub struct FlexBrowser<R: BrowserRuntime> {
    plan: BrowserPlan,
    runtime: R,
}

impl<R: BrowserRuntime> FlexBrowser<R> {
    pub fn new(config: &FlexConfig, runtime: R) -> Result<Self, BrowserError> {
        Ok(Self {
            plan: BrowserPlan::from_config(config)?,
            runtime,
        })
    }

    pub fn plan(&self) -> &BrowserPlan {
        &self.plan
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub async fn start(&self) -> Result<(), BrowserRuntimeError> {
        self.runtime.start(&self.plan).await
    }

    pub async fn open(&self, url: &str) -> Result<String, BrowserRuntimeError> {
        self.runtime.new_page(url).await
    }

    pub async fn shutdown(&self) -> Result<(), BrowserRuntimeError> {
        self.runtime.shutdown().await
    }
}

impl<R: BrowserRuntime> fmt::Debug for FlexBrowser<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlexBrowser")
            .field("plan", &self.plan)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn default_config_launches_headless() {
        let plan = BrowserPlan::from_config(&FlexConfig::default()).unwrap();
        assert_eq!(plan.strategy, LaunchStrategy::Launch { user_data_dir: None });
        assert!(plan.launch_options.headless);
        assert_eq!(
            plan.launch_options.args,
            vec!["--disable-blink-features=AutomationControlled".to_string()]
        );
        assert!(plan.chrome_executable.is_none());
    }

    #[test]
    fn cdp_url_selects_attach() {
        let config = FlexConfig {
            cdp_url: Some(" ws://127.0.0.1:9222/devtools/browser/abc ".into()),
            ..FlexConfig::default()
        };
        let plan = BrowserPlan::from_config(&config).unwrap();
        assert_eq!(
            plan.strategy,
            LaunchStrategy::AttachCdp {
                url: "ws://127.0.0.1:9222/devtools/browser/abc".into()
            }
        );
    }

    #[test]
    fn rejects_bad_cdp_url_and_missing_executable() {
        let config = FlexConfig {
            cdp_url: Some("localhost:9222".into()),
            ..FlexConfig::default()
        };
        assert!(matches!(
            BrowserPlan::from_config(&config),
            Err(BrowserError::InvalidCdpUrl(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let config = FlexConfig {
            chrome_executable: Some(dir.path().join("chrome").display().to_string()),
            ..FlexConfig::default()
        };
        assert!(matches!(
            BrowserPlan::from_config(&config),
            Err(BrowserError::MissingExecutable(_))
        ));
    }

    #[test]
    fn user_data_dir_and_args_are_carried() {
        let config = FlexConfig {
            user_data_dir: Some("/tmp/flex-profile".into()),
            launch_args: vec!["--mute-audio".into()],
            headless: false,
            ..FlexConfig::default()
        };
        let plan = BrowserPlan::from_config(&config).unwrap();
        assert_eq!(
            plan.strategy,
            LaunchStrategy::Launch {
                user_data_dir: Some(PathBuf::from("/tmp/flex-profile"))
            }
        );
        assert_eq!(plan.launch_options.args, vec!["--mute-audio".to_string()]);
        assert!(!plan.launch_options.headless);
    }

    #[derive(Default)]
    struct RecordingRuntime {
        started: Mutex<Vec<BrowserPlan>>,
        pages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BrowserRuntime for RecordingRuntime {
        async fn start(&self, plan: &BrowserPlan) -> Result<(), BrowserRuntimeError> {
            self.started.lock().unwrap().push(plan.clone());
            Ok(())
        }

        async fn new_page(&self, url: &str) -> Result<String, BrowserRuntimeError> {
            let mut pages = self.pages.lock().unwrap();
            pages.push(url.to_string());
            Ok(format!("page-{}", pages.len()))
        }

        async fn list_pages(&self) -> Result<Vec<String>, BrowserRuntimeError> {
            Ok(self.pages.lock().unwrap().clone())
        }

        async fn shutdown(&self) -> Result<(), BrowserRuntimeError> {
            self.pages.lock().unwrap().clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn flex_browser_drives_runtime() {
        let browser = FlexBrowser::new(&FlexConfig::default(), RecordingRuntime::default()).unwrap();
        browser.start().await.unwrap();
        assert_eq!(browser.open("http://localhost/app.html").await.unwrap(), "page-1");
        assert_eq!(browser.runtime().started.lock().unwrap().len(), 1);

        browser.shutdown().await.unwrap();
        assert!(browser.runtime().list_pages().await.unwrap().is_empty());
    }
}
