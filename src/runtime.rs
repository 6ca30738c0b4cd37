//! Chromiumoxide-based browser runtime.
//!
//! Implements [`BrowserRuntime`] on top of `chromiumoxide`, tracking the pages
//! it opened so adapters can bind to them by id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    handler::viewport::Viewport as ChromiumViewport,
    page::Page as ChromiumPage,
};
use futures_util::StreamExt;
use tokio::{sync::Mutex, task::JoinHandle};

use crate::browser::{BrowserPlan, BrowserRuntime, BrowserRuntimeError, LaunchStrategy};

pub struct ChromiumoxideRuntime {
    state: Arc<Mutex<Option<RuntimeState>>>,
}

struct RuntimeState {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    pages: HashMap<String, ChromiumPage>,
}

impl ChromiumoxideRuntime {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(None)),
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>, BrowserRuntimeError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserRuntimeError::NotInitialized)?;
        Ok(state.browser.clone())
    }

    /// Page handle for an id returned by [`BrowserRuntime::new_page`].
    pub async fn page(&self, page_id: &str) -> Result<ChromiumPage, BrowserRuntimeError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserRuntimeError::NotInitialized)?;
        state
            .pages
            .get(page_id)
            .cloned()
            .ok_or_else(|| BrowserRuntimeError::UnknownPage(page_id.to_string()))
    }

    async fn populate_initial_pages(&self) -> Result<(), BrowserRuntimeError> {
        let pages = self
            .browser()
            .await?
            .pages()
            .await
            .map_err(map_chromiumoxide_error)?;

        let mut guard = self.state.lock().await;
        if let Some(state) = guard.as_mut() {
            for page in pages {
                let id = page.target_id().as_ref().to_string();
                state.pages.entry(id).or_insert(page);
            }
        }
        Ok(())
    }

    async fn install(&self, browser: Browser, handler: chromiumoxide::handler::Handler) {
        let new_state = RuntimeState {
            browser: Arc::new(browser),
            handler: spawn_handler(handler),
            pages: HashMap::new(),
        };
        let previous = self.state.lock().await.replace(new_state);
        if let Some(state) = previous {
            cleanup_state(state);
        }
    }
}

impl Default for ChromiumoxideRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserRuntime for ChromiumoxideRuntime {
    async fn start(&self, plan: &BrowserPlan) -> Result<(), BrowserRuntimeError> {
        if self.state.lock().await.is_some() {
            return Ok(());
        }

        let (browser, handler) = match &plan.strategy {
            LaunchStrategy::AttachCdp { url } => {
                log::info!("attaching to browser at {url}");
                Browser::connect(url.as_str())
                    .await
                    .map_err(map_chromiumoxide_error)?
            }
            LaunchStrategy::Launch { .. } => {
                log::info!("launching local browser");
                Browser::launch(build_config(plan)?)
                    .await
                    .map_err(map_chromiumoxide_error)?
            }
        };
        self.install(browser, handler).await;
        self.populate_initial_pages().await
    }

    async fn new_page(&self, url: &str) -> Result<String, BrowserRuntimeError> {
        let page = self
            .browser()
            .await?
            .new_page(url)
            .await
            .map_err(map_chromiumoxide_error)?;
        let page_id = page.target_id().as_ref().to_string();

        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(BrowserRuntimeError::NotInitialized)?;
        state.pages.insert(page_id.clone(), page);
        Ok(page_id)
    }

    async fn list_pages(&self) -> Result<Vec<String>, BrowserRuntimeError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserRuntimeError::NotInitialized)?;
        Ok(state.pages.keys().cloned().collect())
    }

    async fn shutdown(&self) -> Result<(), BrowserRuntimeError> {
        let state = self.state.lock().await.take();
        if let Some(state) = state {
            cleanup_state(state);
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserRuntime for Arc<ChromiumoxideRuntime> {
    async fn start(&self, plan: &BrowserPlan) -> Result<(), BrowserRuntimeError> {
        (**self).start(plan).await
    }

    async fn new_page(&self, url: &str) -> Result<String, BrowserRuntimeError> {
        (**self).new_page(url).await
    }

    async fn list_pages(&self) -> Result<Vec<String>, BrowserRuntimeError> {
        (**self).list_pages().await
    }

    async fn shutdown(&self) -> Result<(), BrowserRuntimeError> {
        (**self).shutdown().await
    }
}

fn build_config(plan: &BrowserPlan) -> Result<BrowserConfig, BrowserRuntimeError> {
    let launch = &plan.launch_options;

    let viewport = ChromiumViewport {
        width: launch.viewport.width,
        height: launch.viewport.height,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: launch.viewport.width >= launch.viewport.height,
        has_touch: false,
    };

    let mut builder = BrowserConfig::builder();

    if let Some(path) = &plan.chrome_executable {
        builder = builder.chrome_executable(path);
    }

    let builder = builder.viewport(viewport).args(launch.args.clone());

    let builder = if launch.headless {
        builder
    } else {
        builder.with_head()
    };

    let builder = match &plan.strategy {
        LaunchStrategy::Launch {
            user_data_dir: Some(dir),
        } => builder.user_data_dir(dir),
        _ => builder,
    };

    builder.build().map_err(BrowserRuntimeError::Message)
}

fn map_chromiumoxide_error<E: std::fmt::Display>(err: E) -> BrowserRuntimeError {
    BrowserRuntimeError::Message(err.to_string())
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                log::warn!("chromiumoxide handler error: {err}");
            }
        }
    })
}

fn cleanup_state(mut state: RuntimeState) {
    state.handler.abort();
    state.pages.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{LaunchOptions, Viewport};

    #[tokio::test]
    async fn operations_require_a_started_browser() {
        let runtime = ChromiumoxideRuntime::new();
        assert!(matches!(
            runtime.new_page("about:blank").await,
            Err(BrowserRuntimeError::NotInitialized)
        ));
        assert!(matches!(
            runtime.page("missing").await,
            Err(BrowserRuntimeError::NotInitialized)
        ));
        runtime.shutdown().await.expect("shutdown is idempotent");
    }

    #[test]
    fn launch_config_builds_with_executable_and_profile() {
        let dir = tempfile::tempdir().unwrap();
        let executable = dir.path().join("chrome");
        std::fs::write(&executable, b"").unwrap();

        let plan = BrowserPlan {
            strategy: LaunchStrategy::Launch {
                user_data_dir: Some(dir.path().join("profile")),
            },
            launch_options: LaunchOptions {
                headless: false,
                args: vec!["--mute-audio".into()],
                viewport: Viewport::default(),
            },
            chrome_executable: Some(executable),
        };
        build_config(&plan).expect("config builds");
    }
}
