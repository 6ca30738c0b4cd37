//! High-level facade wiring a real browser to Flex commands.
//!
//! A [`FlexSession`] owns the chromiumoxide runtime; every page it opens comes
//! back as a [`FlexPage`] with its own host collaborators and invoker.

use std::sync::Arc;

use thiserror::Error;

use crate::actions::FlexCommands;
use crate::adapter::chromiumoxide::ChromiumoxideHost;
use crate::browser::{BrowserError, BrowserRuntimeError, FlexBrowser};
use crate::config::{FlexConfig, FlexConfigError};
use crate::invoker::{InvokerSettings, PluginInvoker};
use crate::library::FlexLibrary;
use crate::logging::{FlexLogger, LogCategory};
use crate::runtime::ChromiumoxideRuntime;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] FlexConfigError),
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Runtime(#[from] BrowserRuntimeError),
}

pub struct FlexSession {
    config: FlexConfig,
    logger: Arc<FlexLogger>,
    browser: FlexBrowser<Arc<ChromiumoxideRuntime>>,
}

impl FlexSession {
    pub fn new(config: FlexConfig, runtime: Arc<ChromiumoxideRuntime>) -> Result<Self, SessionError> {
        config.validate()?;
        let browser = FlexBrowser::new(&config, runtime)?;
        let logger = Arc::new(FlexLogger::from_config(&config));
        Ok(Self {
            config,
            logger,
            browser,
        })
    }

    pub fn config(&self) -> &FlexConfig {
        &self.config
    }

    pub async fn init(&self) -> Result<(), SessionError> {
        self.browser.start().await?;
        self.logger.info(LogCategory::Session, "browser ready", None);
        Ok(())
    }

    /// Open `url` and bind Flex commands to the new page.
    pub async fn open_page(&self, url: &str) -> Result<FlexPage, SessionError> {
        let page_id = self.browser.open(url).await?;
        self.logger.debug(
            LogCategory::Session,
            format!("opened {url}"),
            Some(serde_json::json!({ "pageId": page_id })),
        );
        let host = Arc::new(ChromiumoxideHost::new(
            self.browser.runtime().clone(),
            page_id,
        ));
        let invoker = PluginInvoker::new(
            host.clone(),
            host.clone(),
            InvokerSettings::from(&self.config),
            self.logger.clone(),
        );
        let commands = FlexCommands::new(host.clone(), invoker, &self.config);
        Ok(FlexPage {
            host,
            commands,
            config: self.config.clone(),
        })
    }

    pub async fn close(&self) -> Result<(), SessionError> {
        self.browser.shutdown().await?;
        Ok(())
    }
}

/// Flex commands bound to one open page.
pub struct FlexPage {
    host: Arc<ChromiumoxideHost>,
    commands: FlexCommands,
    config: FlexConfig,
}

impl FlexPage {
    pub fn page_id(&self) -> &str {
        self.host.page_id()
    }

    pub fn commands(&self) -> &FlexCommands {
        &self.commands
    }

    /// Keyword layer driving this page's movies locally.
    pub fn library(&self) -> FlexLibrary {
        FlexLibrary::new(Arc::new(self.commands.clone()), &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_rejects_empty_failure_marker() {
        let config = FlexConfig {
            failure_marker: String::new(),
            ..FlexConfig::default()
        };
        let result = FlexSession::new(config, Arc::new(ChromiumoxideRuntime::new()));
        assert!(matches!(
            result,
            Err(SessionError::Config(FlexConfigError::Empty {
                field: "failure_marker"
            }))
        ));
    }
}
