//! High-level keywords over a selected Flex application.
//!
//! A page may host several movies. Applications are selected (and optionally
//! aliased) once, after which every keyword targets the current one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::actions::{FlexAction, FlexCommandExecutor, FlexError};
use crate::config::FlexConfig;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("No Flex application selected.")]
    NoApplicationSelected,
    #[error("no Flex application with index or alias '{0}'")]
    UnknownApplication(String),
    #[error(transparent)]
    Flex(#[from] FlexError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RegisteredApplication {
    locator: String,
    alias: Option<String>,
}

/// Registry of selected Flex movies.
///
/// Indices are 1-based and restart at 1 after [`FlexApplications::clear`].
#[derive(Debug, Default, Clone)]
pub struct FlexApplications {
    apps: Vec<RegisteredApplication>,
    current: Option<usize>,
}

impl FlexApplications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `locator`, make it current and return its index.
    pub fn register(&mut self, locator: impl Into<String>, alias: Option<&str>) -> usize {
        self.apps.push(RegisteredApplication {
            locator: locator.into(),
            alias: alias.map(str::to_string),
        });
        self.current = Some(self.apps.len() - 1);
        self.apps.len()
    }

    /// Make the application with the given index or alias current.
    pub fn switch(&mut self, index_or_alias: &str) -> Result<&str, LibraryError> {
        let wanted = index_or_alias.trim();
        let position = self
            .apps
            .iter()
            .position(|app| app.alias.as_deref() == Some(wanted))
            .or_else(|| {
                wanted
                    .parse::<usize>()
                    .ok()
                    .filter(|index| (1..=self.apps.len()).contains(index))
                    .map(|index| index - 1)
            })
            .ok_or_else(|| LibraryError::UnknownApplication(wanted.to_string()))?;
        self.current = Some(position);
        Ok(&self.apps[position].locator)
    }

    /// Locator of the current application.
    pub fn current(&self) -> Option<&str> {
        self.current
            .and_then(|position| self.apps.get(position))
            .map(|app| app.locator.as_str())
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn clear(&mut self) {
        self.apps.clear();
        self.current = None;
    }
}

/// Normalize a Flex component locator into options understood by the movie.
///
/// `someId` matches the component id, `id:a/name:b` is a child chain, and
/// anything already containing `=` is passed through.
pub fn flex_locator(locator: &str) -> String {
    let locator = locator.trim();
    if locator.contains('=') {
        locator.to_string()
    } else if locator.contains('/') {
        format!("chain={locator}")
    } else {
        format!("id={locator}")
    }
}

/// Keywords operating on the currently selected Flex application.
pub struct FlexLibrary {
    executor: Arc<dyn FlexCommandExecutor>,
    apps: FlexApplications,
    ready_timeout: Duration,
}

impl fmt::Debug for FlexLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlexLibrary")
            .field("apps", &self.apps)
            .field("ready_timeout", &self.ready_timeout)
            .finish_non_exhaustive()
    }
}

impl FlexLibrary {
    pub fn new(executor: Arc<dyn FlexCommandExecutor>, config: &FlexConfig) -> Self {
        Self {
            executor,
            apps: FlexApplications::new(),
            ready_timeout: config.ready_timeout(),
        }
    }

    pub fn applications(&self) -> &FlexApplications {
        &self.apps
    }

    /// Wait for the movie to become ready, then select it.
    ///
    /// Returns the index usable with [`FlexLibrary::switch_flex_application`].
    pub async fn select_flex_application(
        &mut self,
        locator: &str,
        alias: Option<&str>,
    ) -> Result<usize, LibraryError> {
        self.executor
            .wait_for_ready(locator, self.ready_timeout)
            .await?;
        let index = self.apps.register(locator, alias);
        log::info!("selected Flex application {locator} as #{index}");
        Ok(index)
    }

    pub fn switch_flex_application(&mut self, index_or_alias: &str) -> Result<(), LibraryError> {
        let locator = self.apps.switch(index_or_alias)?;
        log::debug!("switched to Flex application {locator}");
        Ok(())
    }

    /// Forget all selected applications; indices start at 1 again.
    pub fn unselect_flex_applications(&mut self) {
        self.apps.clear();
    }

    pub async fn flex_element_should_exist(&self, locator: &str) -> Result<(), LibraryError> {
        self.command(FlexAction::AssertDisplayObject, &flex_locator(locator))
            .await
    }

    pub async fn click_flex_element(&self, locator: &str) -> Result<(), LibraryError> {
        self.command(FlexAction::Click, &flex_locator(locator)).await
    }

    pub async fn input_into_flex_textfield(
        &self,
        locator: &str,
        value: &str,
    ) -> Result<(), LibraryError> {
        let options = format!("{}, text={value}", flex_locator(locator));
        self.command(FlexAction::Type, &options).await
    }

    pub async fn flex_textfield_value_should_be(
        &self,
        locator: &str,
        expected: &str,
    ) -> Result<(), LibraryError> {
        let options = format!("{},validator={expected}", flex_locator(locator));
        self.command(FlexAction::AssertText, &options).await
    }

    async fn command(&self, action: FlexAction, options: &str) -> Result<(), LibraryError> {
        let app = self
            .apps
            .current()
            .ok_or(LibraryError::NoApplicationSelected)?;
        self.executor.execute(action, app, options).await?;
        Ok(())
    }
}
