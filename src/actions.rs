//! Named Flex actions on top of [`PluginInvoker`].
//!
//! Every action locates the movie, calls one fixed plugin method and turns a
//! failure reported by the movie into [`FlexError::ActionFailed`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::time::{self, Instant};

use crate::config::FlexConfig;
use crate::host::{ElementFinder, HostError};
use crate::invoker::{InvocationResult, InvokeError, PluginInvoker};
use crate::locator::{Locator, LocatorError};
use crate::logging::LogCategory;
use crate::target::PluginTarget;

/// Actions a Flex movie understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlexAction {
    Click,
    DoubleClick,
    Type,
    Select,
    DragDropElemToElem,
    DragDropToCoords,
    AssertDisplayObject,
    AssertTextIn,
    AssertText,
    AssertProperty,
}

impl FlexAction {
    pub const ALL: [FlexAction; 10] = [
        FlexAction::Click,
        FlexAction::DoubleClick,
        FlexAction::Type,
        FlexAction::Select,
        FlexAction::DragDropElemToElem,
        FlexAction::DragDropToCoords,
        FlexAction::AssertDisplayObject,
        FlexAction::AssertTextIn,
        FlexAction::AssertText,
        FlexAction::AssertProperty,
    ];

    /// Method the movie exposes for this action.
    pub fn plugin_method(self) -> &'static str {
        match self {
            FlexAction::Click => "fp_click",
            FlexAction::DoubleClick => "fp_doubleClick",
            FlexAction::Type => "fp_type",
            FlexAction::Select => "fp_select",
            FlexAction::DragDropElemToElem => "fp_dragDropElemToElem",
            FlexAction::DragDropToCoords => "fp_dragDropToCoords",
            FlexAction::AssertDisplayObject => "fp_assertDisplayObject",
            FlexAction::AssertTextIn => "fp_assertTextIn",
            FlexAction::AssertText => "fp_assertText",
            FlexAction::AssertProperty => "fp_assertProperty",
        }
    }

    /// Command name used when forwarding to a remote executor.
    pub fn command_name(self) -> &'static str {
        match self {
            FlexAction::Click => "flexClick",
            FlexAction::DoubleClick => "flexDoubleClick",
            FlexAction::Type => "flexType",
            FlexAction::Select => "flexSelect",
            FlexAction::DragDropElemToElem => "flexDragDropElemToElem",
            FlexAction::DragDropToCoords => "flexDragDropToCoords",
            FlexAction::AssertDisplayObject => "flexAssertDisplayObject",
            FlexAction::AssertTextIn => "flexAssertTextIn",
            FlexAction::AssertText => "flexAssertText",
            FlexAction::AssertProperty => "flexAssertProperty",
        }
    }
}

impl fmt::Display for FlexAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_name())
    }
}

impl FromStr for FlexAction {
    type Err = FlexError;

    /// Accepts command names (`flexClick`), plugin methods (`fp_click`) and
    /// kebab-case names (`click`, `assert-text`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        let kebab = wanted.replace('-', "").to_ascii_lowercase();
        FlexAction::ALL
            .into_iter()
            .find(|action| {
                action.command_name() == wanted
                    || action.plugin_method() == wanted
                    || action.command_name()[4..].to_ascii_lowercase() == kebab
            })
            .ok_or_else(|| FlexError::UnknownAction(wanted.to_string()))
    }
}

/// Errors surfaced by Flex actions.
#[derive(Debug, Error)]
pub enum FlexError {
    #[error("{action} on '{locator}' with options '{options}' failed: {message}")]
    ActionFailed {
        action: FlexAction,
        locator: String,
        options: String,
        message: String,
    },
    #[error("Flex movie not ready: '{locator}'")]
    NotReady { locator: String },
    #[error("timed out after {waited_ms} ms waiting for '{locator}': {last_error}")]
    Timeout {
        locator: String,
        waited_ms: u128,
        last_error: String,
    },
    #[error("unknown Flex action '{0}'")]
    UnknownAction(String),
    #[error("remote command '{command}' failed: {source}")]
    Remote {
        command: String,
        #[source]
        source: HostError,
    },
    #[error(transparent)]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

impl FlexError {
    /// Whether repeating the same call cannot change the outcome.
    ///
    /// Bad locators and dead browser transports stay that way; a movie that
    /// is still loading does not.
    pub fn is_permanent(&self) -> bool {
        match self {
            FlexError::Locator(_)
            | FlexError::UnknownAction(_)
            | FlexError::Host(HostError::Transport(_))
            | FlexError::Invoke(InvokeError::Direct { .. })
            | FlexError::Invoke(InvokeError::Bridge {
                source: HostError::Transport(_),
                ..
            }) => true,
            _ => false,
        }
    }
}

/// Anything that can carry out Flex actions, locally or remotely.
#[async_trait]
pub trait FlexCommandExecutor: Send + Sync {
    async fn execute(&self, action: FlexAction, locator: &str, options: &str)
    -> Result<(), FlexError>;

    async fn wait_for_ready(&self, locator: &str, timeout: Duration) -> Result<(), FlexError>;

    async fn wait_for_object(
        &self,
        locator: &str,
        options: &str,
        timeout: Duration,
    ) -> Result<(), FlexError>;
}

/// Runs Flex actions against movies in the current page.
#[derive(Clone)]
pub struct FlexCommands {
    finder: Arc<dyn ElementFinder>,
    invoker: PluginInvoker,
    ready_method: String,
    poll_interval: Duration,
}

impl fmt::Debug for FlexCommands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlexCommands")
            .field("invoker", &self.invoker)
            .field("ready_method", &self.ready_method)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl FlexCommands {
    pub fn new(finder: Arc<dyn ElementFinder>, invoker: PluginInvoker, config: &FlexConfig) -> Self {
        Self {
            finder,
            invoker,
            ready_method: config.ready_method.clone(),
            poll_interval: config.poll_interval(),
        }
    }

    pub fn invoker(&self) -> &PluginInvoker {
        &self.invoker
    }

    async fn locate(&self, locator: &str) -> Result<PluginTarget, FlexError> {
        let parsed = Locator::parse(locator)?;
        Ok(self.finder.find_element(&parsed).await?)
    }

    /// Locate the movie, run `action` and fail if the movie reports failure.
    pub async fn run(&self, action: FlexAction, locator: &str, options: &str) -> Result<(), FlexError> {
        let target = self.locate(locator).await?;
        let result = self
            .invoker
            .invoke(&target, action.plugin_method(), options)
            .await?;
        match result {
            InvocationResult::Success(_) => {
                self.invoker.logger().debug(
                    LogCategory::Action,
                    format!("{action} succeeded"),
                    Some(json!({ "locator": locator, "options": options })),
                );
                Ok(())
            }
            InvocationResult::Failure(failure) => Err(FlexError::ActionFailed {
                action,
                locator: locator.to_string(),
                options: options.to_string(),
                message: failure.message,
            }),
        }
    }

    pub async fn click(&self, locator: &str, options: &str) -> Result<(), FlexError> {
        self.run(FlexAction::Click, locator, options).await
    }

    pub async fn double_click(&self, locator: &str, options: &str) -> Result<(), FlexError> {
        self.run(FlexAction::DoubleClick, locator, options).await
    }

    pub async fn type_text(&self, locator: &str, options: &str) -> Result<(), FlexError> {
        self.run(FlexAction::Type, locator, options).await
    }

    pub async fn select(&self, locator: &str, options: &str) -> Result<(), FlexError> {
        self.run(FlexAction::Select, locator, options).await
    }

    pub async fn drag_drop_elem_to_elem(&self, locator: &str, options: &str) -> Result<(), FlexError> {
        self.run(FlexAction::DragDropElemToElem, locator, options).await
    }

    pub async fn drag_drop_to_coords(&self, locator: &str, options: &str) -> Result<(), FlexError> {
        self.run(FlexAction::DragDropToCoords, locator, options).await
    }

    pub async fn assert_display_object(&self, locator: &str, options: &str) -> Result<(), FlexError> {
        self.run(FlexAction::AssertDisplayObject, locator, options).await
    }

    pub async fn assert_text_in(&self, locator: &str, options: &str) -> Result<(), FlexError> {
        self.run(FlexAction::AssertTextIn, locator, options).await
    }

    pub async fn assert_text(&self, locator: &str, options: &str) -> Result<(), FlexError> {
        self.run(FlexAction::AssertText, locator, options).await
    }

    pub async fn assert_property(&self, locator: &str, options: &str) -> Result<(), FlexError> {
        self.run(FlexAction::AssertProperty, locator, options).await
    }

    /// Whether the movie exposes its automation API yet.
    ///
    /// Only probes for the marker method; never goes through the bridge.
    pub async fn is_ready(&self, locator: &str) -> Result<bool, FlexError> {
        let target = self.locate(locator).await?;
        let present = self
            .invoker
            .host()
            .has_method(target.resolve(), &self.ready_method)
            .await?;
        if present {
            Ok(true)
        } else {
            Err(FlexError::NotReady {
                locator: locator.to_string(),
            })
        }
    }

    /// Whether the display object described by `options` exists in the movie.
    pub async fn is_flex_object(&self, locator: &str, options: &str) -> Result<bool, FlexError> {
        self.run(FlexAction::AssertDisplayObject, locator, options)
            .await
            .map(|()| true)
    }
}

#[async_trait]
impl FlexCommandExecutor for FlexCommands {
    async fn execute(
        &self,
        action: FlexAction,
        locator: &str,
        options: &str,
    ) -> Result<(), FlexError> {
        self.run(action, locator, options).await
    }

    async fn wait_for_ready(&self, locator: &str, timeout: Duration) -> Result<(), FlexError> {
        poll_until(locator, timeout, self.poll_interval, || async {
            self.is_ready(locator).await.map(|_| ())
        })
        .await
    }

    async fn wait_for_object(
        &self,
        locator: &str,
        options: &str,
        timeout: Duration,
    ) -> Result<(), FlexError> {
        poll_until(locator, timeout, self.poll_interval, || async {
            self.is_flex_object(locator, options).await.map(|_| ())
        })
        .await
    }
}

/// Retry `check` until it succeeds or `timeout` elapses.
///
/// Permanent failures (see [`FlexError::is_permanent`]) abort immediately;
/// everything else is treated as "not yet".
async fn poll_until<F, Fut>(
    locator: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<(), FlexError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), FlexError>>,
{
    let started = Instant::now();
    loop {
        let last_error = match check().await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_permanent() => return Err(err),
            Err(err) => err,
        };
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(FlexError::Timeout {
                locator: locator.to_string(),
                waited_ms: elapsed.as_millis(),
                last_error: last_error.to_string(),
            });
        }
        time::sleep(interval.min(timeout - elapsed)).await;
    }
}
