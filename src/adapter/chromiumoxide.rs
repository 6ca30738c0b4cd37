//! Chromiumoxide-backed host collaborators.
//!
//! [`ChromiumoxideHost`] binds one page of a [`ChromiumoxideRuntime`] and
//! implements the element finder, plugin host and bridge channel by
//! evaluating the embedded helper bundle in that page.

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::page::Page;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::browser::BrowserRuntimeError;
use crate::dom_scripts::helper_call;
use crate::host::{BridgeChannel, DirectCallError, ElementFinder, HostError, PluginArgument, PluginHost};
use crate::locator::{Locator, LocatorError};
use crate::runtime::ChromiumoxideRuntime;
use crate::target::PluginTarget;

fn map_runtime_error(err: BrowserRuntimeError) -> HostError {
    HostError::Transport(err.to_string())
}

fn map_page_error(err: impl std::fmt::Display) -> HostError {
    HostError::Transport(err.to_string())
}

fn map_locator_error(err: LocatorError) -> HostError {
    HostError::Message(err.to_string())
}

fn js_string(value: &str) -> String {
    JsonValue::String(value.to_string()).to_string()
}

#[derive(Deserialize)]
struct FindReply {
    found: bool,
    #[serde(default)]
    target: Option<PluginTarget>,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
enum CallReply {
    Ok {
        #[serde(default)]
        value: JsonValue,
    },
    Missing,
    NotFound,
    Threw {
        message: String,
    },
    Blocked {
        message: String,
    },
}

impl CallReply {
    fn into_result(self, target: &PluginTarget, method: &str) -> Result<JsonValue, DirectCallError> {
        match self {
            CallReply::Ok { value } => Ok(value),
            CallReply::Missing => Err(DirectCallError::MissingMethod {
                method: method.to_string(),
            }),
            CallReply::NotFound => Err(HostError::ElementNotFound(target.locator.clone()).into()),
            CallReply::Threw { message } => Err(DirectCallError::Threw {
                method: method.to_string(),
                message,
            }),
            CallReply::Blocked { message } => Err(DirectCallError::Blocked {
                method: method.to_string(),
                reason: message,
            }),
        }
    }
}

/// Encoded arguments of the bridge helpers: the element id, then the value
/// or handler source when the helper takes one.
fn bridge_args(element_id: &str, extra: Option<&str>) -> Vec<String> {
    let mut args = vec![js_string(element_id)];
    if let Some(extra) = extra {
        args.push(js_string(extra));
    }
    args
}

/// Host collaborators for a single chromiumoxide page.
#[derive(Clone)]
pub struct ChromiumoxideHost {
    runtime: Arc<ChromiumoxideRuntime>,
    page_id: String,
}

impl ChromiumoxideHost {
    pub fn new(runtime: Arc<ChromiumoxideRuntime>, page_id: impl Into<String>) -> Self {
        Self {
            runtime,
            page_id: page_id.into(),
        }
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    async fn resolve_page(&self) -> Result<Page, HostError> {
        self.runtime
            .page(&self.page_id)
            .await
            .map_err(map_runtime_error)
    }

    /// Evaluate a helper and decode the JSON string it returns.
    async fn helper<T: DeserializeOwned>(&self, function: &str, args: &[String]) -> Result<T, HostError> {
        let page = self.resolve_page().await?;
        let encoded: String = page
            .evaluate(helper_call(function, args))
            .await
            .map_err(map_page_error)?
            .into_value()
            .map_err(map_page_error)?;
        serde_json::from_str(&encoded)
            .map_err(|err| HostError::Message(format!("unexpected reply from {function}: {err}")))
    }

    async fn bridge_helper(&self, function: &str, element_id: &str, extra: Option<&str>) -> Result<(), HostError> {
        let done: bool = self.helper(function, &bridge_args(element_id, extra)).await?;
        if done {
            Ok(())
        } else {
            Err(HostError::ElementNotFound(element_id.to_string()))
        }
    }

    fn locate_args(target: &PluginTarget) -> Result<Vec<String>, HostError> {
        let locator = Locator::parse(&target.locator).map_err(map_locator_error)?;
        Ok(vec![
            js_string(locator.strategy.as_str()),
            js_string(&locator.criteria),
        ])
    }
}

#[async_trait]
impl ElementFinder for ChromiumoxideHost {
    async fn find_element(&self, locator: &Locator) -> Result<PluginTarget, HostError> {
        let reply: FindReply = self
            .helper(
                "find",
                &[
                    js_string(locator.strategy.as_str()),
                    js_string(&locator.criteria),
                    js_string(&locator.to_string()),
                ],
            )
            .await?;
        match reply.target {
            Some(target) if reply.found => Ok(target),
            _ => Err(HostError::ElementNotFound(locator.to_string())),
        }
    }
}

#[async_trait]
impl PluginHost for ChromiumoxideHost {
    async fn call_method(
        &self,
        target: &PluginTarget,
        method: &str,
        argument: &PluginArgument,
    ) -> Result<JsonValue, DirectCallError> {
        let mut args = Self::locate_args(target)?;
        args.push(js_string(method));
        args.push(argument.to_script_literal());

        let reply: CallReply = self.helper("call", &args).await?;
        reply.into_result(target, method)
    }

    async fn has_method(&self, target: &PluginTarget, method: &str) -> Result<bool, HostError> {
        let mut args = Self::locate_args(target)?;
        args.push(js_string(method));
        self.helper("hasMethod", &args).await
    }
}

#[async_trait]
impl BridgeChannel for ChromiumoxideHost {
    async fn acquire(&self, element_id: &str) -> Result<(), HostError> {
        self.bridge_helper("acquire", element_id, None).await
    }

    async fn set_value(&self, element_id: &str, value: &str) -> Result<(), HostError> {
        self.bridge_helper("setValue", element_id, Some(value)).await
    }

    async fn set_click_handler(&self, element_id: &str, script: &str) -> Result<(), HostError> {
        self.bridge_helper("setClickHandler", element_id, Some(script))
            .await
    }

    async fn dispatch_click(&self, element_id: &str) -> Result<(), HostError> {
        self.bridge_helper("click", element_id, None).await
    }

    async fn value(&self, element_id: &str) -> Result<String, HostError> {
        let value: Option<String> = self.helper("value", &[js_string(element_id)]).await?;
        value.ok_or_else(|| HostError::ElementNotFound(element_id.to_string()))
    }
}
