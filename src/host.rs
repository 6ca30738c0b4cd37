//! Collaborators supplied by the browser host.
//!
//! Flex commands never touch the browser directly. Finding elements, calling
//! methods on a plugin object, driving the bridge element, and forwarding
//! commands to a remote executor all go through the traits below so the core
//! can run against a real page (see [`crate::adapter::chromiumoxide`]) or an
//! in-memory simulation in tests.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::locator::Locator;
use crate::target::PluginTarget;

/// Errors reported by host collaborators.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0}")]
    Message(String),
    #[error("element '{0}' not found")]
    ElementNotFound(String),
    #[error("browser transport error: {0}")]
    Transport(String),
}

/// Why a direct plugin call did not produce a value.
#[derive(Debug, Error)]
pub enum DirectCallError {
    /// The host refused to call across execution contexts.
    #[error("direct call to '{method}' was blocked: {reason}")]
    Blocked { method: String, reason: String },
    /// The plugin method raised.
    #[error("'{method}' threw: {message}")]
    Threw { method: String, message: String },
    /// The target does not expose the method to the caller's context.
    #[error("'{method}' is not callable on the target")]
    MissingMethod { method: String },
    #[error(transparent)]
    Host(#[from] HostError),
}

impl DirectCallError {
    /// Whether the call should be retried through the page-context bridge.
    ///
    /// Anything the page itself reported counts. Transport failures do not:
    /// the bridge would fail the same way.
    pub fn requires_bridge(&self) -> bool {
        !matches!(self, DirectCallError::Host(_))
    }
}

/// Argument passed to a plugin method.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginArgument {
    /// JSON-encoded options string.
    Json(String),
    /// Options object handed over as-is for hosts without JSON support.
    Object(JsonValue),
}

impl PluginArgument {
    /// JavaScript source for this argument.
    pub fn to_script_literal(&self) -> String {
        match self {
            PluginArgument::Json(encoded) => JsonValue::String(encoded.clone()).to_string(),
            PluginArgument::Object(value) => value.to_string(),
        }
    }
}

/// Resolves locators to plugin targets.
#[async_trait]
pub trait ElementFinder: Send + Sync {
    async fn find_element(&self, locator: &Locator) -> Result<PluginTarget, HostError>;
}

/// Calls methods on plugin objects from the automation context.
#[async_trait]
pub trait PluginHost: Send + Sync {
    /// Whether options can be handed over as a JSON string.
    fn supports_json(&self) -> bool {
        true
    }

    async fn call_method(
        &self,
        target: &PluginTarget,
        method: &str,
        argument: &PluginArgument,
    ) -> Result<JsonValue, DirectCallError>;

    async fn has_method(&self, target: &PluginTarget, method: &str) -> Result<bool, HostError>;
}

/// Page-scoped element used to run plugin calls from the page's own context.
///
/// One element per page, addressed by `element_id`. It is created on first
/// use and never removed; callers reset its value before every use.
#[async_trait]
pub trait BridgeChannel: Send + Sync {
    /// Find the element, creating it when absent.
    async fn acquire(&self, element_id: &str) -> Result<(), HostError>;

    async fn set_value(&self, element_id: &str, value: &str) -> Result<(), HostError>;

    /// Install `script` as the element's inline click handler.
    async fn set_click_handler(&self, element_id: &str, script: &str) -> Result<(), HostError>;

    /// Synthesize and dispatch a `click` event. Handlers run before this returns.
    async fn dispatch_click(&self, element_id: &str) -> Result<(), HostError>;

    async fn value(&self, element_id: &str) -> Result<String, HostError>;
}

/// Forwards commands to a remote executor.
#[async_trait]
pub trait RemoteDispatcher: Send + Sync {
    async fn do_command(&self, command: &str, args: &[String]) -> Result<JsonValue, HostError>;
}

#[cfg(test)]
pub(crate) mod simulated {
    //! In-memory page used by unit tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    pub enum MethodBehavior {
        Return(JsonValue),
        Throw(String),
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedCall {
        pub target_id: Option<String>,
        pub method: String,
        pub argument: PluginArgument,
    }

    #[derive(Default)]
    pub struct SimulatedPage {
        pub json_support: bool,
        pub targets: Mutex<HashMap<String, PluginTarget>>,
        pub methods: Mutex<HashMap<String, MethodBehavior>>,
        pub calls: Mutex<Vec<RecordedCall>>,
        pub probes: Mutex<Vec<(Option<String>, String)>>,
        pub bridge_response: Mutex<Option<String>>,
        pub bridge_value: Mutex<Option<String>>,
        pub bridge_handler: Mutex<Option<String>>,
        pub bridge_acquisitions: Mutex<usize>,
        pub bridge_values_set: Mutex<Vec<String>>,
        pub bridge_clicks: Mutex<usize>,
        pub transport_failure: Option<String>,
    }

    impl SimulatedPage {
        pub fn new() -> Self {
            Self {
                json_support: true,
                ..Default::default()
            }
        }

        pub fn with_target(self, criteria: &str, target: PluginTarget) -> Self {
            self.targets
                .lock()
                .unwrap()
                .insert(criteria.to_string(), target);
            self
        }

        pub fn with_method(self, method: &str, behavior: MethodBehavior) -> Self {
            self.methods
                .lock()
                .unwrap()
                .insert(method.to_string(), behavior);
            self
        }

        /// Every browser round trip fails as if the connection dropped.
        pub fn with_transport_failure(mut self, reason: &str) -> Self {
            self.transport_failure = Some(reason.to_string());
            self
        }

        fn transport(&self) -> Result<(), HostError> {
            match &self.transport_failure {
                Some(reason) => Err(HostError::Transport(reason.clone())),
                None => Ok(()),
            }
        }

        pub fn with_bridge_response(self, response: &str) -> Self {
            *self.bridge_response.lock().unwrap() = Some(response.to_string());
            self
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clicks(&self) -> usize {
            *self.bridge_clicks.lock().unwrap()
        }

        pub fn handler(&self) -> Option<String> {
            self.bridge_handler.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ElementFinder for SimulatedPage {
        async fn find_element(&self, locator: &Locator) -> Result<PluginTarget, HostError> {
            self.targets
                .lock()
                .unwrap()
                .get(&locator.criteria)
                .cloned()
                .ok_or_else(|| HostError::ElementNotFound(locator.to_string()))
        }
    }

    #[async_trait]
    impl PluginHost for SimulatedPage {
        fn supports_json(&self) -> bool {
            self.json_support
        }

        async fn call_method(
            &self,
            target: &PluginTarget,
            method: &str,
            argument: &PluginArgument,
        ) -> Result<JsonValue, DirectCallError> {
            self.calls.lock().unwrap().push(RecordedCall {
                target_id: target.id.clone(),
                method: method.to_string(),
                argument: argument.clone(),
            });
            self.transport()?;
            match self.methods.lock().unwrap().get(method) {
                Some(MethodBehavior::Return(value)) => Ok(value.clone()),
                Some(MethodBehavior::Throw(message)) => Err(DirectCallError::Threw {
                    method: method.to_string(),
                    message: message.clone(),
                }),
                None => Err(DirectCallError::MissingMethod {
                    method: method.to_string(),
                }),
            }
        }

        async fn has_method(
            &self,
            target: &PluginTarget,
            method: &str,
        ) -> Result<bool, HostError> {
            self.probes
                .lock()
                .unwrap()
                .push((target.id.clone(), method.to_string()));
            self.transport()?;
            Ok(self.methods.lock().unwrap().contains_key(method))
        }
    }

    #[async_trait]
    impl BridgeChannel for SimulatedPage {
        async fn acquire(&self, _element_id: &str) -> Result<(), HostError> {
            *self.bridge_acquisitions.lock().unwrap() += 1;
            let mut value = self.bridge_value.lock().unwrap();
            if value.is_none() {
                *value = Some(String::new());
            }
            Ok(())
        }

        async fn set_value(&self, _element_id: &str, value: &str) -> Result<(), HostError> {
            self.bridge_values_set
                .lock()
                .unwrap()
                .push(value.to_string());
            *self.bridge_value.lock().unwrap() = Some(value.to_string());
            Ok(())
        }

        async fn set_click_handler(&self, _element_id: &str, script: &str) -> Result<(), HostError> {
            *self.bridge_handler.lock().unwrap() = Some(script.to_string());
            Ok(())
        }

        async fn dispatch_click(&self, _element_id: &str) -> Result<(), HostError> {
            *self.bridge_clicks.lock().unwrap() += 1;
            if self.bridge_handler.lock().unwrap().is_some() {
                if let Some(response) = self.bridge_response.lock().unwrap().clone() {
                    *self.bridge_value.lock().unwrap() = Some(response);
                }
            }
            Ok(())
        }

        async fn value(&self, element_id: &str) -> Result<String, HostError> {
            self.bridge_value
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| HostError::ElementNotFound(element_id.to_string()))
        }
    }
}
