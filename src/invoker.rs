//! Calling methods on plugin objects.
//!
//! [`PluginInvoker::invoke`] parses the raw options, tries a direct call on the
//! (unwrapped) target and, when the page refuses or the method throws, retries
//! through the bridge element so the call runs in the page's own context.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

use crate::bridge::{self, BridgeOutcome, BridgeResultMode};
use crate::config::FlexConfig;
use crate::host::{BridgeChannel, DirectCallError, HostError, PluginArgument, PluginHost};
use crate::logging::{FlexLogger, LogCategory};
use crate::options::{OptionsMap, parse_options};
use crate::target::PluginTarget;

/// How options are handed to the plugin on the direct path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationMode {
    /// JSON string when the host supports it, raw object otherwise.
    #[default]
    Auto,
    Json,
    Raw,
}

impl SerializationMode {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(SerializationMode::Auto),
            "json" => Some(SerializationMode::Json),
            "raw" | "object" => Some(SerializationMode::Raw),
            _ => None,
        }
    }
}

/// A plugin call that reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationFailure {
    pub message: String,
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of a plugin call.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    Success(JsonValue),
    Failure(InvocationFailure),
}

impl InvocationResult {
    /// Classify a value returned by a plugin method: an object with a
    /// `message` field is a failure, anything else is success.
    pub fn from_value(value: JsonValue) -> Self {
        match value.get("message") {
            Some(message) if value.is_object() => {
                let message = message
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| message.to_string());
                InvocationResult::Failure(InvocationFailure { message })
            }
            _ => InvocationResult::Success(value),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success(_))
    }

    pub fn failure(&self) -> Option<&InvocationFailure> {
        match self {
            InvocationResult::Failure(failure) => Some(failure),
            InvocationResult::Success(_) => None,
        }
    }
}

/// Errors that stop an invocation before the plugin could report an outcome.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("direct invocation of '{method}' failed: {source}")]
    Direct {
        method: String,
        #[source]
        source: DirectCallError,
    },
    #[error("bridge channel failed while invoking '{method}': {source}")]
    Bridge {
        method: String,
        #[source]
        source: HostError,
    },
    #[error("target '{locator}' has neither an id nor a name to address it from the page")]
    UnaddressableTarget { locator: String },
}

/// Settings the invoker reads from [`FlexConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokerSettings {
    pub bridge_element_id: String,
    pub sentinel: String,
    pub failure_marker: String,
    pub serialization: SerializationMode,
    pub result_mode: BridgeResultMode,
}

impl From<&FlexConfig> for InvokerSettings {
    fn from(config: &FlexConfig) -> Self {
        Self {
            bridge_element_id: config.bridge_element_id.clone(),
            sentinel: config.bridge_sentinel.clone(),
            failure_marker: config.failure_marker.clone(),
            serialization: config.serialization,
            result_mode: config.bridge_result_mode,
        }
    }
}

impl Default for InvokerSettings {
    fn default() -> Self {
        InvokerSettings::from(&FlexConfig::default())
    }
}

/// Calls plugin methods directly, falling back to the page-context bridge.
#[derive(Clone)]
pub struct PluginInvoker {
    host: Arc<dyn PluginHost>,
    bridge: Arc<dyn BridgeChannel>,
    settings: InvokerSettings,
    logger: Arc<FlexLogger>,
}

impl fmt::Debug for PluginInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInvoker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PluginInvoker {
    pub fn new(
        host: Arc<dyn PluginHost>,
        bridge: Arc<dyn BridgeChannel>,
        settings: InvokerSettings,
        logger: Arc<FlexLogger>,
    ) -> Self {
        Self {
            host,
            bridge,
            settings,
            logger,
        }
    }

    pub fn settings(&self) -> &InvokerSettings {
        &self.settings
    }

    pub(crate) fn host(&self) -> &Arc<dyn PluginHost> {
        &self.host
    }

    pub(crate) fn logger(&self) -> &Arc<FlexLogger> {
        &self.logger
    }

    /// Call `method` on `target` with options parsed from `raw_options`.
    pub async fn invoke(
        &self,
        target: &PluginTarget,
        method: &str,
        raw_options: &str,
    ) -> Result<InvocationResult, InvokeError> {
        let options = parse_options(raw_options);
        self.invoke_with_options(target, method, &options).await
    }

    pub async fn invoke_with_options(
        &self,
        target: &PluginTarget,
        method: &str,
        options: &OptionsMap,
    ) -> Result<InvocationResult, InvokeError> {
        let target = target.resolve();
        let argument = self.direct_argument(options);

        match self.host.call_method(target, method, &argument).await {
            Ok(value) => {
                self.logger.debug(
                    LogCategory::Invoke,
                    format!("{method} answered directly"),
                    Some(json!({ "locator": target.locator, "result": value })),
                );
                Ok(self.report(method, InvocationResult::from_value(value)))
            }
            Err(err) if err.requires_bridge() => {
                self.logger.debug(
                    LogCategory::Invoke,
                    format!("direct call to {method} unavailable ({err}); using bridge"),
                    None,
                );
                let result = self.invoke_bridged(target, method, options).await?;
                Ok(self.report(method, result))
            }
            Err(source) => Err(InvokeError::Direct {
                method: method.to_string(),
                source,
            }),
        }
    }

    fn direct_argument(&self, options: &OptionsMap) -> PluginArgument {
        let as_json = match self.settings.serialization {
            SerializationMode::Auto => self.host.supports_json(),
            SerializationMode::Json => true,
            SerializationMode::Raw => false,
        };
        if as_json {
            PluginArgument::Json(options.to_json_string())
        } else {
            PluginArgument::Object(options.to_value())
        }
    }

    async fn invoke_bridged(
        &self,
        target: &PluginTarget,
        method: &str,
        options: &OptionsMap,
    ) -> Result<InvocationResult, InvokeError> {
        let params = options.to_json_string();
        let element_id = self.settings.bridge_element_id.as_str();
        let bridge_err = |source: HostError| InvokeError::Bridge {
            method: method.to_string(),
            source,
        };

        self.bridge.acquire(element_id).await.map_err(bridge_err)?;
        self.bridge
            .set_value(element_id, &self.settings.sentinel)
            .await
            .map_err(bridge_err)?;

        let lookup = target
            .bridge_lookup()
            .ok_or_else(|| InvokeError::UnaddressableTarget {
                locator: target.locator.clone(),
            })?;
        let script = bridge::click_handler_script(
            element_id,
            &lookup,
            method,
            &params,
            self.settings.result_mode,
        );
        self.bridge
            .set_click_handler(element_id, &script)
            .await
            .map_err(bridge_err)?;
        self.bridge
            .dispatch_click(element_id)
            .await
            .map_err(bridge_err)?;

        let written = self.bridge.value(element_id).await.map_err(bridge_err)?;
        self.logger.debug(
            LogCategory::Bridge,
            format!("bridge wrote back '{written}' for {method}"),
            None,
        );

        let outcome = bridge::decode_write_back(
            &written,
            self.settings.result_mode,
            &self.settings.failure_marker,
            method,
            &params,
        );
        Ok(match outcome {
            BridgeOutcome::Success(value) => InvocationResult::Success(value),
            BridgeOutcome::Failure(message) => {
                InvocationResult::Failure(InvocationFailure { message })
            }
        })
    }

    fn report(&self, method: &str, result: InvocationResult) -> InvocationResult {
        if let InvocationResult::Failure(failure) = &result {
            self.logger
                .info(LogCategory::Invoke, format!("{method} failed: {failure}"), None);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::simulated::{MethodBehavior, SimulatedPage};

    fn invoker_with(page: Arc<SimulatedPage>, settings: InvokerSettings) -> PluginInvoker {
        PluginInvoker::new(page.clone(), page, settings, Arc::new(FlexLogger::quiet()))
    }

    fn movie() -> PluginTarget {
        PluginTarget::new("id=movie1").with_id("movie1")
    }

    #[tokio::test]
    async fn direct_success_skips_bridge() {
        let page = Arc::new(SimulatedPage::new().with_method("fp_click", MethodBehavior::Return(json!(true))));
        let invoker = invoker_with(page.clone(), InvokerSettings::default());

        let result = invoker.invoke(&movie(), "fp_click", "").await.unwrap();

        assert_eq!(result, InvocationResult::Success(json!(true)));
        assert_eq!(page.clicks(), 0);
        assert_eq!(*page.bridge_acquisitions.lock().unwrap(), 0);
        let calls = page.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].argument, PluginArgument::Json("{}".into()));
    }

    #[tokio::test]
    async fn direct_error_object_is_failure() {
        let page = Arc::new(SimulatedPage::new().with_method(
            "fp_assertText",
            MethodBehavior::Return(json!({"message": "expected Hello"})),
        ));
        let invoker = invoker_with(page, InvokerSettings::default());

        let result = invoker
            .invoke(&movie(), "fp_assertText", "text=Hello")
            .await
            .unwrap();
        assert_eq!(
            result.failure().map(|f| f.message.as_str()),
            Some("expected Hello")
        );
    }

    #[tokio::test]
    async fn raw_objects_are_passed_without_json_support() {
        let mut page = SimulatedPage::new().with_method("fp_type", MethodBehavior::Return(json!(null)));
        page.json_support = false;
        let page = Arc::new(page);
        let invoker = invoker_with(page.clone(), InvokerSettings::default());

        let result = invoker.invoke(&movie(), "fp_type", "text=hi").await.unwrap();

        assert!(result.is_success());
        assert_eq!(
            page.calls()[0].argument,
            PluginArgument::Object(json!({"text": "hi"}))
        );
    }

    #[tokio::test]
    async fn thrown_direct_call_uses_bridge_and_detects_marker() {
        let page = Arc::new(
            SimulatedPage::new()
                .with_method("fp_assertText", MethodBehavior::Throw("blocked".into()))
                .with_bridge_response("[object Object]"),
        );
        let invoker = invoker_with(page.clone(), InvokerSettings::default());

        let result = invoker
            .invoke(&movie(), "fp_assertText", "text=Hello")
            .await
            .unwrap();

        let failure = result.failure().expect("failure");
        assert_eq!(
            failure.message,
            r#"fp_assertText with params {"text":"Hello"} failed."#
        );
        assert_eq!(page.clicks(), 1);
        assert_eq!(
            page.bridge_values_set.lock().unwrap().as_slice(),
            &["test".to_string()]
        );
        let handler = page.handler().expect("handler installed");
        assert!(handler.contains(r#"getElementById("movie1")["fp_assertText"]"#));
    }

    #[tokio::test]
    async fn bridge_success_reports_true() {
        let page = Arc::new(
            SimulatedPage::new()
                .with_method("fp_click", MethodBehavior::Throw("blocked".into()))
                .with_bridge_response("done"),
        );
        let invoker = invoker_with(page, InvokerSettings::default());

        let result = invoker.invoke(&movie(), "fp_click", "").await.unwrap();
        assert_eq!(result, InvocationResult::Success(json!(true)));
    }

    #[tokio::test]
    async fn missing_method_falls_back_to_bridge() {
        let page = Arc::new(SimulatedPage::new());
        let invoker = invoker_with(page.clone(), InvokerSettings::default());

        let result = invoker.invoke(&movie(), "fp_click", "").await.unwrap();

        // No response configured: the value stays at the sentinel.
        assert_eq!(result, InvocationResult::Success(json!(true)));
        assert_eq!(page.clicks(), 1);
    }

    #[tokio::test]
    async fn typed_mode_recovers_return_value() {
        let page = Arc::new(
            SimulatedPage::new()
                .with_method("fp_getText", MethodBehavior::Throw("blocked".into()))
                .with_bridge_response(r#"{"ok":true,"value":"object browser"}"#),
        );
        let settings = InvokerSettings {
            result_mode: BridgeResultMode::Typed,
            ..InvokerSettings::default()
        };
        let invoker = invoker_with(page, settings);

        let result = invoker.invoke(&movie(), "fp_getText", "").await.unwrap();
        assert_eq!(result, InvocationResult::Success(json!("object browser")));
    }

    #[tokio::test]
    async fn wrapped_targets_are_unwrapped_for_both_paths() {
        let page = Arc::new(
            SimulatedPage::new()
                .with_method("fp_click", MethodBehavior::Throw("blocked".into()))
                .with_bridge_response("true"),
        );
        let invoker = invoker_with(page.clone(), InvokerSettings::default());
        let target = PluginTarget::new("id=movie1")
            .with_id("outer-wrapper")
            .wrapping(PluginTarget::new("id=movie1").with_id("movie1"));

        invoker.invoke(&target, "fp_click", "").await.unwrap();

        assert_eq!(page.calls()[0].target_id.as_deref(), Some("movie1"));
        let handler = page.handler().unwrap();
        assert!(handler.contains(r#"getElementById("movie1")"#));
        assert!(!handler.contains("outer-wrapper"));
    }

    #[tokio::test]
    async fn unaddressable_target_is_an_error() {
        let page = Arc::new(SimulatedPage::new());
        let invoker = invoker_with(page, InvokerSettings::default());

        let err = invoker
            .invoke(&PluginTarget::new("css=object"), "fp_click", "")
            .await
            .expect_err("no id or name");
        assert!(matches!(err, InvokeError::UnaddressableTarget { .. }));
    }

    #[test]
    fn classification_of_returned_values() {
        assert!(InvocationResult::from_value(json!(true)).is_success());
        assert!(InvocationResult::from_value(json!("message")).is_success());
        assert!(InvocationResult::from_value(json!({"ok": 1})).is_success());
        assert_eq!(
            InvocationResult::from_value(json!({"message": 42})),
            InvocationResult::Failure(InvocationFailure {
                message: "42".into()
            })
        );
    }
}
