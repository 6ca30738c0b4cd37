//! Page-context bridge used when a direct plugin call is refused.
//!
//! The bridge element's inline click handler looks the movie up again from
//! inside the page, calls the method and writes the outcome into the element's
//! `value`. Dispatching a synthetic click runs the handler with the page's own
//! privileges; the caller then reads the value back.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::target::BridgeLookup;

/// Default id of the bridge element.
pub const DEFAULT_BRIDGE_ELEMENT_ID: &str = "ws-sel-bridge";
/// Value written to the bridge before each call.
pub const DEFAULT_BRIDGE_SENTINEL: &str = "test";
/// Substring marking an error object in compatibility mode.
pub const DEFAULT_FAILURE_MARKER: &str = "object";

/// How the click handler reports the plugin's return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeResultMode {
    /// Write the raw return value; only success/failure survives.
    #[default]
    Compat,
    /// Write a JSON envelope carrying the return value and its outcome.
    Typed,
}

impl BridgeResultMode {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compat" | "compatibility" => Some(BridgeResultMode::Compat),
            "typed" => Some(BridgeResultMode::Typed),
            _ => None,
        }
    }
}

/// What the bridge reported back.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeOutcome {
    Success(JsonValue),
    Failure(String),
}

fn js_string(value: &str) -> String {
    JsonValue::String(value.to_string()).to_string()
}

fn lookup_expression(lookup: &BridgeLookup) -> String {
    match lookup {
        BridgeLookup::Id(id) => format!("window.document.getElementById({})", js_string(id)),
        BridgeLookup::Name(name) => {
            format!("window.document.getElementsByName({})[0]", js_string(name))
        }
    }
}

/// Build the inline click handler for one bridged call.
///
/// `params` is the JSON-encoded options string; it is embedded as a string
/// literal so quotes inside option values cannot break out of the script.
pub fn click_handler_script(
    element_id: &str,
    lookup: &BridgeLookup,
    method: &str,
    params: &str,
    mode: BridgeResultMode,
) -> String {
    let bridge = format!("window.document.getElementById({})", js_string(element_id));
    let call = format!(
        "{}[{}]({})",
        lookup_expression(lookup),
        js_string(method),
        js_string(params)
    );
    match mode {
        BridgeResultMode::Compat => format!("{bridge}.value = {call};"),
        BridgeResultMode::Typed => format!(
            "(function () {{ var b = {bridge}; try {{ var r = {call}; \
             var failed = r !== null && typeof r === \"object\" && \"message\" in r; \
             b.value = JSON.stringify({{ ok: !failed, value: r === undefined ? null : r }}); \
             }} catch (e) {{ b.value = JSON.stringify({{ ok: false, value: {{ message: String(e && e.message || e) }} }}); }} }})();"
        ),
    }
}

#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    value: JsonValue,
}

/// Interpret the bridge element's value after the click.
///
/// In compatibility mode any value containing `failure_marker` is a failure
/// and everything else is `true`. Typed mode decodes the envelope and falls
/// back to the compatibility rule for values that are not envelopes.
pub fn decode_write_back(
    written: &str,
    mode: BridgeResultMode,
    failure_marker: &str,
    method: &str,
    params: &str,
) -> BridgeOutcome {
    if mode == BridgeResultMode::Typed {
        if let Ok(envelope) = serde_json::from_str::<Envelope>(written) {
            if envelope.ok {
                return BridgeOutcome::Success(envelope.value);
            }
            let message = envelope
                .value
                .get("message")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| failure_message(method, params));
            return BridgeOutcome::Failure(message);
        }
    }
    if written.contains(failure_marker) {
        BridgeOutcome::Failure(failure_message(method, params))
    } else {
        BridgeOutcome::Success(JsonValue::Bool(true))
    }
}

pub(crate) fn failure_message(method: &str, params: &str) -> String {
    format!("{method} with params {params} failed.")
}
