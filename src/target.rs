//! Handles to plugin objects embedded in a page.

use serde::{Deserialize, Serialize};

/// A plugin object found in the page, e.g. an `<object>`/`<embed>` movie.
///
/// Some hosts hand back a wrapper around the real scriptable object. When a
/// target carries an `inner` handle, every call must go to the innermost
/// object; use [`PluginTarget::resolve`] before talking to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginTarget {
    /// Locator the target was found with.
    pub locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<PluginTarget>>,
}

/// How page-context script finds a target again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeLookup {
    /// `document.getElementById(..)`
    Id(String),
    /// `document.getElementsByName(..)[0]`
    Name(String),
}

impl PluginTarget {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            id: None,
            name: None,
            inner: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Wrap `inner` so that this handle becomes the outer wrapper.
    pub fn wrapping(mut self, inner: PluginTarget) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    pub fn is_wrapped(&self) -> bool {
        self.inner.is_some()
    }

    /// The object calls must be made against: the innermost wrapped handle,
    /// or `self` when nothing is wrapped.
    pub fn resolve(&self) -> &PluginTarget {
        let mut current = self;
        while let Some(inner) = current.inner.as_deref() {
            current = inner;
        }
        current
    }

    /// Identifier for page-context lookups: a non-empty `id`, else a non-empty
    /// `name`.
    pub fn bridge_lookup(&self) -> Option<BridgeLookup> {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        non_empty(&self.id)
            .map(BridgeLookup::Id)
            .or_else(|| non_empty(&self.name).map(BridgeLookup::Name))
    }
}
