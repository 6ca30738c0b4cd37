//! Page helper bundle embedding.
//!
//! The helpers live in `scripts/flex_host.js` so editors can highlight them;
//! they are bundled as a string at compile time.

/// Embedded contents of `scripts/flex_host.js`.
pub const FLEX_HOST_SCRIPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/flex_host.js"
));

/// Global under which the bundle installs itself.
pub const FLEX_HOST_GLOBAL: &str = "window.__flexbridge";

/// Script that installs the bundle (idempotently) and then calls
/// `function` with already-encoded JavaScript `args`.
pub fn helper_call(function: &str, args: &[String]) -> String {
    format!(
        "{FLEX_HOST_SCRIPT}\n{FLEX_HOST_GLOBAL}.{function}({});",
        args.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_script_exposes_helpers() {
        for helper in ["find:", "call:", "hasMethod:", "acquire:", "setClickHandler:", "click:"] {
            assert!(
                FLEX_HOST_SCRIPT.contains(helper),
                "helper bundle should define {helper}"
            );
        }
    }

    #[test]
    fn helper_call_appends_invocation() {
        let script = helper_call("value", &["\"ws-sel-bridge\"".to_string()]);
        assert!(script.starts_with(FLEX_HOST_SCRIPT));
        assert!(script.ends_with("window.__flexbridge.value(\"ws-sel-bridge\");"));
    }
}
