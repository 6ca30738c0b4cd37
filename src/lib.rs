//! Drive Flash/Flex movies embedded in web pages.
//!
//! Options strings are parsed by [`options`], plugin methods are invoked by
//! [`invoker::PluginInvoker`] (directly, or through a page-context bridge
//! when the direct call is refused), and [`actions`], [`remote`] and
//! [`library`] layer named commands on top. [`session`] wires all of it to a
//! real Chromium page through `chromiumoxide`.

pub mod actions;
pub mod adapter;
pub mod bridge;
pub mod browser;
pub mod config;
pub mod dom_scripts;
pub mod host;
pub mod invoker;
pub mod library;
pub mod locator;
pub mod logging;
pub mod options;
pub mod remote;
pub mod runtime;
pub mod session;
pub mod target;

pub use actions::{FlexAction, FlexCommandExecutor, FlexCommands, FlexError};
pub use config::{FlexConfig, Verbosity};
pub use invoker::{InvocationFailure, InvocationResult, InvokeError, PluginInvoker};
pub use library::{FlexApplications, FlexLibrary, LibraryError};
pub use options::{OptionsMap, parse_options};
pub use remote::RemoteFlexCommands;
pub use session::{FlexPage, FlexSession};
pub use target::PluginTarget;
