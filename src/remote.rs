//! Remote variants of the Flex actions.
//!
//! When the host runs commands through a remote executor, each action is sent
//! as `(command, [locator, options])` and the executor's reply is handed back
//! as-is.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::actions::{FlexAction, FlexCommandExecutor, FlexError};
use crate::host::RemoteDispatcher;

pub const WAIT_FOR_FLEX_READY: &str = "waitForFlexReady";
pub const WAIT_FOR_FLEX_OBJECT: &str = "waitForFlexObject";

/// Forwards Flex actions to a [`RemoteDispatcher`].
#[derive(Clone)]
pub struct RemoteFlexCommands {
    dispatcher: Arc<dyn RemoteDispatcher>,
}

impl fmt::Debug for RemoteFlexCommands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFlexCommands").finish_non_exhaustive()
    }
}

impl RemoteFlexCommands {
    /// Remote variants exist only when the host offers a dispatcher.
    pub fn detect(dispatcher: Option<Arc<dyn RemoteDispatcher>>) -> Option<Self> {
        match dispatcher {
            Some(dispatcher) => Some(Self { dispatcher }),
            None => {
                log::debug!("no remote dispatcher; remote Flex commands disabled");
                None
            }
        }
    }

    async fn forward(&self, command: &str, args: Vec<String>) -> Result<JsonValue, FlexError> {
        log::debug!("forwarding {command} {args:?}");
        self.dispatcher
            .do_command(command, &args)
            .await
            .map_err(|source| FlexError::Remote {
                command: command.to_string(),
                source,
            })
    }

    /// Send one action and return the executor's result untouched.
    pub async fn dispatch(
        &self,
        action: FlexAction,
        locator: &str,
        options: &str,
    ) -> Result<JsonValue, FlexError> {
        self.forward(
            action.command_name(),
            vec![locator.to_string(), options.to_string()],
        )
        .await
    }

    pub async fn wait_for_flex_ready(
        &self,
        locator: &str,
        timeout: Duration,
    ) -> Result<JsonValue, FlexError> {
        self.forward(
            WAIT_FOR_FLEX_READY,
            vec![locator.to_string(), timeout.as_millis().to_string()],
        )
        .await
    }

    pub async fn wait_for_flex_object(
        &self,
        locator: &str,
        options: &str,
    ) -> Result<JsonValue, FlexError> {
        self.forward(
            WAIT_FOR_FLEX_OBJECT,
            vec![locator.to_string(), options.to_string()],
        )
        .await
    }
}

#[async_trait]
impl FlexCommandExecutor for RemoteFlexCommands {
    async fn execute(
        &self,
        action: FlexAction,
        locator: &str,
        options: &str,
    ) -> Result<(), FlexError> {
        self.dispatch(action, locator, options).await.map(drop)
    }

    async fn wait_for_ready(&self, locator: &str, timeout: Duration) -> Result<(), FlexError> {
        self.wait_for_flex_ready(locator, timeout).await.map(drop)
    }

    /// The remote executor owns its own timeout for object waits.
    async fn wait_for_object(
        &self,
        locator: &str,
        options: &str,
        _timeout: Duration,
    ) -> Result<(), FlexError> {
        self.wait_for_flex_object(locator, options).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostError;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<(String, Vec<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl RemoteDispatcher for RecordingDispatcher {
        async fn do_command(&self, command: &str, args: &[String]) -> Result<JsonValue, HostError> {
            self.sent
                .lock()
                .unwrap()
                .push((command.to_string(), args.to_vec()));
            if self.fail {
                return Err(HostError::Transport("executor unreachable".into()));
            }
            Ok(json!({ "command": command, "status": "OK" }))
        }
    }

    #[test]
    fn absent_dispatcher_disables_remote_commands() {
        assert!(RemoteFlexCommands::detect(None).is_none());
    }

    #[tokio::test]
    async fn actions_forward_locator_and_options() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let remote = RemoteFlexCommands::detect(Some(dispatcher.clone())).expect("detected");

        let result = remote
            .dispatch(FlexAction::Type, "id=movie1", "chain=id:name,text=Alex")
            .await
            .unwrap();
        assert_eq!(result, json!({ "command": "flexType", "status": "OK" }));

        remote
            .wait_for_flex_ready("id=movie1", Duration::from_millis(1500))
            .await
            .unwrap();
        remote
            .wait_for_flex_object("id=movie1", "chain=id:panel")
            .await
            .unwrap();

        let sent = dispatcher.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                (
                    "flexType".to_string(),
                    vec!["id=movie1".to_string(), "chain=id:name,text=Alex".to_string()]
                ),
                (
                    "waitForFlexReady".to_string(),
                    vec!["id=movie1".to_string(), "1500".to_string()]
                ),
                (
                    "waitForFlexObject".to_string(),
                    vec!["id=movie1".to_string(), "chain=id:panel".to_string()]
                ),
            ]
        );
    }

    #[tokio::test]
    async fn dispatcher_errors_name_the_command() {
        let dispatcher = Arc::new(RecordingDispatcher {
            fail: true,
            ..Default::default()
        });
        let remote = RemoteFlexCommands::detect(Some(dispatcher)).unwrap();
        let err = remote
            .execute(FlexAction::Click, "id=movie1", "")
            .await
            .expect_err("transport failure");
        assert!(matches!(err, FlexError::Remote { ref command, .. } if command == "flexClick"));
    }
}
