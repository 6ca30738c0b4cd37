//! Structured logging for Flex commands.
//!
//! Every record is tagged with the layer that produced it. Records go to the
//! callback configured in [`FlexConfig::logger`] when there is one, and to the
//! `log` facade under `flexbridge::<category>` otherwise.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::{FlexConfig, LoggerCallback, Verbosity};

/// Layer a record comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Session,
    Action,
    Invoke,
    Bridge,
}

impl LogCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            LogCategory::Session => "session",
            LogCategory::Action => "action",
            LogCategory::Invoke => "invoke",
            LogCategory::Bridge => "bridge",
        }
    }

    fn target(self) -> &'static str {
        match self {
            LogCategory::Session => "flexbridge::session",
            LogCategory::Action => "flexbridge::action",
            LogCategory::Invoke => "flexbridge::invoke",
            LogCategory::Bridge => "flexbridge::bridge",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Outcomes of Flex actions. Shown from [`Verbosity::Medium`] up.
    Info,
    /// Direct/bridged call details. Shown at [`Verbosity::Detailed`].
    Debug,
}

impl LogLevel {
    fn enabled_at(self, verbose: Verbosity) -> bool {
        let required = match self {
            LogLevel::Info => 1,
            LogLevel::Debug => 2,
        };
        verbose.as_u8() >= required
    }

    fn facade_level(self) -> log::Level {
        match self {
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FlexLogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<Value>,
}

impl FlexLogRecord {
    /// One-line rendering handed to text callbacks, e.g.
    /// `[bridge] bridge wrote back 'true' for fp_click`.
    pub fn line(&self) -> String {
        match &self.auxiliary {
            Some(aux) if !aux.is_null() => {
                format!("[{}] {} {}", self.category, self.message, aux)
            }
            _ => format!("[{}] {}", self.category, self.message),
        }
    }
}

/// Receives every record that passes the verbosity filter.
pub type RecordSink = Arc<dyn Fn(&FlexLogRecord) + Send + Sync + 'static>;

pub struct FlexLogger {
    verbose: Verbosity,
    sink: Option<RecordSink>,
}

impl fmt::Debug for FlexLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlexLogger")
            .field("verbose", &self.verbose)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl FlexLogger {
    /// Logger honouring the verbosity and text callback of `config`.
    pub fn from_config(config: &FlexConfig) -> Self {
        Self {
            verbose: config.verbose,
            sink: config.logger.clone().map(text_sink),
        }
    }

    /// Logger at [`Verbosity::Minimal`]: no record passes the filter.
    pub fn quiet() -> Self {
        Self {
            verbose: Verbosity::Minimal,
            sink: None,
        }
    }

    pub fn with_sink(verbose: Verbosity, sink: RecordSink) -> Self {
        Self {
            verbose,
            sink: Some(sink),
        }
    }

    pub fn info(&self, category: LogCategory, message: impl Into<String>, auxiliary: Option<Value>) {
        self.emit(LogLevel::Info, category, message, auxiliary);
    }

    pub fn debug(
        &self,
        category: LogCategory,
        message: impl Into<String>,
        auxiliary: Option<Value>,
    ) {
        self.emit(LogLevel::Debug, category, message, auxiliary);
    }

    fn emit(
        &self,
        level: LogLevel,
        category: LogCategory,
        message: impl Into<String>,
        auxiliary: Option<Value>,
    ) {
        if !level.enabled_at(self.verbose) {
            return;
        }
        let record = FlexLogRecord {
            timestamp: Utc::now(),
            level,
            category,
            message: message.into(),
            auxiliary,
        };
        match &self.sink {
            Some(sink) => sink(&record),
            None => log::log!(target: category.target(), level.facade_level(), "{}", record.line()),
        }
    }
}

fn text_sink(callback: LoggerCallback) -> RecordSink {
    Arc::new(move |record: &FlexLogRecord| callback(&record.line()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn capturing(verbose: Verbosity) -> (FlexLogger, Arc<Mutex<Vec<FlexLogRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&records);
        let sink: RecordSink = Arc::new(move |record| capture.lock().unwrap().push(record.clone()));
        (FlexLogger::with_sink(verbose, sink), records)
    }

    #[test]
    fn verbosity_filters_levels() {
        let (minimal, records) = capturing(Verbosity::Minimal);
        minimal.info(LogCategory::Action, "clicked", None);
        assert!(records.lock().unwrap().is_empty());

        let (medium, records) = capturing(Verbosity::Medium);
        medium.info(LogCategory::Action, "clicked", None);
        medium.debug(LogCategory::Invoke, "fp_click answered directly", None);
        let values = records.lock().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].level, LogLevel::Info);
        assert_eq!(values[0].category, LogCategory::Action);
    }

    #[test]
    fn from_config_renders_lines_for_text_callback() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&lines);
        let callback: LoggerCallback = Arc::new(move |line: &str| {
            capture.lock().unwrap().push(line.to_string());
        });
        let config = FlexConfig {
            verbose: Verbosity::Detailed,
            logger: Some(callback),
            ..FlexConfig::default()
        };
        let logger = FlexLogger::from_config(&config);

        logger.debug(
            LogCategory::Bridge,
            "bridge wrote back 'true' for fp_click",
            None,
        );
        logger.info(
            LogCategory::Session,
            "opened about:blank",
            Some(serde_json::json!({ "pageId": "p1" })),
        );

        let values = lines.lock().unwrap();
        assert_eq!(
            values.as_slice(),
            &[
                "[bridge] bridge wrote back 'true' for fp_click".to_string(),
                r#"[session] opened about:blank {"pageId":"p1"}"#.to_string(),
            ]
        );
    }

    #[test]
    fn records_serialize_with_lowercase_tags() {
        let (logger, records) = capturing(Verbosity::Detailed);
        logger.debug(LogCategory::Invoke, "fp_type answered directly", None);

        let value = serde_json::to_value(&records.lock().unwrap()[0]).unwrap();
        assert_eq!(value["level"], "debug");
        assert_eq!(value["category"], "invoke");
        assert!(value.get("auxiliary").is_none());
        assert!(value["timestamp"].as_str().is_some());
    }
}
