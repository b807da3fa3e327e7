use serde_json::json;
use tracepipe::logs::{LogHandler, LogRecord};
use tracepipe::{Context, Key, KeyValue};

use crate::common::{attributes_json, unix_nanos};

/// Writes each log record as one JSON line on stdout.
#[derive(Clone, Debug, Default)]
pub struct StdoutLogHandler {
    base_attributes: Vec<KeyValue>,
    group: Option<String>,
}

impl StdoutLogHandler {
    /// Create a new handler.
    pub fn new() -> Self {
        StdoutLogHandler::default()
    }
}

impl LogHandler for StdoutLogHandler {
    fn handle(&self, _cx: &Context, mut record: LogRecord) {
        if let Some(group) = &self.group {
            for attribute in &mut record.attributes {
                attribute.key = Key::new(format!("{group}.{}", attribute.key));
            }
        }
        record.attributes.extend(self.base_attributes.clone());
        let line = json!({
            "kind": "log",
            "time_unix_nano": unix_nanos(record.timestamp).to_string(),
            "severity": record.severity.as_str(),
            "body": record.body.as_ref(),
            "attributes": attributes_json(&record.attributes),
        });
        println!("{line}");
    }

    fn with_attributes(&self, attributes: Vec<KeyValue>) -> Box<dyn LogHandler> {
        let mut handler = self.clone();
        handler.base_attributes.extend(attributes);
        Box::new(handler)
    }

    fn with_group(&self, name: &str) -> Box<dyn LogHandler> {
        let mut handler = self.clone();
        handler.group = Some(match &self.group {
            Some(group) => format!("{group}.{name}"),
            None => name.to_string(),
        });
        Box::new(handler)
    }
}
