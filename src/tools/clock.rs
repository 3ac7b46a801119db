//! Local date and time.

use super::Tool;
use crate::error::Result;
use serde_json::{Map, Value, json};

pub struct ClockTool;

impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Report the current local date and time. \
         Call this whenever the user asks what day, date, or time it is. \
         Takes no arguments."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn execute(&self, _args: &Map<String, Value>) -> Result<Value> {
        let now = chrono::Local::now();
        Ok(Value::from(
            now.format("%A %-d %B %Y, %H:%M").to_string(),
        ))
    }
}
