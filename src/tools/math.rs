//! Arithmetic over a list of numbers.

use super::Tool;
use crate::error::{Result, WispError};
use serde_json::{Map, Value, json};

pub struct MathTool;

impl Tool for MathTool {
    fn name(&self) -> &str {
        "math"
    }

    fn description(&self) -> &str {
        "CRITICAL: You MUST use this tool for ALL arithmetic operations. \
         NEVER calculate math directly - ALWAYS call this tool. \
         The function name is 'math' (use this exact name in tool calls). \
         Supported operations: add (+), sub (-), mul (*), div (/). \
         The 'op' parameter specifies which operation: 'add', 'sub', 'mul', or 'div'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "op": {
                    "type": "string",
                    "enum": ["add", "sub", "mul", "div"],
                    "description": "Operation to perform: 'add' (+), 'sub' (-), 'mul' (*), 'div' (/)."
                },
                "numbers": {
                    "type": "array",
                    "items": {"type": "number"},
                    "description": "Numbers to operate on, in order (at least one). \
                                    Extract ALL numbers from the user's question into this array."
                }
            },
            "required": ["op", "numbers"]
        })
    }

    fn execute(&self, args: &Map<String, Value>) -> Result<Value> {
        let op = args
            .get("op")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");

        let raw = args
            .get("numbers")
            .and_then(Value::as_array)
            .ok_or_else(|| WispError::Tool("'numbers' must be an array".to_owned()))?;
        let numbers: Vec<f64> = raw.iter().filter_map(coerce_number).collect();
        if numbers.len() != raw.len() {
            return Err(WispError::Tool(
                "'numbers' must contain only numbers".to_owned(),
            ));
        }
        if numbers.is_empty() {
            return Err(WispError::Tool(
                "'numbers' must be a non-empty array".to_owned(),
            ));
        }

        let result = match op {
            "add" => numbers.iter().sum::<f64>(),
            "sub" => numbers[1..].iter().fold(numbers[0], |acc, n| acc - n),
            "mul" => numbers.iter().product::<f64>(),
            "div" => {
                let mut acc = numbers[0];
                for &n in &numbers[1..] {
                    if n == 0.0 {
                        return Err(WispError::Tool("division by zero".to_owned()));
                    }
                    acc /= n;
                }
                acc
            }
            other => {
                return Err(WispError::Tool(format!(
                    "unknown op '{other}', use one of: add, sub, mul, div"
                )));
            }
        };
        Ok(Value::from(result))
    }
}

/// Models sometimes quote numbers; accept numeric strings too.
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
