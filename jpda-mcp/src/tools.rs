// Debug tool schemas
//
// Thread ids are hex strings such as "0x1f2"; tools that take one default to
// the thread of the last stop.

use crate::protocol::Tool;
use serde_json::{json, Value};

fn tool(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn thread_only(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "thread_id": {
                "type": "string",
                "description": description
            }
        }
    })
}

pub fn get_tools() -> Vec<Tool> {
    vec![
        tool(
            "debug.launch",
            "Start a JVM with the JDWP agent and debug it",
            json!({
                "type": "object",
                "properties": {
                    "main_class": {
                        "type": "string",
                        "description": "Fully qualified main class (e.g., 'com.example.App')"
                    },
                    "args": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Program arguments"
                    },
                    "classpath": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Classpath entries (defaults to the configured classpath)"
                    }
                },
                "required": ["main_class"]
            }),
        ),
        tool(
            "debug.attach",
            "Connect to a JVM listening for a debugger via JDWP",
            json!({
                "type": "object",
                "properties": {
                    "host": {
                        "type": "string",
                        "description": "JVM host (e.g., 'localhost')",
                        "default": "localhost"
                    },
                    "port": {
                        "type": "integer",
                        "description": "JDWP port (e.g., 5005)",
                        "default": 5005
                    }
                },
                "required": ["port"]
            }),
        ),
        tool(
            "debug.set_breakpoint",
            "Set a line breakpoint. Classes not loaded yet are resolved when they load.",
            json!({
                "type": "object",
                "properties": {
                    "class_pattern": {
                        "type": "string",
                        "description": "Class name, optionally with a leading or trailing '*'"
                    },
                    "line": {
                        "type": "integer",
                        "description": "Line number"
                    },
                    "condition": {
                        "type": "string",
                        "description": "Java boolean expression; the breakpoint only stops when true"
                    },
                    "hit_count": {
                        "type": "integer",
                        "description": "Only stop on this hit"
                    }
                },
                "required": ["class_pattern", "line"]
            }),
        ),
        tool(
            "debug.set_field_watch",
            "Stop when a field is read or written",
            json!({
                "type": "object",
                "properties": {
                    "class_pattern": {
                        "type": "string",
                        "description": "Class declaring the field"
                    },
                    "field": {
                        "type": "string",
                        "description": "Field name"
                    },
                    "mode": {
                        "type": "string",
                        "enum": ["access", "modification", "both"],
                        "default": "modification"
                    }
                },
                "required": ["class_pattern", "field"]
            }),
        ),
        tool(
            "debug.set_exception_breakpoint",
            "Stop when an exception is thrown",
            json!({
                "type": "object",
                "properties": {
                    "class_pattern": {
                        "type": "string",
                        "description": "Exception class, or '*' for every exception",
                        "default": "*"
                    },
                    "caught": { "type": "boolean", "default": true },
                    "uncaught": { "type": "boolean", "default": true }
                }
            }),
        ),
        tool(
            "debug.list_breakpoints",
            "List breakpoints with their validity and hit counts",
            json!({
                "type": "object",
                "properties": {}
            }),
        ),
        tool(
            "debug.clear_breakpoint",
            "Remove a breakpoint",
            json!({
                "type": "object",
                "properties": {
                    "breakpoint_id": {
                        "type": "integer",
                        "description": "Breakpoint ID from list_breakpoints"
                    }
                },
                "required": ["breakpoint_id"]
            }),
        ),
        tool(
            "debug.continue",
            "Resume every suspended thread",
            json!({
                "type": "object",
                "properties": {
                    "wait_ms": {
                        "type": "integer",
                        "description": "Wait up to this long for the next breakpoint hit",
                        "default": 0
                    }
                }
            }),
        ),
        tool(
            "debug.step_over",
            "Step to the next line in the current method",
            thread_only("Thread ID to step"),
        ),
        tool(
            "debug.step_into",
            "Step into the method called on the current line",
            thread_only("Thread ID to step"),
        ),
        tool(
            "debug.step_out",
            "Run until the current method returns",
            thread_only("Thread ID to step"),
        ),
        tool(
            "debug.get_stack",
            "Stack frames of a suspended thread, with local variables",
            json!({
                "type": "object",
                "properties": {
                    "thread_id": {
                        "type": "string",
                        "description": "Thread ID"
                    },
                    "max_frames": {
                        "type": "integer",
                        "description": "Maximum number of frames to return",
                        "default": 20
                    },
                    "include_variables": {
                        "type": "boolean",
                        "description": "Include local variables in frames",
                        "default": true
                    }
                }
            }),
        ),
        tool(
            "debug.evaluate",
            "Evaluate a Java expression in a suspended frame",
            json!({
                "type": "object",
                "properties": {
                    "thread_id": {
                        "type": "string",
                        "description": "Thread ID"
                    },
                    "frame_index": {
                        "type": "integer",
                        "description": "Stack frame index (0 = current frame)",
                        "default": 0
                    },
                    "expression": {
                        "type": "string",
                        "description": "Java expression to evaluate"
                    },
                    "max_result_length": {
                        "type": "integer",
                        "description": "Maximum length of result string",
                        "default": 500
                    }
                },
                "required": ["expression"]
            }),
        ),
        tool(
            "debug.list_threads",
            "List all threads with status",
            json!({
                "type": "object",
                "properties": {}
            }),
        ),
        tool(
            "debug.deadlocks",
            "Find threads deadlocked on monitors",
            json!({
                "type": "object",
                "properties": {}
            }),
        ),
        tool(
            "debug.pause",
            "Suspend every thread",
            json!({
                "type": "object",
                "properties": {}
            }),
        ),
        tool(
            "debug.disconnect",
            "End the debug session; a launched JVM is terminated",
            json!({
                "type": "object",
                "properties": {}
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tool_names_unique() {
        let tools = get_tools();
        let names: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), tools.len());
        assert_eq!(tools.len(), 17);
        assert!(names.contains("debug.deadlocks"));
    }

    #[test]
    fn test_required_args_are_declared() {
        for tool in get_tools() {
            let properties = tool.input_schema["properties"].as_object().unwrap();
            if let Some(required) = tool.input_schema.get("required") {
                for name in required.as_array().unwrap() {
                    let name = name.as_str().unwrap();
                    assert!(properties.contains_key(name), "{}: {}", tool.name, name);
                }
            }
        }
    }
}
