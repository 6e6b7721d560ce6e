// MCP request handlers
//
// Handles initialize, list tools, and debug tool execution

use crate::protocol::*;
use crate::session::{Session, SessionManager};
use crate::tools;
use jdwp_client::types::ThreadId;
use jpda_core::breakpoint::FieldBreakpointType;
use jpda_core::{
    Breakpoint, BreakpointKind, DebuggerConfig, DebuggerEvent, DebuggerSession, HitCountFilter,
    SourceLocation, StepDepth, StepSize, Validity,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

type ToolResult = Result<String, String>;

pub struct RequestHandler {
    session_manager: SessionManager,
}

fn to_json<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
}

fn str_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str, String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing '{}' parameter", name))
}

fn strings_arg(args: &Value, name: &str) -> Vec<String> {
    args.get(name)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// "0x1f2", "1f2" or a JSON number
fn parse_thread_id(value: &Value) -> Result<ThreadId, String> {
    if let Some(id) = value.as_u64() {
        return Ok(id);
    }
    let text = value
        .as_str()
        .ok_or_else(|| "'thread_id' must be a hex string".to_string())?;
    u64::from_str_radix(text.trim_start_matches("0x"), 16)
        .map_err(|_| format!("Invalid thread id: {}", text))
}

fn describe_location(location: &SourceLocation) -> String {
    match location.line {
        Some(line) => format!("{}.{}:{}", location.class_name, location.method_name, line),
        None => format!(
            "{}.{} @{}",
            location.class_name, location.method_name, location.location.index
        ),
    }
}

fn describe_kind(kind: &BreakpointKind) -> String {
    match kind {
        BreakpointKind::Line { class, line } => format!("{}:{}", class, line),
        BreakpointKind::Method { class, method, kind } => {
            format!("{}.{} ({:?})", class, method, kind)
        }
        BreakpointKind::Field { class, field, kind } => {
            format!("field {}.{} ({:?})", class, field, kind)
        }
        BreakpointKind::Exception {
            class,
            caught,
            uncaught,
        } => format!("exception {} (caught: {}, uncaught: {})", class, caught, uncaught),
        BreakpointKind::Class { class, kind } => format!("class {} ({:?})", class, kind),
        BreakpointKind::Thread { kind } => format!("thread ({:?})", kind),
    }
}

/// Text for the next breakpoint hit or the end of the target
async fn next_stop(events: &mut broadcast::Receiver<DebuggerEvent>) -> String {
    loop {
        match events.recv().await {
            Ok(DebuggerEvent::BreakpointHit(hit)) => {
                return format!(
                    "⏸️  Breakpoint {} hit at {}:{} (thread 0x{:x})",
                    hit.breakpoint.id(),
                    hit.class_name.as_deref().unwrap_or("?"),
                    hit.line.unwrap_or(-1),
                    hit.thread.unwrap_or(0)
                )
            }
            Ok(DebuggerEvent::VmDied) | Err(RecvError::Closed) => {
                return "⏹️  Target VM exited".to_string()
            }
            Err(RecvError::Lagged(missed)) => {
                debug!("Skipped {} events while waiting for a stop", missed);
            }
            Ok(_) => {}
        }
    }
}

fn truncate(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}... ({} chars total)", &text[..end], text.chars().count()),
        None => text,
    }
}

impl RequestHandler {
    pub fn new(config: DebuggerConfig) -> Self {
        Self {
            session_manager: SessionManager::new(config),
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params).await,
            _ => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => JsonRpcResponse::failure(request.id, error),
        }
    }

    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("Client initialized");
            }
            "notifications/cancelled" => {
                debug!("Request cancelled");
            }
            _ => {
                warn!("Unknown notification: {}", notification.method);
            }
        }
    }

    /// Finish every open session
    pub async fn shutdown(&self) {
        while let Some(session_id) = self.session_manager.get_current_session_id().await {
            if let Some(session) = self.session_manager.remove_session(&session_id).await {
                if let Err(e) = session.do_finish().await {
                    warn!("Failed to finish {}: {}", session_id, e);
                }
            }
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| {
                JsonRpcError::new(INVALID_PARAMS, format!("Invalid initialize params: {}", e))
            })?;
        if let Some(client) = &params.client_info {
            info!(
                "Client {} {} (protocol {})",
                client.name,
                client.version.as_deref().unwrap_or("?"),
                params.protocol_version.as_deref().unwrap_or("?")
            );
        }

        to_json(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {},
            },
            server_info: ServerInfo {
                name: "jpda-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "JPDA debugging server for Java applications. \
                Set breakpoints with debug.set_breakpoint, then start a program with \
                debug.launch or connect with debug.attach. Breakpoints set before a \
                session starts are installed when the VM starts."
                    .to_string(),
            ),
        })
    }

    fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        to_json(ListToolsResult {
            tools: tools::get_tools(),
        })
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let call_params: CallToolParams = serde_json::from_value(params.unwrap_or(json!({})))
            .map_err(|e| {
                JsonRpcError::new(INVALID_PARAMS, format!("Invalid tool call params: {}", e))
            })?;
        debug!("Tool call: {}", call_params.name);

        let args = call_params.arguments;
        let result = match call_params.name.as_str() {
            "debug.launch" => self.handle_launch(args).await,
            "debug.attach" => self.handle_attach(args).await,
            "debug.set_breakpoint" => self.handle_set_breakpoint(args),
            "debug.set_field_watch" => self.handle_set_field_watch(args),
            "debug.set_exception_breakpoint" => self.handle_set_exception_breakpoint(args),
            "debug.list_breakpoints" => self.handle_list_breakpoints(),
            "debug.clear_breakpoint" => self.handle_clear_breakpoint(args),
            "debug.continue" => self.handle_continue(args).await,
            "debug.step_over" => self.handle_step(args, StepDepth::Over).await,
            "debug.step_into" => self.handle_step(args, StepDepth::Into).await,
            "debug.step_out" => self.handle_step(args, StepDepth::Out).await,
            "debug.get_stack" => self.handle_get_stack(args).await,
            "debug.evaluate" => self.handle_evaluate(args).await,
            "debug.list_threads" => self.handle_list_threads().await,
            "debug.deadlocks" => self.handle_deadlocks().await,
            "debug.pause" => self.handle_pause().await,
            "debug.disconnect" => self.handle_disconnect().await,
            _ => Err(format!("Unknown tool: {}", call_params.name)),
        };

        to_json(match result {
            Ok(content) => CallToolResult::text(content),
            Err(error) => CallToolResult::error(error),
        })
    }

    async fn current_session(&self) -> Result<Session, String> {
        self.session_manager
            .get_current_session()
            .await
            .ok_or_else(|| "No active debug session. Use debug.launch or debug.attach first.".to_string())
    }

    /// Thread named by `thread_id`, else the thread of the last stop
    fn thread_arg(&self, session: &Session, args: &Value) -> Result<ThreadId, String> {
        match args.get("thread_id") {
            Some(value) if !value.is_null() => parse_thread_id(value),
            _ => session
                .current_thread()
                .ok_or_else(|| "No current thread; pass 'thread_id'".to_string()),
        }
    }

    async fn handle_launch(&self, args: Value) -> ToolResult {
        let main_class = str_arg(&args, "main_class")?;
        let program_args = strings_arg(&args, "args");
        let mut config = self.session_manager.config().clone();
        let classpath = strings_arg(&args, "classpath");
        if !classpath.is_empty() {
            config.classpath = classpath;
        }

        let session = DebuggerSession::attach(
            main_class,
            &program_args,
            self.session_manager.registry().clone(),
            config,
        )
        .await
        .map_err(|e| format!("Failed to launch {}: {}", main_class, e))?;
        let session_id = self.session_manager.add_session(session).await;
        Ok(format!("🚀 Launched {} (session: {})", main_class, session_id))
    }

    async fn handle_attach(&self, args: Value) -> ToolResult {
        let host = args.get("host").and_then(|v| v.as_str()).unwrap_or("localhost");
        let port = args.get("port").and_then(|v| v.as_u64()).unwrap_or(5005);
        let port = u16::try_from(port).map_err(|_| format!("Invalid port: {}", port))?;

        let session = DebuggerSession::connect(
            host,
            port,
            self.session_manager.registry().clone(),
            self.session_manager.config().clone(),
        )
        .await
        .map_err(|e| format!("Failed to connect: {}", e))?;
        let session_id = self.session_manager.add_session(session).await;
        Ok(format!("✅ Connected to JVM at {}:{} (session: {})", host, port, session_id))
    }

    fn add_breakpoint(&self, breakpoint: Breakpoint) -> ToolResult {
        self.session_manager.registry().add(&breakpoint);
        Ok(format!(
            "✅ Breakpoint {} set: {}",
            breakpoint.id(),
            describe_kind(breakpoint.kind())
        ))
    }

    fn handle_set_breakpoint(&self, args: Value) -> ToolResult {
        let class_pattern = str_arg(&args, "class_pattern")?;
        let line = args
            .get("line")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| "Missing 'line' parameter".to_string())?;
        let line = i32::try_from(line).map_err(|_| format!("Invalid line: {}", line))?;

        let mut breakpoint = Breakpoint::line(class_pattern, line);
        if let Some(condition) = args.get("condition").and_then(|v| v.as_str()) {
            breakpoint = breakpoint.with_condition(condition);
        }
        if let Some(hit) = args.get("hit_count").and_then(|v| v.as_u64()) {
            let hit = u32::try_from(hit).map_err(|_| format!("Invalid hit_count: {}", hit))?;
            breakpoint = breakpoint.with_hit_count_filter(HitCountFilter::EqualTo(hit));
        }
        self.add_breakpoint(breakpoint)
    }

    fn handle_set_field_watch(&self, args: Value) -> ToolResult {
        let class_pattern = str_arg(&args, "class_pattern")?;
        let field = str_arg(&args, "field")?;
        let kind = match args.get("mode").and_then(|v| v.as_str()).unwrap_or("modification") {
            "access" => FieldBreakpointType::Access,
            "modification" => FieldBreakpointType::Modification,
            "both" => FieldBreakpointType::AccessAndModification,
            other => return Err(format!("Invalid mode: {}", other)),
        };
        self.add_breakpoint(Breakpoint::field(class_pattern, field, kind))
    }

    fn handle_set_exception_breakpoint(&self, args: Value) -> ToolResult {
        let class_pattern = args.get("class_pattern").and_then(|v| v.as_str()).unwrap_or("*");
        let caught = args.get("caught").and_then(|v| v.as_bool()).unwrap_or(true);
        let uncaught = args.get("uncaught").and_then(|v| v.as_bool()).unwrap_or(true);
        if !caught && !uncaught {
            return Err("At least one of 'caught' and 'uncaught' must be true".to_string());
        }
        self.add_breakpoint(Breakpoint::exception(class_pattern, caught, uncaught))
    }

    fn handle_list_breakpoints(&self) -> ToolResult {
        let breakpoints = self.session_manager.registry().breakpoints();
        if breakpoints.is_empty() {
            return Ok("No breakpoints set".to_string());
        }

        let mut output = format!("📍 {} breakpoint(s):\n\n", breakpoints.len());
        for bp in &breakpoints {
            let _ = writeln!(
                output,
                "  {} [{}] {}",
                if bp.is_enabled() { "✓" } else { "✗" },
                bp.id(),
                describe_kind(bp.kind())
            );
            match bp.validity() {
                Validity::Valid => {}
                Validity::Unknown => output.push_str("     Pending: class not loaded\n"),
                Validity::Invalid(message) => {
                    let _ = writeln!(output, "     Invalid: {}", message);
                }
            }
            if let Some(condition) = bp.condition() {
                let _ = writeln!(output, "     Condition: {}", condition);
            }
            if bp.hit_count() > 0 {
                let _ = writeln!(output, "     Hits: {}", bp.hit_count());
            }
        }
        Ok(output)
    }

    fn handle_clear_breakpoint(&self, args: Value) -> ToolResult {
        let id = args
            .get("breakpoint_id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| "Missing 'breakpoint_id' parameter".to_string())?;
        let registry = self.session_manager.registry();
        let breakpoint = registry
            .get(id)
            .ok_or_else(|| format!("Breakpoint not found: {}", id))?;
        registry.remove(&breakpoint);
        Ok(format!(
            "✅ Breakpoint cleared: {} ({})",
            id,
            describe_kind(breakpoint.kind())
        ))
    }

    async fn handle_continue(&self, args: Value) -> ToolResult {
        let session = self.current_session().await?;
        let wait_ms = args.get("wait_ms").and_then(|v| v.as_u64()).unwrap_or(0);
        let mut events = session.subscribe();

        session
            .do_continue()
            .await
            .map_err(|e| format!("Failed to resume: {}", e))?;
        if wait_ms == 0 {
            return Ok("▶️  Execution resumed".to_string());
        }

        let waited =
            tokio::time::timeout(Duration::from_millis(wait_ms), next_stop(&mut events)).await;
        Ok(waited.unwrap_or_else(|_| {
            format!("▶️  Execution resumed; no stop within {}ms", wait_ms)
        }))
    }

    async fn handle_step(&self, args: Value, depth: StepDepth) -> ToolResult {
        let session = self.current_session().await?;
        let thread = self.thread_arg(&session, &args)?;

        let step = session.create_step(StepSize::Line, depth);
        step.add_step(thread)
            .await
            .map_err(|e| format!("Failed to step: {}", e))?;
        let event = step
            .wait_done(self.session_manager.config().step_timeout())
            .await
            .map_err(|e| format!("Step did not complete: {}", e))?;
        Ok(format!(
            "👣 Thread 0x{:x} at {}",
            event.thread,
            describe_location(&event.location)
        ))
    }

    async fn handle_get_stack(&self, args: Value) -> ToolResult {
        let session = self.current_session().await?;
        let thread = self.thread_arg(&session, &args)?;
        let max_frames = args.get("max_frames").and_then(|v| v.as_u64()).unwrap_or(20) as usize;
        let include_variables = args
            .get("include_variables")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let frames = session
            .frames(thread)
            .await
            .map_err(|e| format!("Failed to get frames: {}", e))?;
        if frames.is_empty() {
            return Ok(format!("Thread 0x{:x} has no stack frames", thread));
        }

        let mut output = format!("🔍 Stack for thread 0x{:x} ({} frames):\n\n", thread, frames.len());
        for frame in frames.iter().take(max_frames) {
            let _ = writeln!(output, "#{} {}", frame.depth, describe_location(&frame.location));
            if !include_variables {
                continue;
            }
            match session.visible_variables(thread, frame.depth).await {
                Ok(variables) => {
                    for variable in variables {
                        let text = session
                            .display_value(thread, &variable.value)
                            .await
                            .unwrap_or_else(|_| variable.value.format());
                        let _ = writeln!(output, "    {} = {}", variable.name, truncate(text, 200));
                    }
                }
                Err(e) => debug!("No variables for frame {}: {}", frame.depth, e),
            }
        }
        if frames.len() > max_frames {
            let _ = writeln!(output, "... {} more", frames.len() - max_frames);
        }
        Ok(output)
    }

    async fn handle_evaluate(&self, args: Value) -> ToolResult {
        let session = self.current_session().await?;
        let thread = self.thread_arg(&session, &args)?;
        let expression = str_arg(&args, "expression")?;
        let frame = args.get("frame_index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let max_length = args
            .get("max_result_length")
            .and_then(|v| v.as_u64())
            .unwrap_or(500) as usize;

        let value = session
            .evaluate_in(thread, frame, expression)
            .await
            .map_err(|e| e.to_string())?;
        let text = session
            .display_value(thread, &value)
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!("{} = {}", expression, truncate(text, max_length)))
    }

    async fn handle_list_threads(&self) -> ToolResult {
        let session = self.current_session().await?;
        let threads = session
            .all_threads()
            .await
            .map_err(|e| format!("Failed to get threads: {}", e))?;

        let mut output = format!("🧵 {} thread(s):\n\n", threads.len());
        for thread in &threads {
            let _ = writeln!(
                output,
                "  {} (ID: 0x{:x}) {:?}{}",
                thread.name,
                thread.id,
                thread.status,
                if thread.suspended { ", suspended" } else { "" }
            );
        }
        Ok(output)
    }

    async fn handle_deadlocks(&self) -> ToolResult {
        let session = self.current_session().await?;
        let deadlocks = session
            .detect_deadlocks()
            .await
            .map_err(|e| format!("Deadlock detection failed: {}", e))?;
        if deadlocks.is_empty() {
            return Ok("No deadlocks".to_string());
        }

        let mut output = format!("🔒 {} deadlock(s):\n", deadlocks.len());
        for (index, deadlock) in deadlocks.iter().enumerate() {
            let _ = writeln!(output, "\nDeadlock {}:", index + 1);
            for thread in &deadlock.threads {
                let name = session
                    .thread_info(*thread)
                    .await
                    .map(|info| info.name)
                    .unwrap_or_else(|_| "?".to_string());
                let _ = writeln!(output, "  thread {} (0x{:x})", name, thread);
            }
            let monitors: Vec<String> =
                deadlock.monitors.iter().map(|m| format!("0x{:x}", m)).collect();
            let _ = writeln!(output, "  monitors: {}", monitors.join(", "));
        }
        Ok(output)
    }

    async fn handle_pause(&self) -> ToolResult {
        let session = self.current_session().await?;
        session
            .suspend()
            .await
            .map_err(|e| format!("Failed to suspend: {}", e))?;
        Ok("⏸️  Execution paused (all threads suspended)".to_string())
    }

    async fn handle_disconnect(&self) -> ToolResult {
        let session_id = self
            .session_manager
            .get_current_session_id()
            .await
            .ok_or_else(|| "No active debug session to disconnect".to_string())?;
        if let Some(session) = self.session_manager.remove_session(&session_id).await {
            session
                .do_finish()
                .await
                .map_err(|e| format!("Failed to disconnect: {}", e))?;
        }
        Ok(format!("✅ Disconnected from debug session: {}", session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jpda_core::SessionState;

    #[tokio::test]
    async fn test_lagged_events_do_not_end_the_wait() {
        let (tx, mut rx) = broadcast::channel(1);
        tx.send(DebuggerEvent::StateChanged(SessionState::Running)).unwrap();
        tx.send(DebuggerEvent::StateChanged(SessionState::Stopped)).unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(50), next_stop(&mut rx)).await;
        assert!(waited.is_err(), "returned early: {:?}", waited);

        tx.send(DebuggerEvent::VmDied).unwrap();
        assert!(next_stop(&mut rx).await.contains("exited"));
    }

    #[tokio::test]
    async fn test_closed_event_stream_ends_the_wait() {
        let (tx, mut rx) = broadcast::channel::<DebuggerEvent>(4);
        drop(tx);
        assert!(next_stop(&mut rx).await.contains("exited"));
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    async fn call(handler: &RequestHandler, name: &str, arguments: Value) -> (bool, String) {
        let response = handler
            .handle_request(request("tools/call", json!({ "name": name, "arguments": arguments })))
            .await;
        let result = response.result.expect("tool calls always return a result");
        let text = result["content"][0]["text"].as_str().unwrap().to_string();
        (result.get("isError").is_some(), text)
    }

    #[tokio::test]
    async fn test_initialize_reports_server() {
        let handler = RequestHandler::new(DebuggerConfig::default());
        let response = handler
            .handle_request(request("initialize", json!({ "protocolVersion": PROTOCOL_VERSION })))
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "jpda-mcp");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let handler = RequestHandler::new(DebuggerConfig::default());
        let response = handler.handle_request(request("resources/list", json!({}))).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_breakpoints_before_session() {
        let handler = RequestHandler::new(DebuggerConfig::default());
        let (failed, text) = call(
            &handler,
            "debug.set_breakpoint",
            json!({ "class_pattern": "com.example.Main", "line": 12, "condition": "i > 3" }),
        )
        .await;
        assert!(!failed, "{}", text);

        let (_, listing) = call(&handler, "debug.list_breakpoints", json!({})).await;
        assert!(listing.contains("com.example.Main:12"), "{}", listing);
        assert!(listing.contains("Condition: i > 3"), "{}", listing);
        assert!(listing.contains("Pending"), "{}", listing);

        let id = handler.session_manager.registry().breakpoints()[0].id();
        let (failed, _) = call(&handler, "debug.clear_breakpoint", json!({ "breakpoint_id": id })).await;
        assert!(!failed);
        let (_, listing) = call(&handler, "debug.list_breakpoints", json!({})).await;
        assert_eq!(listing, "No breakpoints set");
    }

    #[tokio::test]
    async fn test_invalid_watch_mode() {
        let handler = RequestHandler::new(DebuggerConfig::default());
        let (failed, text) = call(
            &handler,
            "debug.set_field_watch",
            json!({ "class_pattern": "Main", "field": "count", "mode": "sometimes" }),
        )
        .await;
        assert!(failed);
        assert!(text.contains("Invalid mode"));
    }

    #[tokio::test]
    async fn test_session_tools_need_a_session() {
        let handler = RequestHandler::new(DebuggerConfig::default());
        for tool in ["debug.continue", "debug.step_over", "debug.list_threads", "debug.deadlocks"] {
            let (failed, text) = call(&handler, tool, json!({})).await;
            assert!(failed, "{}", tool);
            assert!(text.contains("No active debug session"), "{}", text);
        }
    }

    #[tokio::test]
    async fn test_launch_without_java_fails() {
        let jdk = tempfile::tempdir().unwrap();
        let config = DebuggerConfig {
            java_home: Some(jdk.path().to_path_buf()),
            ..DebuggerConfig::default()
        };
        let handler = RequestHandler::new(config);
        let (failed, text) =
            call(&handler, "debug.launch", json!({ "main_class": "com.example.Main" })).await;
        assert!(failed);
        assert!(text.starts_with("Failed to launch com.example.Main"), "{}", text);
    }

    #[test]
    fn test_thread_id_parsing() {
        assert_eq!(parse_thread_id(&json!("0x1f")), Ok(0x1f));
        assert_eq!(parse_thread_id(&json!("1f")), Ok(0x1f));
        assert_eq!(parse_thread_id(&json!(31)), Ok(31));
        assert!(parse_thread_id(&json!("zz")).is_err());
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo".to_string(), 10), "héllo");
        assert_eq!(truncate("héllo".to_string(), 2), "hé... (5 chars total)");
    }
}
