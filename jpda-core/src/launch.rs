// JVM launcher
//
// Starts `java` with the JDWP agent listening on an ephemeral port and reads
// the port back from the agent's banner.

use crate::config::DebuggerConfig;
use crate::error::{DebuggerError, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info};

const LISTEN_BANNER: &str = "Listening for transport dt_socket at address:";

pub const JDWP_AGENT: &str =
    "-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,address=127.0.0.1:0";

/// A JVM waiting for a debugger. The process is killed when `child` drops.
#[derive(Debug)]
pub struct LaunchedVm {
    pub child: Child,
    pub port: u16,
}

/// Port from the agent banner. The address is "N" or "host:N".
pub fn parse_listen_address(line: &str) -> Option<u16> {
    let address = line.split_once(LISTEN_BANNER)?.1.trim();
    let port = address.rsplit(':').next()?;
    port.trim().parse().ok()
}

pub fn java_command(config: &DebuggerConfig, main_class: &str, args: &[String]) -> Result<Command> {
    let mut command = Command::new(config.java_executable());
    command.args(&config.jvm_args).arg(JDWP_AGENT);
    if !config.classpath.is_empty() {
        let classpath = std::env::join_paths(&config.classpath)
            .map_err(|e| DebuggerError::Config(format!("classpath: {}", e)))?;
        command.arg("-cp").arg(classpath);
    }
    command
        .arg(main_class)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    Ok(command)
}

/// Launch `main_class` and wait for the agent to listen
pub async fn launch(config: &DebuggerConfig, main_class: &str, args: &[String]) -> Result<LaunchedVm> {
    let mut command = java_command(config, main_class, args)?;
    info!("Launching {} with {:?}", main_class, config.java_executable());
    let mut child = command
        .spawn()
        .map_err(|e| DebuggerError::Attach(format!("cannot start java: {}", e)))?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(DebuggerError::Attach("java output is not captured".to_string()));
    };
    let mut stdout = BufReader::new(stdout).lines();
    let stderr = BufReader::new(stderr).lines();
    tokio::spawn(forward(stderr, "stderr"));

    let timeout = config.launch_timeout();
    let port = match tokio::time::timeout(timeout, read_port(&mut stdout)).await {
        Ok(Ok(port)) => port,
        Ok(Err(e)) => {
            child.kill().await.ok();
            return Err(e);
        }
        Err(_) => {
            child.kill().await.ok();
            return Err(DebuggerError::Attach(format!(
                "JDWP agent did not report a port within {:?}",
                timeout
            )));
        }
    };
    tokio::spawn(forward(stdout, "stdout"));
    info!("Target VM listening on port {}", port);
    Ok(LaunchedVm { child, port })
}

async fn read_port(stdout: &mut Lines<BufReader<ChildStdout>>) -> Result<u16> {
    while let Some(line) = stdout.next_line().await? {
        debug!(target: "jpda_core::target_output", "stdout: {}", line);
        if let Some(port) = parse_listen_address(&line) {
            return Ok(port);
        }
    }
    Err(DebuggerError::Attach(
        "java exited before the JDWP agent started listening".to_string(),
    ))
}

async fn forward<R: AsyncRead + Unpin>(mut lines: Lines<BufReader<R>>, stream: &'static str) {
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "jpda_core::target_output", "{}: {}", stream, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_listen_address() {
        assert_eq!(
            parse_listen_address("Listening for transport dt_socket at address: 50123"),
            Some(50123)
        );
        assert_eq!(
            parse_listen_address("Listening for transport dt_socket at address: 127.0.0.1:41000"),
            Some(41000)
        );
        assert_eq!(parse_listen_address("Picked up JAVA_TOOL_OPTIONS: -Xmx1g"), None);
        assert_eq!(
            parse_listen_address("Listening for transport dt_socket at address: soon"),
            None
        );
    }

    #[test]
    fn test_java_command_line() {
        let config = DebuggerConfig {
            java_home: Some(PathBuf::from("/opt/jdk")),
            classpath: vec!["build/classes".to_string()],
            jvm_args: vec!["-Xmx256m".to_string()],
            ..DebuggerConfig::default()
        };
        let command = java_command(&config, "com.example.Main", &["one".to_string()]).unwrap();
        let command = command.as_std();

        assert_eq!(command.get_program(), "/opt/jdk/bin/java");
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["-Xmx256m", JDWP_AGENT, "-cp", "build/classes", "com.example.Main", "one"]
        );
    }

    #[tokio::test]
    async fn test_missing_java_is_attach_error() {
        let config = DebuggerConfig {
            java_home: Some(PathBuf::from("/nonexistent/jdk")),
            ..DebuggerConfig::default()
        };
        let err = launch(&config, "com.example.Main", &[]).await.unwrap_err();
        assert!(matches!(err, DebuggerError::Attach(_)));
    }
}
