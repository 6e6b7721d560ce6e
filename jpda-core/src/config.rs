// Debugger configuration
//
// Loaded from a JSON file named by JPDA_CONFIG, then overridden by environment.

use crate::error::{DebuggerError, Result};
use jdwp_client::SuspendPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_ENV: &str = "JPDA_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// JDK used to launch targets; `java` from PATH when unset
    pub java_home: Option<PathBuf>,
    pub classpath: Vec<String>,
    pub jvm_args: Vec<String>,
    /// Policy for breakpoints that do not set one, and for steps
    pub suspend_policy: SuspendPolicy,
    pub state_timeout_ms: u64,
    pub step_timeout_ms: u64,
    pub launch_timeout_ms: u64,
    /// 0 disables background deadlock polling
    pub deadlock_poll_ms: u64,
    /// Class patterns stepping never stops in, e.g. "java.*"
    pub step_filters: Vec<String>,
    pub event_channel_capacity: usize,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            java_home: None,
            classpath: Vec::new(),
            jvm_args: Vec::new(),
            suspend_policy: SuspendPolicy::All,
            state_timeout_ms: 10_000,
            step_timeout_ms: 10_000,
            launch_timeout_ms: 15_000,
            deadlock_poll_ms: 1_000,
            step_filters: Vec::new(),
            event_channel_capacity: 256,
        }
    }
}

impl DebuggerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| DebuggerError::Config(format!("{}: {}", path.display(), e)))
    }

    /// File from JPDA_CONFIG (if set) plus environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                debug!("Loading debugger config from {:?}", path);
                Self::from_file(Path::new(&path))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply JAVA_HOME, JPDA_CLASSPATH, JPDA_TIMEOUT_MS and JPDA_DEADLOCK_POLL_MS
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(home) = lookup("JAVA_HOME") {
            self.java_home = Some(PathBuf::from(home));
        }
        if let Some(classpath) = lookup("JPDA_CLASSPATH") {
            self.classpath = std::env::split_paths(&classpath)
                .map(|p| p.to_string_lossy().into_owned())
                .filter(|p| !p.is_empty())
                .collect();
        }
        if let Some(timeout) = lookup("JPDA_TIMEOUT_MS") {
            let ms = parse_ms("JPDA_TIMEOUT_MS", &timeout)?;
            self.state_timeout_ms = ms;
            self.step_timeout_ms = ms;
        }
        if let Some(poll) = lookup("JPDA_DEADLOCK_POLL_MS") {
            self.deadlock_poll_ms = parse_ms("JPDA_DEADLOCK_POLL_MS", &poll)?;
        }
        Ok(())
    }

    pub fn java_executable(&self) -> PathBuf {
        match &self.java_home {
            Some(home) => home.join("bin").join("java"),
            None => PathBuf::from("java"),
        }
    }

    pub fn state_timeout(&self) -> Duration {
        Duration::from_millis(self.state_timeout_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn deadlock_poll_interval(&self) -> Option<Duration> {
        (self.deadlock_poll_ms > 0).then(|| Duration::from_millis(self.deadlock_poll_ms))
    }
}

fn parse_ms(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| DebuggerError::Config(format!("{} must be milliseconds, got {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"classpath": ["build/classes"], "suspend_policy": "event_thread"}}"#
        )
        .unwrap();

        let config = DebuggerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.classpath, vec!["build/classes".to_string()]);
        assert_eq!(config.suspend_policy, SuspendPolicy::EventThread);
        assert_eq!(config.deadlock_poll_ms, 1_000);
        assert_eq!(config.state_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = DebuggerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, DebuggerError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("JAVA_HOME", "/opt/jdk"),
            ("JPDA_TIMEOUT_MS", "2500"),
            ("JPDA_DEADLOCK_POLL_MS", "0"),
        ]
        .into_iter()
        .collect();

        let mut config = DebuggerConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.java_executable(), PathBuf::from("/opt/jdk/bin/java"));
        assert_eq!(config.step_timeout(), Duration::from_millis(2500));
        assert_eq!(config.deadlock_poll_interval(), None);
    }

    #[test]
    fn test_bad_env_number() {
        let mut config = DebuggerConfig::default();
        let err = config
            .apply_env(|key| (key == "JPDA_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, DebuggerError::Config(_)));
    }
}
