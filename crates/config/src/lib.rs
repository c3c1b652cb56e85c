//! MUSH Engine Configuration
//!
//! Loads the evaluator and queue tunables from a plain `key = value` file.
//! Unknown keys are ignored and unparsable values keep their default, so a
//! partially broken file never stops the server from starting.

use mush_core::MushError;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default location of the engine configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/engine.cfg";

/// Runtime configuration for the softcode engine and command queue
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // ========== Evaluator limits ==========
    /// Maximum function nesting depth (from "function_recursion_limit")
    pub func_nest_lim: u32,
    /// Maximum function calls per top-level command (from "function_invocation_limit")
    pub func_invk_lim: u32,
    /// Wall-clock budget per top-level command (from "function_cpu_limit", seconds)
    pub func_cpu_lim: Duration,

    // ========== Evaluator behaviour ==========
    /// Collapse runs of spaces (from "space_compress")
    pub space_compress: bool,
    /// Honor %x colour substitutions (from "ansi_colors")
    pub ansi_colors: bool,
    /// %c expands to the current command (from "c_is_command")
    pub c_cmd_subst: bool,
    /// Named register cap (from "register_limit")
    pub register_limit: usize,
    /// Single-character register cap (from "max_global_registers")
    pub max_global_regs: usize,

    // ========== Tracing ==========
    /// Trace lines kept per command (from "trace_output_limit")
    pub trace_limit: usize,
    /// Flush only at the outermost evaluation (from "trace_topdown")
    pub trace_topdown: bool,

    // ========== Queue ==========
    /// Deposit charged per queued command (from "wait_cost")
    pub waitcost: i32,
    /// One-in-N chance of an extra coin (from "machine_command_cost")
    pub machinecost: u32,
    /// Per-owner queue quota for non-wizards (from "player_queue_limit")
    pub queuemax: usize,
    /// Highest PID handed out (from "max_queue_pid")
    pub max_qpid: u32,
    /// Commands run per tick while players are active (from "queue_active_chunk")
    pub active_q_chunk: usize,
    /// Commands run per tick while idle (from "queue_idle_chunk")
    pub idle_q_chunk: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            func_nest_lim: 50,
            func_invk_lim: 2500,
            func_cpu_lim: Duration::from_secs(60),
            space_compress: true,
            ansi_colors: true,
            c_cmd_subst: true,
            register_limit: 50,
            max_global_regs: 36,
            trace_limit: 200,
            trace_topdown: true,
            waitcost: 10,
            machinecost: 64,
            queuemax: 100,
            max_qpid: 10000,
            active_q_chunk: 10,
            idle_q_chunk: 3,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, MushError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration from [`DEFAULT_CONFIG_PATH`]
    pub fn load_default() -> Result<Self, MushError> {
        Self::load_from_file(DEFAULT_CONFIG_PATH)
    }

    /// Parse configuration text
    pub fn parse(content: &str) -> Result<Self, MushError> {
        let mut config = Self::default();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Parse key=value
            match line.find('=') {
                Some(eq_pos) => {
                    let key = line[..eq_pos].trim();
                    let value = line[eq_pos + 1..].trim();
                    config.parse_option(key, value);
                }
                None => {
                    return Err(MushError::Config(format!(
                        "line {}: expected key = value, got '{}'",
                        lineno + 1,
                        line
                    )));
                }
            }
        }

        Ok(config)
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        match key.to_lowercase().as_str() {
            "function_recursion_limit" => {
                self.func_nest_lim = value.parse().unwrap_or(50);
            }
            "function_invocation_limit" => {
                self.func_invk_lim = value.parse().unwrap_or(2500);
            }
            "function_cpu_limit" => {
                self.func_cpu_lim = Duration::from_secs(value.parse().unwrap_or(60));
            }
            "space_compress" => self.space_compress = parse_bool(value, true),
            "ansi_colors" => self.ansi_colors = parse_bool(value, true),
            "c_is_command" => self.c_cmd_subst = parse_bool(value, true),
            "register_limit" => {
                self.register_limit = value.parse().unwrap_or(50);
            }
            "max_global_registers" => {
                // Only 0-9 and a-z can name a single-character register.
                self.max_global_regs = value.parse().unwrap_or(36).min(36);
            }
            "trace_output_limit" => {
                self.trace_limit = value.parse().unwrap_or(200);
            }
            "trace_topdown" => self.trace_topdown = parse_bool(value, true),
            "wait_cost" => {
                self.waitcost = value.parse().unwrap_or(10);
            }
            "machine_command_cost" => {
                self.machinecost = value.parse().unwrap_or(64);
            }
            "player_queue_limit" => {
                self.queuemax = value.parse().unwrap_or(100);
            }
            "max_queue_pid" => {
                self.max_qpid = value.parse().unwrap_or(10000).max(1);
            }
            "queue_active_chunk" => {
                self.active_q_chunk = value.parse().unwrap_or(10);
            }
            "queue_idle_chunk" => {
                self.idle_q_chunk = value.parse().unwrap_or(3);
            }
            _ => {
                tracing::debug!("Ignoring unknown config option '{}'", key);
            }
        }
    }

    /// Display configuration summary
    pub fn display(&self) {
        tracing::info!("Engine configuration:");
        tracing::info!("  [evaluator]");
        tracing::info!(
            "    Limits: nest={} invoke={} cpu={}s",
            self.func_nest_lim,
            self.func_invk_lim,
            self.func_cpu_lim.as_secs()
        );
        tracing::info!(
            "    Space compress: {}  ANSI: {}  %c is command: {}",
            self.space_compress,
            self.ansi_colors,
            self.c_cmd_subst
        );
        tracing::info!(
            "    Registers: {} single, {} named",
            self.max_global_regs,
            self.register_limit
        );
        tracing::info!(
            "    Trace: limit={} topdown={}",
            self.trace_limit,
            self.trace_topdown
        );
        tracing::info!("  [queue]");
        tracing::info!(
            "    Cost: {} (+1 in {})",
            self.waitcost,
            self.machinecost
        );
        tracing::info!("    Quota: {}  Max PID: {}", self.queuemax, self.max_qpid);
        tracing::info!(
            "    Chunks: active={} idle={}",
            self.active_q_chunk,
            self.idle_q_chunk
        );
    }
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.to_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => true,
        "no" | "false" | "off" | "0" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.func_nest_lim, 50);
        assert_eq!(config.func_invk_lim, 2500);
        assert_eq!(config.waitcost, 10);
        assert_eq!(config.max_qpid, 10000);
        assert!(config.space_compress);
    }

    #[test]
    fn test_parse_simple_config() {
        let config_text = r#"
# evaluator
function_recursion_limit = 5
space_compress = no
trace_topdown = false

wait_cost = 3
max_queue_pid = 64
"#;
        let config = EngineConfig::parse(config_text).unwrap();
        assert_eq!(config.func_nest_lim, 5);
        assert!(!config.space_compress);
        assert!(!config.trace_topdown);
        assert_eq!(config.waitcost, 3);
        assert_eq!(config.max_qpid, 64);
        // Untouched keys keep their defaults
        assert_eq!(config.func_invk_lim, 2500);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = EngineConfig::parse("wait_cost = lots\nansi_colors = maybe\n").unwrap();
        assert_eq!(config.waitcost, 10);
        assert!(config.ansi_colors);
    }

    #[test]
    fn test_malformed_line_is_error() {
        assert!(EngineConfig::parse("wait_cost 3").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "player_queue_limit = 2").unwrap();
        writeln!(file, "function_cpu_limit = 5").unwrap();

        let config = EngineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.queuemax, 2);
        assert_eq!(config.func_cpu_lim, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineConfig::load_from_file(dir.path().join("nope.cfg"));
        assert!(matches!(result, Err(MushError::Io(_))));
    }
}
