//! Host introspection via `free` and `pgrep`
//!
//! Each command's text output goes through a small parser that yields a
//! fixed struct, so the rest of the crate never sees raw output.

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::{HostProbe, MemoryStats, ProcessPattern};

/// Real host probe backed by procps tools
#[derive(Debug, Clone)]
pub struct RealHostProbe {
    mem_line: Regex,
}

impl RealHostProbe {
    pub fn new() -> SupervisorResult<Self> {
        // Mem: total used free shared buff/cache available
        let mem_line = Regex::new(r"(?m)^Mem:\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)").map_err(|e| {
            SupervisorError::Probe {
                command: "free".to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self { mem_line })
    }

    /// Parse `free -m` output
    pub fn parse_free(&self, output: &str) -> Option<MemoryStats> {
        let captures = self.mem_line.captures(output)?;
        let total_mb = captures.get(1)?.as_str().parse().ok()?;
        let available_mb = captures.get(6)?.as_str().parse().ok()?;
        Some(MemoryStats { total_mb, available_mb })
    }

    async fn run(command: &str, args: &[&str]) -> SupervisorResult<std::process::Output> {
        Command::new(command)
            .args(args)
            .output()
            .await
            .map_err(|e| SupervisorError::Probe {
                command: command.to_string(),
                message: e.to_string(),
            })
    }
}

/// Parse `pgrep` output: one pid per line, anything else ignored
pub fn parse_pgrep(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

#[async_trait]
impl HostProbe for RealHostProbe {
    async fn memory_stats(&self) -> SupervisorResult<MemoryStats> {
        let output = Self::run("free", &["-m"]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        self.parse_free(&stdout).ok_or_else(|| SupervisorError::Probe {
            command: "free -m".to_string(),
            message: "unrecognised output".to_string(),
        })
    }

    async fn find_processes(&self, pattern: &ProcessPattern) -> SupervisorResult<Vec<u32>> {
        let (flag, needle) = match pattern {
            ProcessPattern::Exact(name) => ("-x", name.as_str()),
            ProcessPattern::CommandLine(fragment) => ("-f", fragment.as_str()),
        };
        let output = Self::run("pgrep", &[flag, needle]).await?;

        // pgrep exits 1 when nothing matched
        match output.status.code() {
            Some(0) => Ok(parse_pgrep(&String::from_utf8_lossy(&output.stdout))),
            Some(1) => Ok(Vec::new()),
            _ => Err(SupervisorError::Probe {
                command: format!("pgrep {flag} {needle}"),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}
