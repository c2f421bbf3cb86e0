use anyhow::{Context, Result};
use itemgraph::{CommandOutput, CommandRunner};
use std::process::{Command, Stdio};

/// Runs item commands on this host through `sh -c`
pub struct LocalRunner;

impl CommandRunner for LocalRunner {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        log::debug!("running: {command}");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute: {command}"))?;
        let output = CommandOutput::from(output);
        log::trace!(
            "{command} exited with {:?}: {}",
            output.code,
            output.stdout_str().trim()
        );
        Ok(output)
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_local_runner_captures_output() {
        let output = LocalRunner.run("echo hello; echo oops >&2; exit 3").unwrap();
        assert_eq!(output.stdout_str(), "hello\n");
        assert_eq!(output.stderr_str(), "oops\n");
        assert_eq!(output.code, Some(3));
        assert!(!output.success);
    }

    #[test]
    fn test_local_runner_status() {
        assert!(LocalRunner.run_status("true").unwrap());
        assert!(!LocalRunner.run_status("false").unwrap());
    }
}
