//! Status command execution

use std::process::Stdio;
use std::time::Duration;

use swanmon_platform::{SwanmonError, SwanmonResult};
use tokio::process::Command;

use crate::logging;

/// Default status command
pub const DEFAULT_COMMAND: &str = "ipsec statusall";

/// Runs the status command and returns its combined output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    allow_nonzero_exit: bool,
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// Create a runner from an argument vector
    ///
    /// # Errors
    ///
    /// Returns `SwanmonError::Config` if `argv` is empty.
    pub fn new(argv: Vec<String>) -> SwanmonResult<Self> {
        let mut argv = argv.into_iter();
        let program = argv
            .next()
            .filter(|program| !program.is_empty())
            .ok_or_else(|| SwanmonError::Config("status command is empty".into()))?;
        Ok(Self {
            program,
            args: argv.collect(),
            allow_nonzero_exit: false,
            timeout: None,
        })
    }

    /// Keep the output of commands that exit unsuccessfully
    pub fn allow_nonzero_exit(mut self, allow: bool) -> Self {
        self.allow_nonzero_exit = allow;
        self
    }

    /// Kill the command if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executable name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the command once
    ///
    /// Standard output followed by standard error is returned as text.
    ///
    /// # Errors
    ///
    /// Returns `SwanmonError::Exec` if the command cannot be started,
    /// `SwanmonError::Timeout` if it is killed after the timeout, and
    /// `SwanmonError::ExitStatus` for unsuccessful exits unless tolerated.
    pub async fn run(&self) -> SwanmonResult<String> {
        logging::log_command_exec(&self.program, &self.args);

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SwanmonError::Exec {
                program: self.program.clone(),
                source,
            })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| SwanmonError::Timeout {
                    operation: "status command",
                    after: limit,
                })??,
            None => child.wait_with_output().await?,
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            // Keep the last stdout line and the first stderr line apart
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        if !output.status.success() {
            let code = output.status.code();
            logging::log_command_exit(&self.program, code, self.allow_nonzero_exit);
            if !self.allow_nonzero_exit {
                return Err(SwanmonError::ExitStatus {
                    program: self.program.clone(),
                    code,
                    output: text,
                });
            }
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(CommandRunner::new(vec![]), Err(SwanmonError::Config(_))));
        assert!(matches!(
            CommandRunner::new(argv(&[""])),
            Err(SwanmonError::Config(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_combined_output() {
        let runner = CommandRunner::new(argv(&["sh", "-c", "echo out; echo err >&2"])).unwrap();
        assert_eq!(runner.run().await.unwrap(), "out\nerr\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_combined_output_without_trailing_newline() {
        let runner = CommandRunner::new(argv(&["sh", "-c", "printf out; printf err >&2"])).unwrap();
        assert_eq!(runner.run().await.unwrap(), "out\nerr");

        let runner = CommandRunner::new(argv(&["sh", "-c", "printf out"])).unwrap();
        assert_eq!(runner.run().await.unwrap(), "out");

        let runner = CommandRunner::new(argv(&["sh", "-c", "printf err >&2"])).unwrap();
        assert_eq!(runner.run().await.unwrap(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit() {
        let runner = CommandRunner::new(argv(&["sh", "-c", "echo partial; exit 3"])).unwrap();
        let err = runner.run().await.unwrap_err();
        match err {
            SwanmonError::ExitStatus { code, output, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(output, "partial\n");
            }
            other => panic!("unexpected error: {other}"),
        }

        let tolerant = runner.allow_nonzero_exit(true);
        assert_eq!(tolerant.run().await.unwrap(), "partial\n");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let runner = CommandRunner::new(argv(&["/nonexistent/swanmon-ipsec"])).unwrap();
        assert!(matches!(runner.run().await, Err(SwanmonError::Exec { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_command() {
        let runner = CommandRunner::new(argv(&["sleep", "5"]))
            .unwrap()
            .with_timeout(Some(Duration::from_millis(100)));
        let started = std::time::Instant::now();
        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, SwanmonError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
