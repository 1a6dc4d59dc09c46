use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// A single provisioning script call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a successful run
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("exited with status {code:?}: {stderr}")]
    NonZeroExit {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("could not be started: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Runs provisioning scripts. Calls are never retried.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProvisionError>;
}

/// Provisioner that executes scripts on the host with a fixed timeout ceiling
pub struct CommandProvisioner {
    timeout: Duration,
}

impl CommandProvisioner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProvisionError> {
        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        tracing::info!("Provisioning: {}", invocation.command_line());

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    "Provisioning command timed out after {}s: {}",
                    self.timeout.as_secs(),
                    invocation.command_line()
                );
                return Err(ProvisionError::Timeout(self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(ProvisionError::NonZeroExit {
                code: output.status.code(),
                stdout,
                stderr,
            })
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command_captures_stdout() {
        let provisioner = CommandProvisioner::new(Duration::from_secs(5));
        let out = provisioner
            .run(&Invocation::new("sh").arg("-c").arg("echo created $VRHOST_VCPUS").env("VRHOST_VCPUS", "2"))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "created 2");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported() {
        let provisioner = CommandProvisioner::new(Duration::from_secs(5));
        let err = provisioner
            .run(&Invocation::new("sh").arg("-c").arg("echo boom >&2; exit 3"))
            .await
            .unwrap_err();
        match err {
            ProvisionError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_from_failure() {
        let provisioner = CommandProvisioner::new(Duration::from_millis(100));
        let err = provisioner
            .run(&Invocation::new("sleep").arg("5"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let provisioner = CommandProvisioner::new(Duration::from_secs(1));
        let err = provisioner
            .run(&Invocation::new("definitely-not-a-provisioning-script"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Spawn(_)));
    }

    #[test]
    fn test_command_line() {
        let inv = Invocation::new("mkvqfx").arg("lab1-sw1");
        assert_eq!(inv.command_line(), "mkvqfx lab1-sw1");
    }
}
