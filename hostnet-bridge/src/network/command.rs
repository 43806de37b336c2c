//! `ovs-vsctl` invocation.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::session::Session;

/// Default `ovs-vsctl` program.
pub(crate) const VSCTL_CMD: &str = "ovs-vsctl";

/// Result of one `ovs-vsctl` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VsctlOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl VsctlOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// First line of stdout, trimmed.
    pub fn value(&self) -> &str {
        self.stdout.lines().next().unwrap_or("").trim()
    }
}

/// Global options derived from the session: database, timeout and TLS.
pub(crate) fn base_args(session: &Session) -> Vec<String> {
    let mut args = vec![
        format!("--db={}", session.endpoint()),
        format!("--timeout={}", session.timeout().as_secs().max(1)),
    ];
    if let Some(tls) = session.tls() {
        args.push(format!("--private-key={}", tls.private_key));
        args.push(format!("--certificate={}", tls.certificate));
        args.push(format!("--ca-cert={}", tls.ca_cert));
    }
    args
}

/// Turn an unsuccessful run into a transient error when the database could
/// not be reached or the call timed out.
pub(crate) fn transient_failure(session: &Session, output: &VsctlOutput) -> Option<BackendError> {
    if output.success() {
        return None;
    }
    if output.exit_code.is_none() {
        return Some(BackendError::Timeout(format!(
            "ovs-vsctl did not finish within {}s",
            session.timeout().as_secs()
        )));
    }
    let stderr = output.stderr.to_lowercase();
    if stderr.contains("database connection failed") || stderr.contains("connection refused") {
        return Some(BackendError::ConnectionFailed {
            endpoint: session.endpoint().to_string(),
            message: output.stderr.trim().to_string(),
        });
    }
    None
}

/// Map a failed mutating run onto a typed error.
pub(crate) fn mutation_failure(command: &str, name: &str, output: &VsctlOutput) -> BackendError {
    let stderr = output.stderr.trim();
    if stderr.contains("already exists") {
        BackendError::AlreadyExists(name.to_string())
    } else if stderr.contains("Permission denied") {
        BackendError::PermissionDenied(stderr.to_string())
    } else {
        command_failed(command, output)
    }
}

pub(crate) fn command_failed(command: &str, output: &VsctlOutput) -> BackendError {
    BackendError::CommandFailed {
        command: command.to_string(),
        exit_code: output.exit_code,
        stderr: output.stderr.trim().to_string(),
    }
}

/// Run `program` once with the session's global options followed by `args`.
async fn exec_once(program: &str, session: &Session, args: &[String]) -> Result<VsctlOutput, BackendError> {
    let mut cmd = Command::new(program);
    cmd.args(base_args(session))
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // ovs-vsctl enforces --timeout itself; this bounds a wedged process.
    let limit = session.timeout() + std::time::Duration::from_secs(5);
    let output = match tokio::time::timeout(limit, cmd.output()).await {
        Ok(result) => result.map_err(|e| BackendError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            exit_code: None,
            stderr: e.to_string(),
        })?,
        Err(_) => {
            return Ok(VsctlOutput {
                exit_code: None,
                stdout: String::new(),
                stderr: "timed out".to_string(),
            })
        }
    };

    Ok(VsctlOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `program` and retry transient failures following the session's
/// retry policy.
///
/// Non-transient exits are returned as output for the caller to interpret.
/// Only use this for queries; mutations go through [`run_mutation`].
pub(crate) async fn run(program: &str, session: &Session, args: &[String]) -> Result<VsctlOutput, BackendError> {
    run_retrying(program, session, args, BackendError::is_transient).await
}

/// Run a mutating `program` call.
///
/// Only a failed database connection is retried, since the request never
/// reached the database. A timeout may have committed the transaction and
/// is returned without another attempt.
pub(crate) async fn run_mutation(
    program: &str,
    session: &Session,
    args: &[String],
) -> Result<VsctlOutput, BackendError> {
    run_retrying(program, session, args, |err| {
        matches!(err, BackendError::ConnectionFailed { .. })
    })
    .await
}

async fn run_retrying(
    program: &str,
    session: &Session,
    args: &[String],
    retryable: fn(&BackendError) -> bool,
) -> Result<VsctlOutput, BackendError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        debug!(args = ?args, attempt, "Running ovs-vsctl");

        let output = exec_once(program, session, args).await?;
        let Some(err) = transient_failure(session, &output) else {
            return Ok(output);
        };

        if !retryable(&err) || attempt > session.retry_count() {
            return Err(err);
        }

        warn!(error = %err, attempt, "Transient ovs-vsctl failure, retrying");
        tokio::time::sleep(session.retry_interval()).await;
    }
}
