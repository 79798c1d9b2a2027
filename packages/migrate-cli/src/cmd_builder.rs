//! Command builder pattern for running external processes

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Fluent builder for running external commands.
///
/// Output is always captured; a non-zero exit is not an error here because
/// callers classify tool failures themselves. A timeout, when set, is.
#[derive(Default)]
pub struct CmdBuilder {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CmdBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// The command as it would be typed, for echoing to the operator.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in &self.args {
            let needs_quotes = arg
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '&' | '?' | '*' | '\'' | '"'));
            if needs_quotes {
                parts.push(format!("\"{}\"", arg));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }

    pub fn run_capture(&self) -> Result<CmdOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        // Explicitly set stdin to null to prevent hanging on interactive prompts
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().with_context(|| {
            format!("failed to start: {} {}", self.program, self.args.join(" "))
        })?;

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = match self.timeout {
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    if let Some(status) = child.try_wait().with_context(|| {
                        format!("failed to wait for: {}", self.program)
                    })? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        bail!(
                            "{} timed out after {}s: {}",
                            self.program,
                            limit.as_secs(),
                            self.args.join(" ")
                        );
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            }
            None => child
                .wait()
                .with_context(|| format!("failed to wait for: {}", self.program))?,
        };

        Ok(CmdOutput {
            code: status.code().unwrap_or(-1),
            stdout: join_reader(stdout_reader),
            stderr: join_reader(stderr_reader),
        })
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Output from a captured command execution
pub struct CmdOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// stdout followed by stderr, for scraping tools that log to either.
    pub fn combined(&self) -> String {
        let mut text = self.stdout_string();
        let stderr = self.stderr_string();
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_special_args() {
        let builder = CmdBuilder::new("goose")
            .args(["-dir", "/tmp/m"])
            .arg("ydb")
            .arg("grpcs://host:2135/db?token=abc");
        assert_eq!(
            builder.command_line(),
            "goose -dir /tmp/m ydb \"grpcs://host:2135/db?token=abc\""
        );
    }

    #[test]
    fn test_combined_joins_streams() {
        let out = CmdOutput {
            code: 1,
            stdout: b"hello".to_vec(),
            stderr: b"world\n".to_vec(),
        };
        assert_eq!(out.combined(), "hello\nworld\n");
        assert!(!out.success());
    }

    #[test]
    fn test_combined_without_stderr() {
        let out = CmdOutput {
            code: 0,
            stdout: b"only stdout\n".to_vec(),
            stderr: Vec::new(),
        };
        assert_eq!(out.combined(), "only stdout\n");
        assert!(out.success());
    }
}
