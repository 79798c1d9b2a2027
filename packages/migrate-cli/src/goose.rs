//! Driving the goose migration runner.

use anyhow::{bail, Result};
use regex::{Regex, RegexBuilder};
use std::path::PathBuf;

use crate::cmd_builder::{CmdBuilder, CmdOutput};
use crate::context::AppContext;

/// Connection string for goose's ydb driver. The token rides along as a
/// query parameter, which is why echoed commands must be masked.
pub fn build_dsn(endpoint: &str, db_path: &str, token: &str) -> String {
    format!(
        "{}{}?go_query_mode=scripting&go_fake_tx=scripting&go_query_bind=declare,numeric&token={}",
        endpoint, db_path, token
    )
}

/// Replace token values in any printable text with `***`.
pub fn mask_secrets(text: &str) -> String {
    let re = Regex::new(r#"(token=)[^&'"\s]+"#).unwrap();
    re.replace_all(text, "${1}***").to_string()
}

/// Fail early when goose is missing or broken.
pub fn ensure_installed() -> Result<()> {
    if which::which("goose").is_err() {
        bail!("goose is not installed (https://github.com/pressly/goose, build with YDB support)");
    }
    let probe = CmdBuilder::new("goose").arg("-h").run_capture()?;
    if probe.combined().trim().is_empty() {
        bail!("goose is on PATH but produces no output; reinstall it");
    }
    Ok(())
}

// =============================================================================
// Failure classification
// =============================================================================

struct ErrorPattern {
    pattern: &'static str,
    explanation: &'static str,
    continuable: bool,
}

/// Ordered, first match wins. The teardown pattern matches the camel-case Go
/// error text only, so the underscore status rows never shadow it.
const PATTERNS: &[ErrorPattern] = &[
    ErrorPattern {
        pattern: r"\bUnauthenticated\b",
        explanation: "No valid credentials. Refresh the token with `ydbmig token --refresh`.",
        continuable: false,
    },
    ErrorPattern {
        pattern: r"\bPERMISSION_DENIED\b",
        explanation: "Not enough rights for this operation. Check roles and access.",
        continuable: false,
    },
    ErrorPattern {
        pattern: r"\bDEADLINE_EXCEEDED\b",
        explanation: "Transport timeout. Check the network or retry.",
        continuable: false,
    },
    ErrorPattern {
        pattern: r"code\s*=\s*400130|\bALREADY_EXISTS\b",
        explanation: "The object already exists; this step was already applied.",
        continuable: true,
    },
    ErrorPattern {
        pattern: r"code\s*=\s*400070|\bSCHEME_ERROR\b|\bGENERIC_ERROR\b",
        explanation: "Schema error. Check the DDL, column names and types, and the table path.",
        continuable: false,
    },
    ErrorPattern {
        pattern: r"code\s*=\s*400140|\bNOT_FOUND\b",
        explanation: "Schema object not found. Check the database path and table name.",
        continuable: false,
    },
    ErrorPattern {
        pattern: r"code\s*=\s*400120|\bPRECONDITION_FAILED\b",
        explanation: "The database state does not allow this operation.",
        continuable: false,
    },
    ErrorPattern {
        pattern: r"code\s*=\s*400090|\bTIMEOUT\b",
        explanation: "The server-side operation timeout expired; partial application is possible.",
        continuable: false,
    },
    ErrorPattern {
        pattern: r"code\s*=\s*400050|\bUNAVAILABLE\b",
        explanation: "The service is temporarily unavailable. Retry later.",
        continuable: false,
    },
    ErrorPattern {
        pattern: r"code\s*=\s*400060|\bOVERLOADED\b",
        explanation: "The cluster is overloaded. Retry with pauses.",
        continuable: false,
    },
    ErrorPattern {
        pattern: r"code\s*=\s*400100|\bBAD_SESSION\b|\bSESSION_BUSY\b",
        explanation: "The session is busy or broken; re-running opens a fresh one.",
        continuable: true,
    },
    ErrorPattern {
        pattern: r"code\s*=\s*400150|\bSESSION_EXPIRED\b",
        explanation: "The session expired; re-running is safe.",
        continuable: true,
    },
    ErrorPattern {
        pattern: r#"Column: ".*?" already exists"#,
        explanation: "The column already exists; this step was already applied.",
        continuable: true,
    },
    ErrorPattern {
        pattern: r"failed to close DB.*DeadlineExceeded",
        explanation: "The command finished but closing the connection timed out; ignoring.",
        continuable: true,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub explanation: String,
    pub continuable: bool,
}

/// Classify a failed goose run from its combined output. No match is fatal.
pub fn classify(output: &str) -> Classification {
    for entry in PATTERNS {
        let re = RegexBuilder::new(entry.pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .unwrap();
        if re.is_match(output) {
            return Classification {
                explanation: entry.explanation.to_string(),
                continuable: entry.continuable,
            };
        }
    }
    Classification {
        explanation: "Unrecognized goose failure, see the output above.".to_string(),
        continuable: false,
    }
}

/// Current version scraped from goose output: first `version <integer>`.
pub fn parse_version(output: &str) -> Option<u64> {
    let re = RegexBuilder::new(r"version\s+(\d+)")
        .case_insensitive(true)
        .build()
        .unwrap();
    re.captures(output).and_then(|c| c[1].parse().ok())
}

// =============================================================================
// Decision helpers
// =============================================================================

/// Forward policy: proceed when the version is unknown (bootstrap) or the
/// database is strictly behind the migration.
pub fn should_apply(current: Option<u64>, target: u64) -> bool {
    match current {
        None => true,
        Some(version) => version < target,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackDecision {
    /// No parseable version: refuse to guess a baseline for a destructive op
    Unknown,
    /// The migration never ran here
    NotApplied,
    /// Roll down to this version
    RollTo(u64),
}

/// Backward policy: requires a known current version at or beyond the
/// migration; the target is one version before it.
pub fn rollback_decision(current: Option<u64>, version: u64) -> RollbackDecision {
    match current {
        None => RollbackDecision::Unknown,
        Some(v) if v < version => RollbackDecision::NotApplied,
        Some(_) => RollbackDecision::RollTo(version.saturating_sub(1)),
    }
}

// =============================================================================
// Runner
// =============================================================================

/// One goose session: a DSN and a directory of `.sql` files.
pub struct GooseRunner<'a> {
    ctx: &'a AppContext,
    dsn: String,
    dir: PathBuf,
}

impl<'a> GooseRunner<'a> {
    pub fn new(ctx: &'a AppContext, dsn: String, dir: PathBuf) -> Self {
        Self { ctx, dsn, dir }
    }

    fn invoke(&self, subcommand: Vec<String>) -> Result<CmdOutput> {
        // goose stops parsing flags at the first positional, so -dir goes first
        let builder = CmdBuilder::new("goose")
            .arg("-dir")
            .arg(self.dir.to_string_lossy().to_string())
            .arg("ydb")
            .arg(self.dsn.as_str())
            .args(subcommand);
        self.ctx.print_command(&builder.command_line());
        let out = builder.run_capture()?;

        // goose logs through stderr; show both streams to the operator
        if !self.ctx.quiet {
            let stdout = out.stdout_string();
            let stdout = stdout.trim_end();
            if !stdout.is_empty() {
                println!("{}", stdout);
            }
        }
        self.ctx.debug_block("goose stderr", &out.stderr_string());
        Ok(out)
    }

    /// Informational listing of applied/pending migrations.
    pub fn status(&self) -> Result<()> {
        let out = self.invoke(vec!["status".into()])?;
        if !out.success() {
            let classified = classify(&out.combined());
            if classified.continuable {
                self.ctx.print_warning(&classified.explanation);
            } else {
                bail!("goose status failed: {}", classified.explanation);
            }
        }
        Ok(())
    }

    /// Current migration version, or None when goose cannot tell. A failed
    /// invocation whose output still carries the answer (teardown noise
    /// after success) is scraped anyway.
    pub fn version(&self) -> Result<Option<u64>> {
        let out = self.invoke(vec!["version".into()])?;
        let text = out.combined();
        if out.success() || text.contains("failed to close DB") {
            return Ok(parse_version(&text));
        }
        Ok(None)
    }

    pub fn up_to(&self, version: u64) -> Result<()> {
        let out = self.invoke(vec!["up-to".into(), version.to_string()])?;
        self.finish_step("up-to", version, out)
    }

    pub fn down_to(&self, version: u64) -> Result<()> {
        let out = self.invoke(vec!["down-to".into(), version.to_string()])?;
        self.finish_step("down-to", version, out)
    }

    fn finish_step(&self, label: &str, version: u64, out: CmdOutput) -> Result<()> {
        if out.success() {
            return Ok(());
        }
        let classified = classify(&out.combined());
        if classified.continuable {
            self.ctx
                .print_warning(&format!("Continuing: {}", classified.explanation));
            return Ok(());
        }
        bail!("goose {} {} failed: {}", label, version, classified.explanation)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_dsn() {
        let dsn = build_dsn(
            "grpcs://ydb.serverless.yandexcloud.net:2135",
            "/ru-central1/b1g/etn1",
            "t1.secret",
        );
        assert_eq!(
            dsn,
            "grpcs://ydb.serverless.yandexcloud.net:2135/ru-central1/b1g/etn1\
             ?go_query_mode=scripting&go_fake_tx=scripting&go_query_bind=declare,numeric\
             &token=t1.secret"
        );
    }

    #[test]
    fn test_mask_secrets() {
        let line = "goose ydb \"grpcs://h:2135/db?go_query_mode=scripting&token=t1.very-secret\" status";
        let masked = mask_secrets(line);
        assert!(masked.contains("token=***"));
        assert!(!masked.contains("very-secret"));
        // everything after the token stays intact
        assert!(masked.ends_with("\" status"));
    }

    #[test]
    fn test_mask_secrets_stops_at_ampersand() {
        let masked = mask_secrets("?token=abc&go_fake_tx=scripting");
        assert_eq!(masked, "?token=***&go_fake_tx=scripting");
    }

    #[test]
    fn test_classify_version_table_exists_is_continuable() {
        let c = classify("Error: rpc error: code = 400130, ALREADY_EXISTS: path exists");
        assert!(c.continuable);
    }

    #[test]
    fn test_classify_permission_denied_is_fatal() {
        let c = classify("rpc error: PERMISSION_DENIED: access to database denied");
        assert!(!c.continuable);
    }

    #[test]
    fn test_classify_teardown_noise_is_continuable() {
        // camel-case teardown text must not be mistaken for DEADLINE_EXCEEDED
        let c = classify(
            "2024/03/01 goose: failed to close DB: context deadline exceeded: DeadlineExceeded",
        );
        assert!(c.continuable);
        let c = classify("rpc error: DEADLINE_EXCEEDED while waiting");
        assert!(!c.continuable);
    }

    #[test]
    fn test_classify_scheme_errors_are_fatal() {
        assert!(!classify("Error: rpc error: code = 400070, SCHEME_ERROR: unknown column").continuable);
        assert!(!classify("Error: rpc error: code = 400140, NOT_FOUND: no such table").continuable);
        assert!(!classify("Error: rpc error: code = 400050, UNAVAILABLE: node down").continuable);
    }

    #[test]
    fn test_classify_column_exists_is_continuable() {
        let c = classify(r#"Error: Column: "remote_interface_access_key" already exists"#);
        assert!(c.continuable);
    }

    #[test]
    fn test_classify_sessions_are_continuable() {
        assert!(classify("status BAD_SESSION from server").continuable);
        assert!(classify("SESSION_EXPIRED: session was not found").continuable);
    }

    #[test]
    fn test_classify_unknown_is_fatal() {
        let c = classify("something entirely novel went wrong");
        assert!(!c.continuable);
        assert!(c.explanation.contains("Unrecognized"));
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("goose: version 20251026164222\n"),
            Some(20251026164222)
        );
        assert_eq!(parse_version("goose: Version 7"), Some(7));
        assert_eq!(parse_version("no number here"), None);
    }

    #[test]
    fn test_should_apply() {
        assert!(should_apply(None, 10));
        assert!(should_apply(Some(9), 10));
        assert!(!should_apply(Some(10), 10));
        assert!(!should_apply(Some(11), 10));
    }

    #[test]
    fn test_rollback_decision() {
        assert_eq!(rollback_decision(None, 10), RollbackDecision::Unknown);
        assert_eq!(rollback_decision(Some(9), 10), RollbackDecision::NotApplied);
        assert_eq!(rollback_decision(Some(10), 10), RollbackDecision::RollTo(9));
        assert_eq!(rollback_decision(Some(12), 10), RollbackDecision::RollTo(9));
    }

    #[test]
    fn test_rollback_decision_never_underflows() {
        assert_eq!(rollback_decision(Some(0), 0), RollbackDecision::RollTo(0));
    }
}
