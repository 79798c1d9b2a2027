//! IAM token handling.
//!
//! The token is an opaque bearer string in a plain-text file, minted by the
//! `yc` CLI and reused until the file is deleted or emptied.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::cmd_builder::CmdBuilder;
use crate::context::AppContext;

/// Read a non-empty token from `path`.
pub fn read_token_file(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).with_context(|| {
        format!(
            "no IAM token at {} (run `ydbmig token` to mint one)",
            path.display()
        )
    })?;
    let token = content.trim().to_string();
    if token.is_empty() {
        bail!("token file {} is empty", path.display());
    }
    Ok(token)
}

/// Strict read used by apply/rollback: the token must already exist.
pub fn read_token(ctx: &AppContext) -> Result<String> {
    read_token_file(&ctx.token_path())
}

/// Lazy variant used by create: mint a token when none is cached.
pub fn ensure_token(ctx: &AppContext) -> Result<String> {
    if let Ok(token) = read_token_file(&ctx.token_path()) {
        return Ok(token);
    }
    mint_token(ctx)
}

/// Mint a fresh token via `yc iam create-token` and cache it.
pub fn mint_token(ctx: &AppContext) -> Result<String> {
    if which::which("yc").is_err() {
        bail!("yc is not installed (install the Yandex Cloud CLI and run `yc init`)");
    }
    ctx.print_info("Minting IAM token via yc...");
    let out = CmdBuilder::new("yc")
        .args(["iam", "create-token"])
        .timeout(ctx.config.yc_timeout())
        .run_capture()?;
    if !out.success() {
        bail!(
            "yc iam create-token failed: {}",
            out.stderr_string().trim()
        );
    }
    let token = out.stdout_string().trim().to_string();
    if token.is_empty() {
        bail!("yc iam create-token returned no token");
    }
    let path = ctx.token_path();
    fs::write(&path, format!("{}\n", token))
        .with_context(|| format!("failed to write {}", path.display()))?;
    ctx.print_success(&format!("✓ Token saved to {}", path.display()));
    Ok(token)
}
