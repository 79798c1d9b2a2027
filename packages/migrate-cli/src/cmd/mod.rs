//! Subcommand implementations

pub mod apply;
pub mod colors;
pub mod create;
pub mod rollback;

use anyhow::Result;
use console::style;
use std::fs;
use std::process::ExitCode;

use crate::context::AppContext;
use crate::picker;
use crate::token as token_store;

/// Environment check: external tools, token file, migrations directory.
pub fn doctor(ctx: &AppContext) -> Result<ExitCode> {
    ctx.print_header("Environment check");
    println!();

    let tools = [
        ("yc", "Yandex Cloud CLI"),
        ("ydb", "YDB CLI"),
        ("goose", "migration runner"),
    ];
    let mut missing = 0;
    for (binary, label) in tools {
        match which::which(binary) {
            Ok(path) => println!(
                "  {} {} ({}) at {}",
                style("✓").green(),
                binary,
                label,
                path.display()
            ),
            Err(_) => {
                println!(
                    "  {} {} ({}) not found",
                    style("✗").red(),
                    binary,
                    label
                );
                missing += 1;
            }
        }
    }
    println!();

    let token_path = ctx.token_path();
    match fs::read_to_string(&token_path) {
        Ok(content) if !content.trim().is_empty() => {
            println!("  {} token file {}", style("✓").green(), token_path.display());
        }
        Ok(_) => {
            println!(
                "  {} token file {} is empty",
                style("✗").red(),
                token_path.display()
            );
        }
        Err(_) => {
            println!(
                "  {} token file {} missing (run `ydbmig token`)",
                style("✗").yellow(),
                token_path.display()
            );
        }
    }

    let migrations_root = ctx.migrations_root();
    let sql_files = picker::find_sql_files(&migrations_root)?;
    println!(
        "  {} {} migration file(s) under {}",
        style("•").cyan(),
        sql_files.len(),
        migrations_root.display()
    );
    println!();

    if missing == 0 {
        ctx.print_success("Ready to go");
        Ok(ExitCode::SUCCESS)
    } else {
        ctx.print_warning("Install the missing tools first");
        Ok(ExitCode::from(1))
    }
}

/// Read or refresh the cached IAM token. The value itself is never printed.
pub fn token(ctx: &AppContext, refresh: bool) -> Result<ExitCode> {
    let token = if refresh {
        token_store::mint_token(ctx)?
    } else {
        token_store::ensure_token(ctx)?
    };
    ctx.print_success(&format!(
        "✓ Token ready at {} ({} chars)",
        ctx.token_path().display(),
        token.len()
    ));
    Ok(ExitCode::SUCCESS)
}
