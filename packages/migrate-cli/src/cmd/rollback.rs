//! Roll back a migration file: partition by database path, drive goose
//! backward to the version before it.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::context::AppContext;
use crate::goose::{self, GooseRunner, RollbackDecision};
use crate::migration;
use crate::partition;
use crate::picker::Picker;
use crate::token;

#[derive(Default)]
pub struct RollbackArgs {
    pub file: Option<PathBuf>,
}

pub fn run(ctx: &AppContext, picker: &dyn Picker, args: RollbackArgs) -> Result<ExitCode> {
    ctx.print_header("Roll back migration");

    goose::ensure_installed()?;
    let token = token::read_token(ctx)?;

    let file = match args.file {
        Some(file) => file,
        None => match picker.choose_migration_file(&ctx.migrations_root())? {
            Some(file) => file,
            None => {
                ctx.print_warning("Cancelled.");
                return Ok(ExitCode::from(1));
            }
        },
    };
    ctx.print_info(&format!("File: {}", file.display()));

    let text = fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let hints = targets_hint(&text);
    if !hints.is_empty() {
        ctx.print_info("Declared targets:");
        for hint in hints.iter().take(12) {
            println!("  - {}", hint);
        }
        if hints.len() > 12 {
            println!("  ({} more)", hints.len() - 12);
        }
    }

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let Some(version) = migration::version_from_filename(&file_name) else {
        ctx.print_warning("Cannot derive a version number from the filename.");
        return Ok(ExitCode::from(2));
    };
    ctx.print_info(&format!(
        "Version {} rolls back to {}",
        version,
        version.saturating_sub(1)
    ));

    // --quiet skips the prompt instead of taking its default answer
    if !ctx.quiet && !ctx.confirm("Roll this migration back?", false)? {
        ctx.print_warning("Cancelled.");
        return Ok(ExitCode::from(1));
    }

    let (up, down) = migration::split_sections(&text);
    let up_groups = partition::group_by_database(&up);
    let down_groups = partition::group_by_database(&down);
    let db_paths: BTreeSet<String> = up_groups
        .keys()
        .chain(down_groups.keys())
        .cloned()
        .collect();

    if db_paths.is_empty() {
        // legacy files wrote statements without absolute paths; the original
        // file next to its siblings is all goose gets in that case
        let Some(default_db) = ctx.config.default_database.clone() else {
            ctx.print_warning(
                "No statements with a recognizable database path. Nothing to do.",
            );
            return Ok(ExitCode::SUCCESS);
        };
        ctx.print_warning(&format!(
            "No database paths found in the file, falling back to {}",
            default_db
        ));
        let dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        roll_one(ctx, &token, &default_db, &dir, version)?;
        ctx.print_success("✓ Rollback complete");
        return Ok(ExitCode::SUCCESS);
    }

    ctx.print_info(&format!("{} target database(s)", db_paths.len()));

    for db_path in &db_paths {
        let up_statements = up_groups.get(db_path).cloned().unwrap_or_default();
        let down_statements = down_groups.get(db_path).cloned().unwrap_or_default();
        let subset = partition::subset_migration(&up_statements, &down_statements);
        let tmp = tempfile::Builder::new()
            .prefix(&format!("goose_{}_", version))
            .tempdir()
            .context("failed to create a temp migration dir")?;
        fs::write(tmp.path().join(&file_name), subset)
            .with_context(|| format!("failed to stage migration for {}", db_path))?;

        roll_one(ctx, &token, db_path, tmp.path(), version)?;
    }

    ctx.print_success("✓ Rollback complete");
    Ok(ExitCode::SUCCESS)
}

fn roll_one(
    ctx: &AppContext,
    token: &str,
    db_path: &str,
    dir: &Path,
    version: u64,
) -> Result<()> {
    ctx.print_header(&format!("Database {}", db_path));

    let dsn = goose::build_dsn(&ctx.config.endpoint, db_path, token);
    let runner = GooseRunner::new(ctx, dsn, dir.to_path_buf());

    ctx.print_info("Status before:");
    runner.status()?;
    let current = runner.version()?;
    match current {
        Some(current) => ctx.print_info(&format!("Current version: {}", current)),
        None => ctx.print_info("Current version: unknown"),
    }
    match goose::rollback_decision(current, version) {
        RollbackDecision::Unknown => {
            ctx.print_warning(
                "Current version unknown, skipping rollback for this database",
            );
        }
        RollbackDecision::NotApplied => {
            ctx.print_info(&format!(
                "Migration {} is not applied here, nothing to roll back",
                version
            ));
        }
        RollbackDecision::RollTo(target) => {
            runner.down_to(target)?;
            ctx.print_success(&format!("Rolled back to {}", target));
            ctx.print_info("Status after:");
            runner.status()?;
        }
    }
    Ok(())
}

/// Targets a migration file claims to touch: the generated `--  - <path>`
/// header lines plus any backtick-quoted paths, first occurrence wins.
fn targets_hint(text: &str) -> Vec<String> {
    let mut hints: Vec<String> = Vec::new();
    for line in text.lines() {
        if let Some(rest) = line.trim().strip_prefix("--  - ") {
            push_unique(&mut hints, rest.trim());
            continue;
        }
        if let Some(path) = partition::extract_abs_path(line) {
            push_unique(&mut hints, &path);
        }
    }
    hints
}

fn push_unique(hints: &mut Vec<String>, value: &str) {
    if value.is_empty() {
        return;
    }
    if !hints.iter().any(|existing| existing == value) {
        hints.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_hint_prefers_header_and_dedupes() {
        let text = "\
-- Generated by ydbmig create
-- Target tables (2):
--  - /ru-central1/b1g/etn1/orders
--  - /ru-central1/b1g/etn1/archive/orders_2023

-- +goose Up
-- +goose StatementBegin
ALTER TABLE `/ru-central1/b1g/etn1/orders` ADD COLUMN x Utf8;
-- +goose StatementEnd
";
        let hints = targets_hint(text);
        assert_eq!(
            hints,
            vec![
                "/ru-central1/b1g/etn1/orders",
                "/ru-central1/b1g/etn1/archive/orders_2023",
            ]
        );
    }

    #[test]
    fn test_targets_hint_falls_back_to_backticked_paths() {
        let text = "ALTER TABLE `/ru-central1/b1g/etn1/orders` DROP COLUMN x;\n";
        assert_eq!(targets_hint(text), vec!["/ru-central1/b1g/etn1/orders"]);
    }

    #[test]
    fn test_targets_hint_empty_for_plain_sql() {
        assert!(targets_hint("SELECT 1;\n").is_empty());
    }
}
