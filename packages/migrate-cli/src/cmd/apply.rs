//! Apply a migration file: partition by database path, drive goose forward.

use anyhow::{Context, Result};
use console::style;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::context::AppContext;
use crate::goose::{self, GooseRunner};
use crate::migration;
use crate::partition;
use crate::picker::Picker;
use crate::token;

#[derive(Default)]
pub struct ApplyArgs {
    pub file: Option<PathBuf>,
}

pub fn run(ctx: &AppContext, picker: &dyn Picker, args: ApplyArgs) -> Result<ExitCode> {
    ctx.print_header("Apply migration");

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

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let Some(version) = migration::version_from_filename(&file_name) else {
        ctx.print_warning("Cannot derive a version number from the filename.");
        return Ok(ExitCode::from(2));
    };
    ctx.print_info(&format!("Version: {}", version));

    let text = fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let (up, down) = migration::split_sections(&text);
    let up_groups = partition::group_by_database(&up);
    let down_groups = partition::group_by_database(&down);

    if up_groups.is_empty() {
        ctx.print_warning("No statements with a recognizable database path. Nothing to do.");
        return Ok(ExitCode::SUCCESS);
    }

    // the down section may touch databases the up section does not
    let db_paths: BTreeSet<&String> = up_groups.keys().chain(down_groups.keys()).collect();
    ctx.print_info(&format!("{} target database(s):", db_paths.len()));
    for db_path in &db_paths {
        let ups = up_groups.get(*db_path).map(Vec::len).unwrap_or(0);
        let downs = down_groups.get(*db_path).map(Vec::len).unwrap_or(0);
        println!("  {}  {} up / {} down", style(db_path).bold(), ups, downs);
    }

    for db_path in db_paths {
        ctx.print_header(&format!("Database {}", db_path));

        let up_statements = up_groups.get(db_path).cloned().unwrap_or_default();
        let down_statements = down_groups.get(db_path).cloned().unwrap_or_default();
        let subset = partition::subset_migration(&up_statements, &down_statements);
        let tmp = tempfile::Builder::new()
            .prefix(&format!("goose_{}_", version))
            .tempdir()
            .context("failed to create a temp migration dir")?;
        // same filename, so goose derives the same version
        fs::write(tmp.path().join(&file_name), subset)
            .with_context(|| format!("failed to stage migration for {}", db_path))?;

        let dsn = goose::build_dsn(&ctx.config.endpoint, db_path, &token);
        let runner = GooseRunner::new(ctx, dsn, tmp.path().to_path_buf());

        ctx.print_info("Status before:");
        runner.status()?;
        let current = runner.version()?;
        match current {
            Some(current) => ctx.print_info(&format!("Current version: {}", current)),
            None => ctx.print_info("Current version: unknown"),
        }
        if goose::should_apply(current, version) {
            runner.up_to(version)?;
            ctx.print_success(&format!("Applied up to {}", version));
        } else if let Some(current) = current {
            ctx.print_info(&format!(
                "Already at version {}, nothing to apply",
                current
            ));
        }
        ctx.print_info("Status after:");
        runner.status()?;
    }

    ctx.print_success("✓ Apply complete");
    Ok(ExitCode::SUCCESS)
}
