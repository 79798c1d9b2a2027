//! Create a templated migration from live schema.

use anyhow::{anyhow, bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::process::ExitCode;

use crate::context::AppContext;
use crate::migration::{self, MigrationTemplate};
use crate::picker::{Picker, TableCandidate};
use crate::scheme::{self, SchemeClient};
use crate::signature::{self, Signature};
use crate::token;
use crate::yc::{self, Database};

#[derive(Default)]
pub struct CreateArgs {
    pub database: Option<String>,
    pub table: Option<String>,
    pub name: Option<String>,
    pub up: Option<String>,
    pub down: Option<String>,
}

pub fn run(ctx: &AppContext, picker: &dyn Picker, args: CreateArgs) -> Result<ExitCode> {
    ctx.print_header("Create migration");

    token::ensure_token(ctx)?;

    let databases = yc::list_databases(ctx)?;
    let db = match &args.database {
        Some(wanted) => find_database(&databases, wanted)?,
        None => {
            let Some(index) = picker.choose_database(&databases)? else {
                ctx.print_warning("Cancelled.");
                return Ok(ExitCode::from(1));
            };
            &databases[index]
        }
    };
    ctx.print_info(&format!("Database: {} ({})", db.name, db.database));

    let client = SchemeClient::new(ctx, &db.endpoint, &db.database);
    match client.whoami()? {
        Some(who) => ctx.print_info(&format!("Authenticated as {}", who)),
        None => ctx.print_warning("whoami failed, continuing anyway"),
    }

    let mut paths = client.list_paths()?;
    paths.retain(|path| !scheme::is_system_path(path));
    if paths.is_empty() {
        bail!(
            "no schema objects found in {} (set YDB_MIGRATIONS_DEBUG=1 and check the raw listing)",
            db.database
        );
    }

    let tables = describe_tables(ctx, &client, &paths)?;
    if tables.is_empty() {
        bail!(
            "no tables found in {} (set YDB_MIGRATIONS_DEBUG=1 and check the raw listing)",
            db.database
        );
    }

    let groups = signature::group_by_signature(&tables);
    ctx.print_info(&format!(
        "{} table(s), {} distinct schema(s)",
        tables.len(),
        groups.len()
    ));

    let anchor = match &args.table {
        Some(wanted) => tables
            .iter()
            .find(|(path, _)| {
                path == wanted || path.ends_with(&format!("/{}", wanted))
            })
            .ok_or_else(|| anyhow!("table {:?} not found in {}", wanted, db.database))?,
        None => {
            let candidates: Vec<TableCandidate> = tables
                .iter()
                .map(|(path, signature)| TableCandidate {
                    path: path.clone(),
                    group_size: groups.get(signature).map(Vec::len).unwrap_or(1),
                    color: signature::color_for(signature),
                })
                .collect();
            let Some(index) = picker.choose_table(&candidates)? else {
                ctx.print_warning("Cancelled.");
                return Ok(ExitCode::from(1));
            };
            &tables[index]
        }
    };
    let (anchor_path, anchor_signature) = anchor;

    let mut targets = groups
        .get(anchor_signature)
        .cloned()
        .unwrap_or_else(|| vec![anchor_path.clone()]);
    targets.sort();
    ctx.print_info(&format!("Targets ({}):", targets.len()));
    for target in &targets {
        println!("  - {}", target);
    }

    if !ctx.confirm(
        &format!("Generate a migration for {} table(s)?", targets.len()),
        true,
    )? {
        ctx.print_warning("Cancelled.");
        return Ok(ExitCode::from(1));
    }

    let template = MigrationTemplate {
        up: args
            .up
            .unwrap_or_else(|| migration::DEFAULT_UP_TEMPLATE.to_string()),
        down: args
            .down
            .unwrap_or_else(|| migration::DEFAULT_DOWN_TEMPLATE.to_string()),
    };
    let content = migration::render_migration(&targets, &template);

    let dir = migration::migration_dir(
        &ctx.migrations_root(),
        &db.database,
        &db.name,
        anchor_path,
    );
    let name = args
        .name
        .unwrap_or_else(|| migration::DEFAULT_NAME.to_string());
    let path = migration::write_migration(&dir, &name, &content)?;

    ctx.print_success(&format!("✓ Wrote {}", path.display()));
    ctx.print_info("Apply it with: ydbmig apply");
    Ok(ExitCode::SUCCESS)
}

fn find_database<'a>(databases: &'a [Database], wanted: &str) -> Result<&'a Database> {
    databases
        .iter()
        .find(|db| db.name == wanted || db.id == wanted || db.database == wanted)
        .ok_or_else(|| {
            anyhow!(
                "database {:?} not found (known: {})",
                wanted,
                databases
                    .iter()
                    .map(|db| db.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
}

/// Describe every candidate path and keep the ones that are tables, paired
/// with their schema signature.
fn describe_tables(
    ctx: &AppContext,
    client: &SchemeClient,
    paths: &[String],
) -> Result<Vec<(String, Signature)>> {
    let bar = ProgressBar::new(paths.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut tables = Vec::new();
    for path in paths {
        let short = path.rsplit('/').next().unwrap_or(path);
        bar.set_message(short.to_string());
        if let Some(raw) = client.describe(path)? {
            let desc = scheme::parse_describe(path, &raw);
            if desc.is_table() {
                let signature = signature::signature_of(&desc);
                tables.push((path.clone(), signature));
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(tables)
}
