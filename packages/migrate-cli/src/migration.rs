//! Migration file naming, sections, and generation.

use anyhow::{Context, Result};
use chrono::Local;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

pub const UP_MARKER: &str = "-- +goose Up";
pub const DOWN_MARKER: &str = "-- +goose Down";
pub const STMT_BEGIN: &str = "-- +goose StatementBegin";
pub const STMT_END: &str = "-- +goose StatementEnd";

pub const DEFAULT_NAME: &str = "migration";
pub const DEFAULT_UP_TEMPLATE: &str =
    "ALTER TABLE {table} ADD COLUMN remote_interface_access_key Utf8;";
pub const DEFAULT_DOWN_TEMPLATE: &str =
    "ALTER TABLE {table} DROP COLUMN remote_interface_access_key;";

/// Version from a migration filename: the first run of six or more digits,
/// else the first run of any digits.
pub fn version_from_filename(name: &str) -> Option<u64> {
    let long = Regex::new(r"(\d{6,})").unwrap();
    if let Some(captures) = long.captures(name) {
        return captures[1].parse().ok();
    }
    let short = Regex::new(r"(\d+)").unwrap();
    short.captures(name).and_then(|c| c[1].parse().ok())
}

/// Split a migration into its up and down texts. Files without a Down
/// marker are all up; files without any marker are treated as one up block.
pub fn split_sections(text: &str) -> (String, String) {
    let both = Regex::new(r"(?is)--\s*\+goose\s+Up(.*?)--\s*\+goose\s+Down(.*)$").unwrap();
    if let Some(captures) = both.captures(text) {
        return (captures[1].to_string(), captures[2].to_string());
    }
    let up_only = Regex::new(r"(?is)--\s*\+goose\s+Up(.*)$").unwrap();
    if let Some(captures) = up_only.captures(text) {
        return (captures[1].to_string(), String::new());
    }
    (text.to_string(), String::new())
}

/// Filename-safe migration name.
pub fn slug(name: &str) -> String {
    let re = Regex::new(r"[^\w.-]+").unwrap();
    let cleaned = re.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches(|c: char| matches!(c, '.' | '_' | ' '));
    if cleaned.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// 14-digit local timestamp, the version goose derives from the filename.
pub fn timestamp() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Path-segment-safe directory name.
pub fn safe_segment(name: &str) -> String {
    let re = Regex::new(r"[^\w.\- ()]+").unwrap();
    let cleaned = re.replace_all(name, "_");
    let cleaned = cleaned.trim_matches(|c: char| matches!(c, '.' | '_' | ' '));
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

/// SQL statement templates with a `{table}` placeholder.
pub struct MigrationTemplate {
    pub up: String,
    pub down: String,
}

impl Default for MigrationTemplate {
    fn default() -> Self {
        Self {
            up: DEFAULT_UP_TEMPLATE.to_string(),
            down: DEFAULT_DOWN_TEMPLATE.to_string(),
        }
    }
}

/// Render one migration applying the template to every target table.
/// Tables are referenced by backtick-quoted absolute path so apply can
/// partition the file later; each section carries a single
/// StatementBegin/StatementEnd pair.
pub fn render_migration(tables: &[String], template: &MigrationTemplate) -> String {
    let mut out = String::new();
    out.push_str("-- Generated by ydbmig create\n");
    out.push_str(&format!("-- Target tables ({}):\n", tables.len()));
    for table in tables {
        out.push_str(&format!("--  - {}\n", table));
    }
    out.push('\n');
    push_block(&mut out, UP_MARKER, &template.up, tables);
    out.push('\n');
    push_block(&mut out, DOWN_MARKER, &template.down, tables);
    out
}

fn push_block(out: &mut String, marker: &str, template: &str, tables: &[String]) {
    out.push_str(marker);
    out.push('\n');
    out.push_str(STMT_BEGIN);
    out.push('\n');
    for table in tables {
        out.push_str(&template.replace("{table}", &format!("`{}`", table)));
        out.push('\n');
    }
    out.push_str(STMT_END);
    out.push('\n');
}

/// Destination directory for a new migration, mirroring the object tree:
/// `<root>/ydb_dbs/<db-id (db-name)>/<parent dirs...>/<table>/`.
pub fn migration_dir(
    migrations_root: &Path,
    database_path: &str,
    database_name: &str,
    table_path: &str,
) -> PathBuf {
    let db_last = database_path
        .trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("db");
    let db_dir = if database_name.is_empty() {
        db_last.to_string()
    } else {
        format!("{} ({})", db_last, database_name)
    };

    let mut dir = migrations_root.join("ydb_dbs").join(safe_segment(&db_dir));
    let relative = table_path
        .strip_prefix(database_path)
        .unwrap_or(table_path);
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        dir = dir.join(safe_segment(segment));
    }
    dir
}

/// Write the migration under `dir` as `<timestamp>_<slug>.sql`.
pub fn write_migration(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let filename = format!("{}_{}.sql", timestamp(), slug(name));
    let path = dir.join(filename);
    fs::write(&path, content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

// =============================================================================
// Tests
// =============================================================================
