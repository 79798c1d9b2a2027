//! Schema browsing via the `ydb` CLI.
//!
//! The CLI prints free-form console text; everything scraped from it goes
//! through the pure parsers at the bottom of this module so the orchestration
//! code never touches the raw format.

use anyhow::{bail, Result};
use regex::Regex;

use crate::cmd_builder::CmdBuilder;
use crate::context::AppContext;

/// One parsed column of a table description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    pub not_null: bool,
    pub is_key: bool,
}

/// A described schema object.
#[derive(Debug, Clone)]
pub struct TableDescription {
    pub path: String,
    pub header: String,
    pub columns: Vec<Column>,
    pub raw: String,
}

impl TableDescription {
    /// Tables announce themselves in the header; older CLI builds only give
    /// themselves away by listing columns.
    pub fn is_table(&self) -> bool {
        self.header.contains("<table>") || !self.columns.is_empty()
    }
}

/// Driver for `ydb scheme ...` against one database.
pub struct SchemeClient<'a> {
    ctx: &'a AppContext,
    endpoint: String,
    database: String,
}

impl<'a> SchemeClient<'a> {
    pub fn new(ctx: &'a AppContext, endpoint: &str, database: &str) -> Self {
        Self {
            ctx,
            endpoint: endpoint.to_string(),
            database: database.to_string(),
        }
    }

    fn base(&self) -> CmdBuilder {
        let token_file = self.ctx.token_path().to_string_lossy().to_string();
        CmdBuilder::new("ydb")
            .args(["-e", self.endpoint.as_str()])
            .args(["-d", self.database.as_str()])
            .args(["--token-file", token_file.as_str()])
            .timeout(self.ctx.config.ydb_timeout())
    }

    /// Preflight check. Failure is reported by the caller but not fatal.
    pub fn whoami(&self) -> Result<Option<String>> {
        let out = self.base().args(["discovery", "whoami"]).run_capture()?;
        self.ctx.debug_block("ydb discovery whoami", &out.combined());
        if !out.success() {
            return Ok(None);
        }
        Ok(out
            .stdout_string()
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string))
    }

    /// Every object path under the database root, absolute form. The listing
    /// is rooted at the `-d` database, so no path argument is passed.
    pub fn list_paths(&self) -> Result<Vec<String>> {
        let out = self.base().args(["scheme", "ls", "-R1"]).run_capture()?;
        self.ctx.debug_block("ydb scheme ls -R1", &out.combined());
        if out.success() {
            let entries = parse_ls_brief(&out.stdout_string());
            if !entries.is_empty() {
                return Ok(self.to_absolute(entries));
            }
        }

        // older CLI builds reject -R1
        let out = self.base().args(["scheme", "ls", "-lR"]).run_capture()?;
        self.ctx.debug_block("ydb scheme ls -lR", &out.combined());
        if !out.success() {
            bail!(
                "ydb scheme ls failed: {}",
                out.stderr_string().trim()
            );
        }
        Ok(self.to_absolute(parse_ls_detailed(&out.stdout_string())))
    }

    /// Raw description text of one object, or None when describing fails
    /// (deleted concurrently, insufficient rights on the branch).
    pub fn describe(&self, path: &str) -> Result<Option<String>> {
        let out = self
            .base()
            .args(["scheme", "describe", path])
            .run_capture()?;
        if !out.success() {
            self.ctx
                .debug_block(&format!("describe {} failed", path), &out.combined());
            return Ok(None);
        }
        Ok(Some(out.stdout_string()))
    }

    fn to_absolute(&self, entries: Vec<String>) -> Vec<String> {
        let root = self.database.trim_end_matches('/');
        entries
            .into_iter()
            .map(|entry| {
                if entry.starts_with('/') {
                    entry
                } else {
                    format!("{}/{}", root, entry)
                }
            })
            .collect()
    }
}

/// A path is off limits for migrations when it sits under the system branch
/// or is goose's own bookkeeping table.
pub fn is_system_path(path: &str) -> bool {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    if segments.any(|s| s == ".sys") {
        return true;
    }
    matches!(path.rsplit('/').next(), Some("goose_db_version"))
}

// =============================================================================
// Parsers
// =============================================================================

/// Parse `scheme ls -R1` output: `ls -R`-style sections where a line ending
/// in `:` names a directory (`.` or `./...` relative to the database root)
/// and the following lines name its entries. Paths come back relative.
pub fn parse_ls_brief(output: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut current = String::new();
    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_suffix(':') {
            let header = header.trim();
            let header = header.strip_prefix("./").unwrap_or(header);
            current = if header == "." {
                String::new()
            } else {
                header.trim_matches('/').to_string()
            };
            continue;
        }
        let name = line.trim_end_matches('/');
        if name.is_empty() {
            continue;
        }
        if current.is_empty() {
            paths.push(name.to_string());
        } else {
            paths.push(format!("{}/{}", current, name));
        }
    }
    paths
}

/// Parse `scheme ls -lR` output. Newer builds print `<type> name` markers;
/// older ones print a box table with Type and Name columns.
pub fn parse_ls_detailed(output: &str) -> Vec<String> {
    let marker = Regex::new(r"<(?:table|column_table|directory|topic)>\s+(\S+)").unwrap();
    let names: Vec<String> = marker
        .captures_iter(output)
        .map(|c| c[1].to_string())
        .collect();
    if !names.is_empty() {
        return names;
    }
    parse_type_name_table(output)
}

fn parse_type_name_table(output: &str) -> Vec<String> {
    let mut header: Option<(usize, usize)> = None;
    let mut names = Vec::new();
    for line in output.lines() {
        if !line.contains('│') {
            continue;
        }
        let cells = split_box_row(line);
        match header {
            None => {
                let type_idx = cells.iter().position(|c| c.eq_ignore_ascii_case("type"));
                let name_idx = cells.iter().position(|c| c.eq_ignore_ascii_case("name"));
                if let (Some(t), Some(n)) = (type_idx, name_idx) {
                    header = Some((t, n));
                }
            }
            Some((type_idx, name_idx)) => {
                let object_type = cells.get(type_idx).map(String::as_str).unwrap_or("");
                let name = cells.get(name_idx).map(String::as_str).unwrap_or("");
                if name.is_empty() || name.eq_ignore_ascii_case("name") {
                    continue;
                }
                // only table rows are trusted from the box listing
                if object_type.eq_ignore_ascii_case("table") {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

/// Parse the box table following the `Columns:` label of a `scheme describe`.
/// Other box tables in the output are ignored.
///
/// Nullability comes from a trailing `?` on the type cell; key membership
/// from the Key cell starting with `K` (`K0`, `K1`, ...).
pub fn parse_describe(path: &str, raw: &str) -> TableDescription {
    let header = raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string();

    let mut columns = Vec::new();
    let mut columns_box_next = false;
    let mut in_columns_box = false;
    let mut indices: Option<(usize, usize, Option<usize>)> = None;
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed == "Columns:" {
            columns_box_next = true;
            continue;
        }
        if trimmed.starts_with('┌') {
            in_columns_box = columns_box_next;
            columns_box_next = false;
            indices = None;
            continue;
        }
        if trimmed.starts_with('└') {
            in_columns_box = false;
            continue;
        }
        if !in_columns_box || !line.contains('│') {
            continue;
        }
        let cells = split_box_row(line);
        match indices {
            None => {
                let name_idx = cells.iter().position(|c| c == "Name");
                let type_idx = cells.iter().position(|c| c == "Type");
                if let (Some(n), Some(t)) = (name_idx, type_idx) {
                    let key_idx = cells.iter().position(|c| c == "Key");
                    indices = Some((n, t, key_idx));
                }
            }
            Some((name_idx, type_idx, key_idx)) => {
                let name = cells.get(name_idx).map(String::as_str).unwrap_or("");
                let type_cell = cells.get(type_idx).map(String::as_str).unwrap_or("");
                if name.is_empty() || name == "Name" || type_cell.is_empty() {
                    continue;
                }
                let not_null = !type_cell.ends_with('?');
                let type_name = type_cell.trim_end_matches('?').to_string();
                let is_key = key_idx
                    .and_then(|idx| cells.get(idx))
                    .map(|cell| cell.starts_with('K'))
                    .unwrap_or(false);
                columns.push(Column {
                    name: name.to_string(),
                    type_name,
                    not_null,
                    is_key,
                });
            }
        }
    }

    TableDescription {
        path: path.to_string(),
        header,
        columns,
        raw: raw.to_string(),
    }
}

/// Cells of one box-drawing row, empties preserved so indices stay aligned.
fn split_box_row(line: &str) -> Vec<String> {
    line.split('│').map(|cell| cell.trim().to_string()).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const LS_BRIEF: &str = "\
.:
orders
archive
goose_db_version

./archive:
orders_2023
";

    #[test]
    fn test_parse_ls_brief_sections() {
        let paths = parse_ls_brief(LS_BRIEF);
        assert_eq!(
            paths,
            vec![
                "orders",
                "archive",
                "goose_db_version",
                "archive/orders_2023",
            ]
        );
    }

    #[test]
    fn test_parse_ls_brief_strips_trailing_slashes() {
        let paths = parse_ls_brief(".:\narchive/\n");
        assert_eq!(paths, vec!["archive"]);
    }

    #[test]
    fn test_parse_ls_brief_empty() {
        assert!(parse_ls_brief("").is_empty());
        assert!(parse_ls_brief("\n\n").is_empty());
    }

    const LS_DETAILED_MARKERS: &str = "\
<directory>  archive
<table>      orders
<table>      archive/orders_2023
<topic>      events
";

    #[test]
    fn test_parse_ls_detailed_markers() {
        let names = parse_ls_detailed(LS_DETAILED_MARKERS);
        assert_eq!(
            names,
            vec!["archive", "orders", "archive/orders_2023", "events"]
        );
    }

    const LS_DETAILED_TABLE: &str = "\
┌───────────┬──────────────────────┐
│ Type      │ Name                 │
├───────────┼──────────────────────┤
│ dir       │ archive              │
│ table     │ orders               │
│ topic     │ events               │
│ unknown   │ mystery              │
└───────────┴──────────────────────┘
";

    #[test]
    fn test_parse_ls_detailed_box_table_keeps_only_tables() {
        let names = parse_ls_detailed(LS_DETAILED_TABLE);
        assert_eq!(names, vec!["orders"]);
    }

    const DESCRIBE_TABLE: &str = "\
<table> orders

Columns:
┌─────────────┬───────────┬───────┬────────────┐
│ Name        │ Type      │ Key   │ Family     │
├─────────────┼───────────┼───────┼────────────┤
│ id          │ Utf8      │ K0    │ default    │
│ region      │ Utf8      │ K1    │ default    │
│ created_at  │ Timestamp │       │ default    │
│ payload     │ Json?     │       │ default    │
└─────────────┴───────────┴───────┴────────────┘

Storage settings:
  ...
";

    #[test]
    fn test_parse_describe_columns() {
        let desc = parse_describe("/ru-central1/a/b/orders", DESCRIBE_TABLE);
        assert!(desc.is_table());
        assert_eq!(desc.header, "<table> orders");
        assert_eq!(desc.columns.len(), 4);

        assert_eq!(desc.columns[0].name, "id");
        assert!(desc.columns[0].is_key);
        assert!(desc.columns[0].not_null);

        assert_eq!(desc.columns[1].name, "region");
        assert!(desc.columns[1].is_key);

        assert_eq!(desc.columns[2].name, "created_at");
        assert!(!desc.columns[2].is_key);
        assert!(desc.columns[2].not_null);

        // trailing ? marks a nullable column and is stripped from the type
        assert_eq!(desc.columns[3].name, "payload");
        assert_eq!(desc.columns[3].type_name, "Json");
        assert!(!desc.columns[3].not_null);
    }

    #[test]
    fn test_parse_describe_directory_has_no_columns() {
        let desc = parse_describe("/ru-central1/a/b/archive", "<directory> archive\n");
        assert!(!desc.is_table());
        assert!(desc.columns.is_empty());
    }

    #[test]
    fn test_parse_describe_ignores_boxes_without_columns_label() {
        let raw = "\
<table> orders

┌──────┬──────┐
│ Name │ Type │
├──────┼──────┤
│ junk │ Utf8 │
└──────┴──────┘
";
        let desc = parse_describe("/ru-central1/a/b/orders", raw);
        assert!(desc.columns.is_empty());
    }

    #[test]
    fn test_is_system_path() {
        assert!(is_system_path("/ru-central1/a/b/.sys/partition_stats"));
        assert!(is_system_path("/ru-central1/a/b/goose_db_version"));
        assert!(is_system_path("/ru-central1/a/b/nested/goose_db_version"));
        assert!(!is_system_path("/ru-central1/a/b/orders"));
        assert!(!is_system_path("/ru-central1/a/b/system_orders"));
    }
}
