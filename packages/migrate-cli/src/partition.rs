//! Partitioning migration statements by target database.
//!
//! A statement targets a database when it references a backtick-quoted
//! absolute object path; the database path is the first three segments of
//! that path. Lines without such a reference are dropped on purpose: a bare
//! `SELECT 1;` or a goose marker never reaches any database.

use regex::Regex;
use std::collections::BTreeMap;

use crate::migration::{DOWN_MARKER, STMT_BEGIN, STMT_END, UP_MARKER};

fn abs_path_regex() -> Regex {
    Regex::new(r"`(/ru-central1/[^`]+)`").unwrap()
}

/// First backtick-quoted absolute path in a line, if any.
pub fn extract_abs_path(line: &str) -> Option<String> {
    abs_path_regex()
        .captures(line)
        .map(|captures| captures[1].to_string())
}

/// Database path prefix of an absolute object path: the first three
/// segments (`/ru-central1/<cloud>/<database>`).
pub fn database_path_of(abs_path: &str) -> Option<String> {
    let segments: Vec<&str> = abs_path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 3 {
        return None;
    }
    Some(format!("/{}/{}/{}", segments[0], segments[1], segments[2]))
}

/// Group a section's statements by database path. Ordering is deterministic
/// so multi-database runs always proceed in the same sequence.
pub fn group_by_database(section: &str) -> BTreeMap<String, Vec<String>> {
    let re = abs_path_regex();
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for line in section.lines() {
        let Some(captures) = re.captures(line) else {
            continue;
        };
        let Some(db_path) = database_path_of(&captures[1]) else {
            continue;
        };
        groups
            .entry(db_path)
            .or_default()
            .push(line.trim().to_string());
    }
    groups
}

/// Build a self-contained migration holding one database's statements.
/// Both sections are always emitted, each wrapped in a single
/// StatementBegin/StatementEnd pair, so goose accepts the file even when one
/// of them is empty.
pub fn subset_migration(up: &[String], down: &[String]) -> String {
    let mut out = String::new();
    push_section(&mut out, UP_MARKER, up);
    out.push('\n');
    push_section(&mut out, DOWN_MARKER, down);
    out
}

fn push_section(out: &mut String, marker: &str, statements: &[String]) {
    out.push_str(marker);
    out.push('\n');
    out.push_str(STMT_BEGIN);
    out.push('\n');
    for statement in statements {
        out.push_str(statement);
        out.push('\n');
    }
    out.push_str(STMT_END);
    out.push('\n');
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_abs_path() {
        assert_eq!(
            extract_abs_path("ALTER TABLE `/ru-central1/b1g/etn1/orders` ADD COLUMN x Utf8;"),
            Some("/ru-central1/b1g/etn1/orders".to_string())
        );
        assert_eq!(extract_abs_path("SELECT 1;"), None);
        // unquoted paths do not count
        assert_eq!(
            extract_abs_path("ALTER TABLE /ru-central1/b1g/etn1/orders ..."),
            None
        );
    }

    #[test]
    fn test_database_path_is_first_three_segments() {
        assert_eq!(
            database_path_of("/ru-central1/b1g/etn1/dir/orders").as_deref(),
            Some("/ru-central1/b1g/etn1")
        );
        assert_eq!(
            database_path_of("/ru-central1/b1g/etn1").as_deref(),
            Some("/ru-central1/b1g/etn1")
        );
        assert_eq!(database_path_of("/ru-central1/b1g"), None);
    }

    #[test]
    fn test_group_by_database_one_group_per_prefix() {
        let section = "\
-- +goose StatementBegin
ALTER TABLE `/ru-central1/b1g/etn1/orders` ADD COLUMN x Utf8;
-- +goose StatementEnd
-- +goose StatementBegin
ALTER TABLE `/ru-central1/b1g/etn2/orders` ADD COLUMN x Utf8;
-- +goose StatementEnd
ALTER TABLE `/ru-central1/b1g/etn1/archive/orders` ADD COLUMN x Utf8;
";
        let groups = group_by_database(section);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["/ru-central1/b1g/etn1"].len(), 2);
        assert_eq!(groups["/ru-central1/b1g/etn2"].len(), 1);
        // every grouped line shares its group's prefix
        for (db_path, statements) in &groups {
            for statement in statements {
                assert!(statement.contains(&format!("`{}", db_path)));
            }
        }
    }

    #[test]
    fn test_group_by_database_drops_bare_lines() {
        let section = "\
SELECT 1;
-- +goose StatementBegin
-- some comment
UPSERT INTO t VALUES (1);
";
        assert!(group_by_database(section).is_empty());
    }

    #[test]
    fn test_group_by_database_drops_short_paths() {
        let section = "ALTER TABLE `/ru-central1/only-two` ADD COLUMN x Utf8;\n";
        assert!(group_by_database(section).is_empty());
    }

    #[test]
    fn test_subset_migration_shape() {
        let up = vec![
            "ALTER TABLE `/ru-central1/a/b/t` ADD COLUMN x Utf8;".to_string(),
            "ALTER TABLE `/ru-central1/a/b/u` ADD COLUMN x Utf8;".to_string(),
        ];
        let down = vec!["ALTER TABLE `/ru-central1/a/b/t` DROP COLUMN x;".to_string()];
        let text = subset_migration(&up, &down);

        let up_pos = text.find(UP_MARKER).unwrap();
        let down_pos = text.find(DOWN_MARKER).unwrap();
        assert!(up_pos < down_pos);
        // one wrapper per section, not per statement
        assert_eq!(text.matches(STMT_BEGIN).count(), 2);
        assert_eq!(text.matches(STMT_END).count(), 2);
        assert!(text.contains("ADD COLUMN"));
        assert!(text.contains("DROP COLUMN"));
        assert!(text.ends_with(&format!("{}\n", STMT_END)));
    }

    #[test]
    fn test_subset_migration_keeps_empty_down_section() {
        let up = vec!["ALTER TABLE `/ru-central1/a/b/t` ADD COLUMN x Utf8;".to_string()];
        let text = subset_migration(&up, &[]);
        assert!(text.contains(UP_MARKER));
        assert!(text.contains(DOWN_MARKER));
    }
}
