//! Interactive selection seams.
//!
//! Orchestration code only sees the `Picker` trait, so flows stay testable
//! without a terminal. Every method returns `None` for an operator cancel
//! (Esc or q).

use anyhow::{bail, Result};
use console::style;
use dialoguer::{theme::ColorfulTheme, FuzzySelect, Select};
use std::fs;
use std::path::{Path, PathBuf};

use crate::yc::Database;

/// A table offered for selection, annotated with its structural group.
pub struct TableCandidate {
    pub path: String,
    pub group_size: usize,
    pub color: console::Color,
}

pub trait Picker {
    /// Pick a `.sql` migration file under `root`.
    fn choose_migration_file(&self, root: &Path) -> Result<Option<PathBuf>>;
    /// Pick one of the listed databases (index into the slice).
    fn choose_database(&self, databases: &[Database]) -> Result<Option<usize>>;
    /// Pick one table (index into the slice).
    fn choose_table(&self, candidates: &[TableCandidate]) -> Result<Option<usize>>;
}

/// Dialoguer-backed picker for interactive sessions.
pub struct TerminalPicker {
    theme: ColorfulTheme,
}

impl TerminalPicker {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Picker for TerminalPicker {
    fn choose_migration_file(&self, root: &Path) -> Result<Option<PathBuf>> {
        let files = find_sql_files(root)?;
        if files.is_empty() {
            bail!(
                "no .sql migration files under {} (generate one with `ydbmig create`)",
                root.display()
            );
        }
        let labels: Vec<String> = files
            .iter()
            .map(|path| {
                path.strip_prefix(root)
                    .unwrap_or(path)
                    .display()
                    .to_string()
            })
            .collect();
        let choice = FuzzySelect::with_theme(&self.theme)
            .with_prompt("Migration file")
            .items(&labels)
            .default(labels.len() - 1)
            .interact_opt()?;
        Ok(choice.map(|index| files[index].clone()))
    }

    fn choose_database(&self, databases: &[Database]) -> Result<Option<usize>> {
        let labels: Vec<String> = databases
            .iter()
            .map(|db| format!("{}  {}", db.name, style(&db.database).dim()))
            .collect();
        let choice = Select::with_theme(&self.theme)
            .with_prompt("Database")
            .items(&labels)
            .default(0)
            .interact_opt()?;
        Ok(choice)
    }

    fn choose_table(&self, candidates: &[TableCandidate]) -> Result<Option<usize>> {
        let labels: Vec<String> = candidates
            .iter()
            .map(|candidate| {
                let path = style(&candidate.path).fg(candidate.color);
                if candidate.group_size > 1 {
                    format!(
                        "{} {}",
                        path,
                        style(format!("[group of {}]", candidate.group_size)).dim()
                    )
                } else {
                    path.to_string()
                }
            })
            .collect();
        let choice = FuzzySelect::with_theme(&self.theme)
            .with_prompt("Table (siblings share a color)")
            .items(&labels)
            .default(0)
            .interact_opt()?;
        Ok(choice)
    }
}

/// All `.sql` files under `root`, recursively, sorted by path so timestamped
/// names come out oldest first. Hidden entries are skipped.
pub fn find_sql_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_sql_files(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_sql_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_sql_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("sql") {
            out.push(path);
        }
    }
    Ok(())
}
