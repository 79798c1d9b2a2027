//! Application context with shared state and utilities

use anyhow::{Context as _, Result};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::PathBuf;

use crate::config::Config;
use crate::goose;

/// Application context passed to all commands
pub struct AppContext {
    /// Working root: where `iam.token`, `ydbmig.toml`, and migrations live
    pub root: PathBuf,
    pub quiet: bool,
    pub config: Config,
}

impl AppContext {
    pub fn new(root_override: Option<PathBuf>, quiet: bool) -> Result<Self> {
        let root = match root_override {
            Some(path) => path,
            None => std::env::current_dir().context("failed to get current directory")?,
        };
        let config = Config::load(&root)?;
        Ok(Self {
            root,
            quiet,
            config,
        })
    }

    pub fn theme(&self) -> ColorfulTheme {
        ColorfulTheme::default()
    }

    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.quiet {
            return Ok(default);
        }
        Ok(Confirm::with_theme(&self.theme())
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }

    pub fn token_path(&self) -> PathBuf {
        self.root.join(&self.config.token_file)
    }

    pub fn migrations_root(&self) -> PathBuf {
        let dir = PathBuf::from(&self.config.migrations_dir);
        if dir.is_absolute() {
            dir
        } else {
            self.root.join(dir)
        }
    }

    pub fn print_header(&self, msg: &str) {
        if !self.quiet {
            println!();
            println!("{}", style(msg).bold());
        }
    }

    pub fn print_success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", style(msg).green());
        }
    }

    pub fn print_warning(&self, msg: &str) {
        if !self.quiet {
            println!("{}", style(msg).yellow());
        }
    }

    pub fn print_info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", style(msg).cyan());
        }
    }

    /// Echo a command line about to run, with token values masked.
    pub fn print_command(&self, line: &str) {
        if self.quiet {
            return;
        }
        let shown = if self.config.mask_secrets {
            goose::mask_secrets(line)
        } else {
            line.to_string()
        };
        println!("{}", style(format!("$ {}", shown)).dim());
    }

    /// Echo a block of raw tool output, dimmed, when debug echo is on.
    pub fn debug_block(&self, label: &str, text: &str) {
        if self.quiet || !self.config.debug_raw {
            return;
        }
        let trimmed = text.trim_end();
        if trimmed.is_empty() {
            return;
        }
        println!("{}", style(format!("[{}]", label)).dim());
        for line in trimmed.lines() {
            println!("  {}", style(line).dim().italic());
        }
    }
}
