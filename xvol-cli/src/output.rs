use clap::ValueEnum;
use colored::*;
use serde::Serialize;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Renders structured data. Table mode has no layout for arbitrary
    /// values, so it falls back to pretty JSON.
    pub fn render<T: Serialize>(&self, data: &T) -> String {
        match self {
            OutputFormat::Table | OutputFormat::Json => {
                serde_json::to_string_pretty(data).unwrap_or_else(|e| e.to_string())
            }
            OutputFormat::Yaml => serde_yaml::to_string(data).unwrap_or_else(|e| e.to_string()),
        }
    }

    pub fn render_rows<T: Tabled>(&self, rows: Vec<T>, empty: &str) -> String {
        if rows.is_empty() {
            empty.to_string()
        } else {
            Table::new(rows).to_string()
        }
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn print_progress(message: &str) {
    println!("{} {}", "⟳".cyan(), message);
}

pub fn print_section(title: &str) {
    println!("\n{}", title.bold());
}
