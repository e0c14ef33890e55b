//! Output formatting for infra
//!
//! Results go to stdout as a table, JSON, or YAML. Status messages go to
//! stderr so that machine-readable output stays pipeable.

use colored::Colorize;
use infra::config::OutputFormat;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output formatter for the selected format
pub struct OutputFormatter {
    /// Result format
    format: OutputFormat,
    /// Use colored output
    use_color: bool,
    /// Verbosity level
    verbosity: u8,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(format: OutputFormat, use_color: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();
        colored::control::set_override(use_color);

        Self {
            format,
            use_color,
            verbosity,
        }
    }

    pub fn is_table(&self) -> bool {
        self.format == OutputFormat::Table
    }

    /// Render a list: the table uses `row`, JSON and YAML the items themselves.
    pub fn list<T, R, F>(&self, items: &[T], row: F) -> anyhow::Result<()>
    where
        T: Serialize,
        R: Tabled,
        F: Fn(&T) -> R,
    {
        match self.format {
            OutputFormat::Table => {
                if items.is_empty() {
                    self.note("No results.");
                    return Ok(());
                }
                let mut table = Table::new(items.iter().map(row));
                table.with(Style::rounded());
                println!("{}", table);
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(items)?),
        }
        Ok(())
    }

    /// Render a single record as `field: value` lines, or as JSON/YAML.
    pub fn record<T: Serialize>(&self, item: &T, fields: &[(&str, String)]) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Table => {
                let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
                for (key, value) in fields {
                    let label = format!("{:<width$}", key, width = width);
                    if self.use_color {
                        println!("{}  {}", label.bright_black(), value);
                    } else {
                        println!("{}  {}", label, value);
                    }
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(item)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(item)?),
        }
        Ok(())
    }

    /// Print a raw value (secret, ciphertext, command output) on stdout.
    pub fn raw(&self, value: &str) {
        println!("{}", value);
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "OK:".green().bold(), message);
        } else {
            eprintln!("OK: {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 {
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "INFO:".blue(), message);
        } else {
            eprintln!("INFO: {}", message);
        }
    }

    /// Print a dimmed note in table mode only
    pub fn note(&self, message: &str) {
        if !self.is_table() {
            return;
        }
        if self.use_color {
            eprintln!("{}", message.dimmed());
        } else {
            eprintln!("{}", message);
        }
    }
}

/// Render an optional value for a table cell
pub fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Color a resource state for a table cell
pub fn state_cell(state: &str) -> String {
    match state {
        "running" | "available" | "in-use" | "Enabled" | "Success"
        | "CREATE_COMPLETE" | "UPDATE_COMPLETE" => state.green().to_string(),
        "stopped" | "terminated" | "Disabled" | "PendingDeletion" | "DELETE_COMPLETE" => {
            state.bright_black().to_string()
        }
        s if s.ends_with("FAILED") || s.contains("ROLLBACK") || s == "Failed" => {
            s.red().to_string()
        }
        s if s.ends_with("IN_PROGRESS")
            || s == "pending"
            || s == "stopping"
            || s == "InProgress" =>
        {
            s.yellow().to_string()
        }
        s => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(Some("10.0.0.1")), "10.0.0.1");
        assert_eq!(or_dash::<String>(None), "-");
    }

    #[test]
    fn test_state_cell_without_color() {
        colored::control::set_override(false);
        assert_eq!(state_cell("running"), "running");
        assert_eq!(state_cell("ROLLBACK_FAILED"), "ROLLBACK_FAILED");
        assert_eq!(state_cell("whatever"), "whatever");
    }
}
