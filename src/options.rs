//! Ingestion/summary behaviour options.
//!
//! A fixed, enumerated set of named options; unknown and deprecated names
//! fail fast with a specific error instead of being absorbed silently.

use crate::Result;
use anyhow::bail;

#[derive(Debug, Clone)]
pub struct Options {
    /// Print the parameter set after loading a file.
    pub print_params: bool,
    /// Workload-phase labels by position; `w<n>` past the end.
    pub w_labels: Vec<String>,
    /// Order the pressure summary chronologically by phase number; when
    /// off, order by descending mean throughput.
    pub use_at3_counters: bool,
    /// Fixed label for the file, overriding the `.label` sidecar.
    pub file_label: Option<String>,
    /// Print the normalized pressure values with the summary.
    pub print_pressure: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            print_params: false,
            w_labels: Vec::new(),
            use_at3_counters: true,
            file_label: None,
            print_pressure: false,
        }
    }
}

/// Names that used to exist and now point to their replacements.
const DEPRECATED: &[(&str, &str)] = &[
    ("file_start_time", "parameter is no longer supported"),
    ("db_mean_interval", "use the plotting layer's mean-interval setting"),
    ("pressure_decreased", "use print_pressure"),
    ("print_pressure_values", "use print_pressure"),
    ("plot_io_norm", "parameter is no longer supported"),
    ("all_pressure_label", "use file_label"),
];

impl Options {
    /// Apply one `name=value` assignment, validating the name against the
    /// enumerated option set.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        if let Some((_, hint)) = DEPRECATED.iter().find(|(n, _)| *n == name) {
            bail!("option {} is deprecated: {}", name, hint);
        }
        match name {
            "print_params" => self.print_params = parse_bool(name, value)?,
            "use_at3_counters" => self.use_at3_counters = parse_bool(name, value)?,
            "print_pressure" => self.print_pressure = parse_bool(name, value)?,
            "file_label" => self.file_label = Some(value.to_string()),
            "w_labels" => {
                self.w_labels = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            _ => bail!("invalid option name: {}", name),
        }
        Ok(())
    }

    /// Apply a list of `name=value` assignments (e.g. from the CLI).
    pub fn apply_all<'a>(&mut self, assignments: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for assignment in assignments {
            match assignment.split_once('=') {
                Some((name, value)) => self.set(name.trim(), value.trim())?,
                None => bail!("expected name=value, got: {}", assignment),
            }
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" => Ok(true),
        "0" | "f" | "false" | "n" | "no" => Ok(false),
        _ => bail!("option {} expects a boolean, got: {}", name, value),
    }
}
