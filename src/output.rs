//! Output formatting for parallel map results.

use owo_colors::{OwoColorize, Stream::Stdout};
use serde::Serialize;
use smpmap::SmpError;
use std::io::{self, Write};

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `#<index> <value>` lines.
    #[default]
    Plain,
    /// One JSON object per line.
    Json,
}

impl From<crate::cli::OutputFormatArg> for OutputFormat {
    fn from(arg: crate::cli::OutputFormatArg) -> Self {
        match arg {
            crate::cli::OutputFormatArg::Plain => Self::Plain,
            crate::cli::OutputFormatArg::Json => Self::Json,
        }
    }
}

/// JSON line for one task.
#[derive(Serialize)]
struct Record<'a, T: Serialize> {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Writes results in input order as they arrive.
pub struct ResultPrinter<W: Write> {
    format: OutputFormat,
    out: W,
}

impl<W: Write> ResultPrinter<W> {
    pub fn new(format: OutputFormat, out: W) -> Self {
        Self { format, out }
    }

    /// Print a successful result.
    pub fn value<T: Serialize>(&mut self, index: usize, value: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::Plain => {
                let rendered = serde_json::to_string(value)?;
                writeln!(self.out, "#{} {}", index, rendered)?;
            }
            OutputFormat::Json => self.record(&Record {
                index,
                value: Some(value),
                error: None,
            })?,
        }
        self.out.flush()
    }

    /// Print a task that failed without stopping the run.
    pub fn failure(&mut self, index: usize, error: &SmpError) -> io::Result<()> {
        match self.format {
            OutputFormat::Plain => {
                writeln!(
                    self.out,
                    "#{} {}: {}",
                    index,
                    "error".if_supports_color(Stdout, |text| text.red()),
                    error
                )?;
            }
            OutputFormat::Json => self.record(&Record::<()> {
                index,
                value: None,
                error: Some(error.to_string()),
            })?,
        }
        self.out.flush()
    }

    fn record<T: Serialize>(&mut self, record: &Record<'_, T>) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        writeln!(self.out)
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printed(format: OutputFormat, print: impl FnOnce(&mut ResultPrinter<Vec<u8>>)) -> String {
        let mut printer = ResultPrinter::new(format, Vec::new());
        print(&mut printer);
        String::from_utf8(printer.into_inner()).unwrap()
    }

    #[test]
    fn test_plain_values() {
        let out = printed(OutputFormat::Plain, |p| {
            p.value(0, &2.0f64).unwrap();
            p.value(1, &"text").unwrap();
        });
        assert_eq!(out, "#0 2.0\n#1 \"text\"\n");
    }

    #[test]
    fn test_plain_failure() {
        let err = SmpError::Computation {
            index: 3,
            message: "negative".into(),
        };
        let out = printed(OutputFormat::Plain, |p| p.failure(3, &err).unwrap());
        assert!(out.starts_with("#3 "));
        assert!(out.contains("negative"));
    }

    #[test]
    fn test_json_lines() {
        let err = SmpError::Protocol {
            index: 1,
            reason: "truncated".into(),
        };
        let out = printed(OutputFormat::Json, |p| {
            p.value(0, &[1, 2]).unwrap();
            p.failure(1, &err).unwrap();
        });
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines[0], serde_json::json!({"index": 0, "value": [1, 2]}));
        assert_eq!(lines[1]["index"], 1);
        assert!(lines[1]["error"].as_str().unwrap().contains("truncated"));
        assert!(lines[1].get("value").is_none());
    }
}
