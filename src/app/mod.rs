use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use scim_filter::{Expression, FilterError, ParseOptions, parse_with_options};

use crate::config::Settings;

#[derive(Parser)]
#[command(author, version, about = "Parse SCIM filter expressions", long_about = None)]
pub struct Cli {
    /// Filters to parse
    pub filters: Vec<String>,

    /// File with one filter per line ("-" for stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Settings file (YAML, TOML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Deepest nesting of groups and value paths (default: 64)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Most and/or terms in one filter (default: 10000)
    #[arg(long)]
    pub max_terms: Option<usize>,

    /// Output format (default: jsonl)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Number of threads (default: all cores)
    #[arg(short, long, env = "SCIM_FILTER_THREADS")]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Jsonl,
    Yaml,
    Text,
}

/// One filter to check and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterInput {
    pub name: String,
    pub filter: String,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub name: String,
    pub filter: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
}

#[derive(Debug, Serialize)]
pub struct ReportError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expected: Vec<&'static str>,
}

impl From<&FilterError> for ReportError {
    fn from(err: &FilterError) -> Self {
        let expected = match err {
            FilterError::Syntax(syntax) => syntax.expected.clone(),
            FilterError::ValueType { .. } => Vec::new(),
        };
        ReportError {
            message: err.to_string(),
            position: err.position(),
            expected,
        }
    }
}

/// Gather filters from arguments, the input file and the settings file, in that order.
pub fn collect_inputs(cli: &Cli, settings: &Settings) -> Result<Vec<FilterInput>> {
    let mut inputs: Vec<FilterInput> = cli
        .filters
        .iter()
        .enumerate()
        .map(|(i, filter)| FilterInput {
            name: format!("arg{}", i + 1),
            filter: filter.clone(),
        })
        .collect();

    if let Some(path) = &cli.input {
        let (label, contents) = read_input(path)?;
        inputs.extend(filter_lines(&label, &contents));
    }

    inputs.extend(settings.filters.iter().map(|(name, filter)| FilterInput {
        name: name.clone(),
        filter: filter.clone(),
    }));

    Ok(inputs)
}

fn read_input(path: &Path) -> Result<(String, String)> {
    if path == Path::new("-") {
        let contents = std::io::read_to_string(std::io::stdin())
            .context("CLI: Failed to read filters from stdin")?;
        return Ok(("stdin".to_string(), contents));
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("CLI: Failed to read filters from {:?}", path))?;
    Ok((path.display().to_string(), contents))
}

/// One filter per line; blank lines and `#` comments are skipped.
pub fn filter_lines(label: &str, contents: &str) -> Vec<FilterInput> {
    contents
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| {
            let trimmed = line.trim_start();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(number, line)| FilterInput {
            name: format!("{label}:{number}"),
            filter: line.to_string(),
        })
        .collect()
}

pub fn check(input: &FilterInput, options: &ParseOptions) -> Report {
    match parse_with_options(&input.filter, options) {
        Ok(expression) => Report {
            name: input.name.clone(),
            filter: input.filter.clone(),
            ok: true,
            expression: Some(expression),
            error: None,
        },
        Err(err) => {
            tracing::info!("{}: {}", input.name, err);
            Report {
                name: input.name.clone(),
                filter: input.filter.clone(),
                ok: false,
                expression: None,
                error: Some(ReportError::from(&err)),
            }
        }
    }
}

/// Parse every input in parallel; reports keep input order.
pub fn check_all(inputs: &[FilterInput], options: &ParseOptions) -> Vec<Report> {
    inputs
        .par_iter()
        .map(|input| check(input, options))
        .collect()
}

pub fn write_reports<W: Write>(format: OutputFormat, reports: &[Report], out: &mut W) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, reports)
                .context("Output: Failed to write JSON")?;
            writeln!(out)?;
        }
        OutputFormat::Jsonl => {
            for report in reports {
                serde_json::to_writer(&mut *out, report)
                    .context("Output: Failed to write JSON line")?;
                writeln!(out)?;
            }
        }
        OutputFormat::Yaml => {
            serde_yaml::to_writer(&mut *out, reports).context("Output: Failed to write YAML")?;
        }
        OutputFormat::Text => {
            for report in reports {
                match (&report.expression, &report.error) {
                    (Some(expression), _) => writeln!(out, "{}: {}", report.name, expression)?,
                    (None, Some(error)) => {
                        writeln!(out, "{}: error: {}", report.name, error.message)?
                    }
                    (None, None) => writeln!(out, "{}: error", report.name)?,
                }
            }
        }
    }
    out.flush()?;
    Ok(())
}
