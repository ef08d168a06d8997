use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use scim_filter::ParseOptions;

use crate::app::OutputFormat;

/// Environment prefix for settings overrides (`SCIM_FILTER_MAX_DEPTH=16`).
pub const ENV_PREFIX: &str = "SCIM_FILTER";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_depth: Option<usize>,
    pub max_terms: Option<usize>,
    pub format: Option<OutputFormat>,
    /// Named filters, checked alongside the ones given on the command line.
    pub filters: BTreeMap<String, String>,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        let settings = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub max_depth: usize,
    pub max_terms: usize,
    pub format: OutputFormat,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_depth: scim_filter::MAX_PARSE_DEPTH,
            max_terms: scim_filter::MAX_LOGICAL_TERMS,
            format: OutputFormat::Jsonl,
        }
    }
}

impl RuntimeConfig {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            max_depth: self.max_depth,
            max_terms: self.max_terms,
        }
    }

    /// Command-line values win over settings, settings over defaults.
    pub fn resolve(
        max_depth: Option<usize>,
        max_terms: Option<usize>,
        format: Option<OutputFormat>,
        settings: &Settings,
    ) -> Self {
        let defaults = Self::default();
        Self {
            max_depth: max_depth
                .or(settings.max_depth)
                .unwrap_or(defaults.max_depth),
            max_terms: max_terms
                .or(settings.max_terms)
                .unwrap_or(defaults.max_terms),
            format: format.or(settings.format).unwrap_or(defaults.format),
        }
    }
}
