//! Credential and endpoint resolution.
//!
//! A value comes from the command line first, then the process environment.
//! Variables from the home `.env` file fill in whatever the environment lacks,
//! so they rank last.

use std::{collections::BTreeMap, fs, io, path::Path, sync::OnceLock};

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::paths::DocbatchHome;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_API_BASE";

static HOME_ENV_FILE: OnceLock<()> = OnceLock::new();

pub fn resolve_api_key(cli_value: Option<String>) -> Result<String> {
    lookup(cli_value, API_KEY_ENV)
        .ok_or_else(|| anyhow!("Missing API key: pass --api-key or set {API_KEY_ENV}"))
}

pub fn resolve_base_url(cli_value: Option<String>) -> Option<String> {
    lookup(cli_value, BASE_URL_ENV)
}

fn lookup(cli_value: Option<String>, var: &str) -> Option<String> {
    load_home_env_file();
    first_non_blank([cli_value, std::env::var(var).ok()])
}

fn first_non_blank(candidates: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn load_home_env_file() {
    HOME_ENV_FILE.get_or_init(|| {
        let Some(path) = DocbatchHome::locate().map(|home| home.env_file()) else {
            return;
        };
        match EnvFile::load(&path) {
            Ok(file) => {
                let applied = file.apply_missing();
                debug!(path = %path.display(), applied, "loaded home env file");
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => debug!(path = %path.display(), error = %err, "skipping home env file"),
        }
    });
}

/// Assignments parsed from a dotenv-style file.
///
/// Accepts `KEY=value`, `export KEY=value`, single or double quoted values and
/// `#` comments. Lines that are not assignments are ignored. A repeated key
/// keeps its last value.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EnvFile {
    vars: BTreeMap<String, String>,
}

impl EnvFile {
    pub fn load(path: &Path) -> io::Result<Self> {
        fs::read_to_string(path).map(|contents| Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Self {
        Self {
            vars: contents.lines().filter_map(parse_line).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Exports every variable the process does not already define and
    /// returns how many were set.
    pub fn apply_missing(&self) -> usize {
        let mut applied = 0;
        for (key, value) in &self.vars {
            if std::env::var_os(key).is_some() {
                continue;
            }
            // Only reached through `load_home_env_file`, once per process.
            unsafe {
                std::env::set_var(key, value);
            }
            applied += 1;
        }
        applied
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    let line = line
        .strip_prefix("export")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map_or(line, str::trim_start);
    if line.starts_with('#') {
        return None;
    }

    let (key, raw) = line.split_once('=')?;
    let key = key.trim_end();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key.to_string(), parse_value(raw.trim())))
}

fn parse_value(raw: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(inner) = raw
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    // Unquoted values may carry a trailing comment.
    raw.split_once(" #")
        .map_or(raw, |(value, _)| value)
        .trim_end()
        .to_string()
}
