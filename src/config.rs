use anyhow::Context;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::client::DEFAULT_TIMEOUT;
use crate::error::{Error, Result};
use crate::export::{DEFAULT_OUTPUT, ExportOptions};
use crate::query::{DEFAULT_COLUMNS, DEFAULT_ENDPOINT, QuerySpec, RegionSelector};
use crate::util::{split_columns, strip_quotes};

/// Default reporting year.
pub const DEFAULT_YEAR: &str = "2018";
/// Texas.
pub const DEFAULT_STATE: u16 = 48;
/// Harris County.
pub const DEFAULT_COUNTY: u16 = 201;

/// Values supplied explicitly, typically from the command line. They win over
/// every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub key: Option<String>,
    pub year: Option<String>,
    pub state: Option<u16>,
    pub county: Option<u16>,
    pub columns: Option<String>,
    pub output: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub verify_tls: Option<bool>,
    pub verify_export: Option<bool>,
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub query: QuerySpec,
    pub export: ExportOptions,
    pub timeout: Duration,
    pub verify_tls: bool,
}

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    key: Option<String>,
    year: Option<String>,
    state: Option<String>,
    county: Option<String>,
    columns: Option<String>,
    output: Option<String>,
    timeout: Option<String>,
    verify: Option<bool>,
}

impl RcConfig {
    fn set(&mut self, name: &str, value: &str) {
        let v = Some(value.to_string());
        match name {
            "url" => self.url = v,
            "key" => self.key = v,
            "year" => self.year = v,
            "state" => self.state = v,
            "county" => self.county = v,
            "columns" => self.columns = v,
            "output" => self.output = v,
            "timeout" => self.timeout = v,
            "verify" => self.verify = Some(value != "0"),
            _ => {}
        }
    }
}

/// Resolves configuration from (in order of precedence):
/// - explicit `overrides`
/// - environment variables `SAIPE_URL`, `SAIPE_KEY`, `SAIPE_YEAR`, `SAIPE_STATE`,
///   `SAIPE_COUNTY`, `SAIPE_COLUMNS`, `SAIPE_OUTPUT`, `SAIPE_TIMEOUT`
/// - config file from `SAIPE_RC` or `.saipeapirc`
/// - built-in defaults (Harris County, Texas, 2018)
pub fn load_config(overrides: Overrides) -> Result<Config> {
    let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    let candidates = rc_candidates(env("SAIPE_RC"));
    resolve(overrides, &env, &candidates)
}

pub(crate) fn resolve(
    overrides: Overrides,
    env: &dyn Fn(&str) -> Option<String>,
    rc_candidates: &[PathBuf],
) -> Result<Config> {
    let rc = match rc_candidates.iter().find(|p| p.exists()) {
        Some(path) => read_rc(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))
            .map_err(|e| Error::config(format!("{e:#}")))?,
        None => RcConfig::default(),
    };

    let url = overrides
        .url
        .or_else(|| env("SAIPE_URL"))
        .or(rc.url)
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

    let key = match overrides.key.or_else(|| env("SAIPE_KEY")).or(rc.key) {
        Some(v) => v,
        None => {
            let places = rc_candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::config(if places.is_empty() {
                "missing API key (pass --key or set SAIPE_KEY)".to_string()
            } else {
                format!(
                    "missing API key (pass --key, set SAIPE_KEY or put `key:` in one of: {places})"
                )
            }));
        }
    };

    let year = overrides
        .year
        .or_else(|| env("SAIPE_YEAR"))
        .or(rc.year)
        .unwrap_or_else(|| DEFAULT_YEAR.to_string());

    let state = match overrides.state {
        Some(v) => v,
        None => parse_field("state", env("SAIPE_STATE").or(rc.state))?.unwrap_or(DEFAULT_STATE),
    };
    let county = match overrides.county {
        Some(v) => v,
        None => {
            parse_field("county", env("SAIPE_COUNTY").or(rc.county))?.unwrap_or(DEFAULT_COUNTY)
        }
    };

    let columns = overrides
        .columns
        .or_else(|| env("SAIPE_COLUMNS"))
        .or(rc.columns)
        .map(|c| split_columns(&c))
        .unwrap_or_else(|| DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect());

    let output = overrides
        .output
        .or_else(|| env("SAIPE_OUTPUT").or(rc.output).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let timeout = match overrides.timeout {
        Some(t) => t,
        None => parse_field::<u64>("timeout", env("SAIPE_TIMEOUT").or(rc.timeout))?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT),
    };
    if timeout.is_zero() {
        return Err(Error::config("timeout must be greater than zero"));
    }

    let query = QuerySpec::new(&url, columns, RegionSelector { state, county }, year, key)?;

    Ok(Config {
        query,
        export: ExportOptions {
            path: output,
            verify: overrides.verify_export.unwrap_or(true),
        },
        timeout,
        verify_tls: overrides.verify_tls.or(rc.verify).unwrap_or(true),
    })
}

fn parse_field<T: FromStr>(name: &str, raw: Option<String>) -> Result<Option<T>> {
    raw.map(|v| {
        v.trim()
            .parse::<T>()
            .map_err(|_| Error::config(format!("{name} {v:?} is not a number")))
    })
    .transpose()
}

fn read_rc(path: &Path) -> anyhow::Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    let mut cfg = RcConfig::default();

    // Support formatting where `key:` is on one line and the token is on the next line.
    let mut pending: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(name) = pending.take() {
            if !line.contains(':') {
                cfg.set(name, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            if v.is_empty() {
                pending = Some(k);
            } else {
                cfg.set(k, v);
            }
        }
    }

    Ok(cfg)
}

fn rc_candidates(explicit: Option<String>) -> Vec<PathBuf> {
    // 1) SAIPE_RC (explicit)
    // 2) ./.saipeapirc
    // 3) ~/.saipeapirc
    if let Some(p) = explicit {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".saipeapirc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".saipeapirc"));
    }
    v
}
