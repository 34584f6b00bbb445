use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result, format_http_error};
use crate::query::QuerySpec;
use crate::table::RawResponse;
use crate::util::redact_key;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of raw API rows for a query.
///
/// [`Client`] is the HTTP implementation; tests and callers with cached data
/// can provide their own.
pub trait Fetch {
    fn fetch(&self, spec: &QuerySpec) -> Result<RawResponse>;
}

/// Blocking client for the Census data API.
///
/// Issues exactly one request per [`Client::fetch`] and never retries.
#[derive(Debug, Clone)]
pub struct Client {
    timeout: Duration,
    verify: bool,
    progress: bool,

    http: HttpClient,
}

impl Client {
    /// Creates a client with a 30 second timeout, TLS verification and a progress spinner.
    pub fn new() -> Result<Self> {
        Self::build(DEFAULT_TIMEOUT, true, true)
    }

    fn build(timeout: Duration, verify: bool, progress: bool) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("saipe-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("saipe-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(timeout);

        if !verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            timeout,
            verify,
            progress,
            http,
        })
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self> {
        Self::build(timeout, self.verify, self.progress)
    }

    /// Disables TLS certificate verification when `verify` is false.
    pub fn with_verify(self, verify: bool) -> Result<Self> {
        Self::build(self.timeout, verify, self.progress)
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn spinner(&self, msg: String) -> Option<ProgressBar> {
        if !self.progress {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg);
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }

    /// Sends `url` and parses the body into rows.
    #[instrument(skip(self, url), fields(url = %redact_key(url)))]
    fn get_rows(&self, url: &str) -> Result<RawResponse> {
        let shown = redact_key(url);
        let pb = self.spinner(format!("querying {}", shown));

        let result = self.http.get(url).send();
        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        let resp = result.map_err(|e| Error::Transport {
            url: shown.clone(),
            source: e.without_url(),
        })?;
        let status = resp.status();
        debug!(%status, "response received");

        let text = resp.text().map_err(|e| Error::Transport {
            url: shown.clone(),
            source: e.without_url(),
        })?;

        if status == StatusCode::NO_CONTENT {
            return Err(Error::NoData { url: shown });
        }
        if !status.is_success() {
            return Err(format_http_error(status, url, &text));
        }
        if text.trim().is_empty() {
            return Err(Error::NoData { url: shown });
        }
        if text.trim_start().starts_with('<') {
            // Unknown keys get an HTML page with a 200.
            return Err(format_http_error(status, url, &text));
        }

        let raw = RawResponse::from_json(&text, url)?;
        if raw.is_empty() {
            return Err(Error::NoData { url: shown });
        }

        info!(rows = raw.data_rows().len(), "estimates fetched");
        Ok(raw)
    }
}

impl Fetch for Client {
    fn fetch(&self, spec: &QuerySpec) -> Result<RawResponse> {
        self.get_rows(spec.request_url().as_str())
    }
}
