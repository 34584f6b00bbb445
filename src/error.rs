use reqwest::StatusCode;
use std::path::PathBuf;

use crate::util::redact_key;

/// Failure of one pipeline stage.
///
/// Every variant aborts the run. The output file is only ever written after the
/// fetch and transform stages succeed, so any error raised before
/// [`Error::Export`] leaves a previous export untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The query or runtime configuration is malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The request never produced an HTTP response (DNS, connect, timeout, body read).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered, but not with a JSON array of rows.
    #[error("unexpected response from {url}: {detail}")]
    ResponseFormat { url: String, detail: String },

    /// The API answered with a well-formed but empty result set.
    #[error("no estimates returned for {url}")]
    NoData { url: String },

    /// Writing the output file failed.
    #[error("failed to write {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The written file did not read back as the table that was exported.
    #[error("exported file {} does not match the table: {detail}", path.display())]
    ExportVerification { path: PathBuf, detail: String },
}

impl Error {
    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) => 2,
            Error::Transport { .. } => 3,
            Error::ResponseFormat { .. } => 4,
            Error::NoData { .. } => 5,
            Error::ExportVerification { .. } => 6,
            Error::Export { .. } => 7,
        }
    }

    /// Name of the pipeline stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration",
            Error::Transport { .. } | Error::ResponseFormat { .. } | Error::NoData { .. } => {
                "fetcher"
            }
            Error::Export { .. } | Error::ExportVerification { .. } => "exporter",
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn format(url: &str, detail: impl Into<String>) -> Self {
        Error::ResponseFormat {
            url: redact_key(url),
            detail: detail.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Builds the error for a non-success HTTP status.
///
/// The Census API reports most failures as a short plain-text body
/// (`error: unknown variable 'FOO'`), and an unknown key as an HTML page.
pub(crate) fn format_http_error(status: StatusCode, url: &str, body: &str) -> Error {
    let text = body.trim();
    let message = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim();
    let looks_like_html = text.starts_with('<');
    let lower = text.to_lowercase();

    if lower.contains("invalid key") || (looks_like_html && lower.contains("key")) {
        return Error::format(
            url,
            format!(
                "HTTP {}: the API key was rejected.\n- Request a key at https://api.census.gov/data/key_signup.html\n- Activate it from the confirmation email before first use",
                status.as_u16()
            ),
        );
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Error::format(
            url,
            format!(
                "HTTP {}: access denied. Check that the key is valid and activated.\nServer message: {}",
                status.as_u16(),
                message
            ),
        );
    }

    if status == StatusCode::NOT_FOUND {
        return Error::format(
            url,
            format!(
                "HTTP 404: endpoint not found.\n- Expected a timeseries dataset such as https://api.census.gov/data/timeseries/poverty/saipe\nServer message: {}",
                message
            ),
        );
    }

    if status == StatusCode::BAD_REQUEST && lower.contains("unknown variable") {
        return Error::format(
            url,
            format!(
                "HTTP 400: {}\n- See https://api.census.gov/data/timeseries/poverty/saipe/variables.html for valid column names",
                message
            ),
        );
    }

    if looks_like_html {
        return Error::format(url, format!("HTTP {} with an HTML body", status.as_u16()));
    }

    Error::format(url, format!("HTTP {}: {}", status.as_u16(), message))
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://api.census.gov/data/timeseries/poverty/saipe?get=NAME&key=secret";

    fn detail(err: Error) -> String {
        match err {
            Error::ResponseFormat { detail, url } => {
                assert!(!url.contains("secret"), "key leaked into {url}");
                detail
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn unknown_variable_points_at_variable_list() {
        let d = detail(format_http_error(
            StatusCode::BAD_REQUEST,
            URL,
            "error: unknown variable 'SAEPOV_XX'",
        ));
        assert!(d.contains("unknown variable 'SAEPOV_XX'"));
        assert!(d.contains("variables.html"));
    }

    #[test]
    fn html_key_page_is_reported_as_key_problem() {
        let d = detail(format_http_error(
            StatusCode::OK,
            URL,
            "<html><body>Invalid Key: A valid key must be included</body></html>",
        ));
        assert!(d.contains("key was rejected"));
    }

    #[test]
    fn not_found_mentions_endpoint() {
        let d = detail(format_http_error(StatusCode::NOT_FOUND, URL, ""));
        assert!(d.starts_with("HTTP 404"));
    }

    #[test]
    fn exit_codes_are_distinct() {
        let errs = [
            Error::config("x"),
            Error::format(URL, "x"),
            Error::NoData { url: URL.into() },
            Error::Export {
                path: "out.csv".into(),
                source: std::io::Error::other("disk full"),
            },
            Error::ExportVerification {
                path: "out.csv".into(),
                detail: "x".into(),
            },
        ];
        let mut codes: Vec<u8> = errs.iter().map(Error::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn config_errors_name_the_configuration_stage() {
        assert_eq!(Error::config("timeout must be greater than zero").stage(), "configuration");
        assert_eq!(Error::NoData { url: URL.into() }.stage(), "fetcher");
    }
}
