use reqwest::Url;

use crate::error::{Error, Result};

/// Default SAIPE timeseries endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.census.gov/data/timeseries/poverty/saipe";

/// Columns requested when none are configured: county name, year echo and the
/// three reported estimates.
pub const DEFAULT_COLUMNS: [&str; 5] = [
    "NAME",
    "YEAR",
    "SAEPOV0_17_PT",
    "SAEPOVALL_PT",
    "SAEMHI_PT",
];

/// The field every query must request so rows can be labeled.
pub const NAME_COLUMN: &str = "NAME";

/// State and county FIPS codes selecting a single county.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSelector {
    pub state: u16,
    pub county: u16,
}

impl RegionSelector {
    /// `for` clause, e.g. `county:201`.
    pub fn county_clause(&self) -> String {
        format!("county:{:03}", self.county)
    }

    /// `in` clause, e.g. `state:48`.
    pub fn state_clause(&self) -> String {
        format!("state:{:02}", self.state)
    }
}

/// A validated description of one SAIPE request.
///
/// Construct with [`QuerySpec::new`]; the fields are read-only afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct QuerySpec {
    endpoint: Url,
    columns: Vec<String>,
    region: RegionSelector,
    year: String,
    key: String,
}

impl std::fmt::Debug for QuerySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySpec")
            .field("endpoint", &self.endpoint.as_str())
            .field("columns", &self.columns)
            .field("region", &self.region)
            .field("year", &self.year)
            .field("key", &"***")
            .finish()
    }
}

impl QuerySpec {
    pub fn new(
        endpoint: &str,
        columns: Vec<String>,
        region: RegionSelector,
        year: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint.trim())
            .map_err(|e| Error::config(format!("endpoint {endpoint:?} is not a valid URL: {e}")))?;
        if endpoint.cannot_be_a_base() || !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "endpoint {endpoint} must be an http(s) URL"
            )));
        }

        if columns.is_empty() {
            return Err(Error::config("at least one column must be requested"));
        }
        if let Some(bad) = columns
            .iter()
            .find(|c| c.trim().is_empty() || c.contains(',') || c.trim() != c.as_str())
        {
            return Err(Error::config(format!("invalid column name {bad:?}")));
        }
        if !columns.iter().any(|c| c == NAME_COLUMN) {
            return Err(Error::config(format!(
                "requested columns must include {NAME_COLUMN}"
            )));
        }

        if !(1..=99).contains(&region.state) {
            return Err(Error::config(format!(
                "state code {} is not a 2-digit FIPS code",
                region.state
            )));
        }
        if !(1..=999).contains(&region.county) {
            return Err(Error::config(format!(
                "county code {} is not a 3-digit FIPS code",
                region.county
            )));
        }

        let year = year.into();
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::config(format!("year {year:?} must be four digits")));
        }

        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::config("API key must not be empty"));
        }

        Ok(Self {
            endpoint,
            columns,
            region,
            year,
            key: key.trim().to_string(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn region(&self) -> RegionSelector {
        self.region
    }

    pub fn year(&self) -> &str {
        &self.year
    }

    /// The full request target. Contains the credential; redact before logging.
    pub fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("get", &self.columns.join(","))
            .append_pair("for", &self.region.county_clause())
            .append_pair("in", &self.region.state_clause())
            .append_pair("time", &self.year)
            .append_pair("key", &self.key);
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harris() -> RegionSelector {
        RegionSelector {
            state: 48,
            county: 201,
        }
    }

    fn columns() -> Vec<String> {
        DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn builds_census_query_string() {
        let spec = QuerySpec::new(DEFAULT_ENDPOINT, columns(), harris(), "2018", "k3y").unwrap();
        let url = spec.request_url();
        assert_eq!(url.path(), "/data/timeseries/poverty/saipe");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("get".into(), "NAME,YEAR,SAEPOV0_17_PT,SAEPOVALL_PT,SAEMHI_PT".into()),
                ("for".into(), "county:201".into()),
                ("in".into(), "state:48".into()),
                ("time".into(), "2018".into()),
                ("key".into(), "k3y".into()),
            ]
        );
    }

    #[test]
    fn fips_codes_are_zero_padded() {
        let region = RegionSelector { state: 1, county: 3 };
        assert_eq!(region.county_clause(), "county:003");
        assert_eq!(region.state_clause(), "state:01");
    }

    #[test]
    fn rejects_malformed_specs() {
        let cases: Vec<(Vec<String>, RegionSelector, &str, &str)> = vec![
            (vec![], harris(), "2018", "k"),
            (vec!["YEAR".into()], harris(), "2018", "k"),
            (vec!["NAME".into(), "A,B".into()], harris(), "2018", "k"),
            (columns(), RegionSelector { state: 0, county: 201 }, "2018", "k"),
            (columns(), RegionSelector { state: 48, county: 1000 }, "2018", "k"),
            (columns(), harris(), "18", "k"),
            (columns(), harris(), "20x8", "k"),
            (columns(), harris(), "2018", "  "),
        ];
        for (cols, region, year, key) in cases {
            let err = QuerySpec::new(DEFAULT_ENDPOINT, cols.clone(), region, year, key)
                .expect_err(&format!("{cols:?} {region:?} {year} accepted"));
            assert!(matches!(err, Error::Config(_)), "{err:?}");
        }
    }

    #[test]
    fn rejects_bad_endpoint() {
        let err = QuerySpec::new("not a url", columns(), harris(), "2018", "k").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = QuerySpec::new("ftp://x.test/saipe", columns(), harris(), "2018", "k").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn debug_output_hides_key() {
        let spec = QuerySpec::new(DEFAULT_ENDPOINT, columns(), harris(), "2018", "s3cret").unwrap();
        assert!(!format!("{spec:?}").contains("s3cret"));
    }
}
