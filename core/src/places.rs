use crate::utils::misc::Typename;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error, strum_macros::IntoStaticStr)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("upstream body is not json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("lookup deadline expired")]
    DeadlineExpired,
}

impl Typename for Error {
    fn typename(&self) -> &'static str {
        self.into()
    }
}

/// Adapter for the external points-of-interest service: one GET per
/// lookup, bounded by the caller's deadline, never panics into the
/// handler. The shared reqwest client makes it safe for concurrent
/// calls.
#[derive(Debug, Clone)]
pub struct PlacesClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl PlacesClient {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self { http: reqwest::Client::new(), endpoint, api_key }
    }

    /// Fetch places near a coordinate. The returned string is the
    /// upstream JSON with its `results` array truncated to
    /// `max_results`, ready to be appended to a WHATSAT reply.
    pub async fn lookup(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        max_results: usize,
        deadline: Duration,
    ) -> Result<String, Error> {
        let body = tokio::time::timeout(deadline, self.fetch(lat, lon, radius_km))
            .await
            .map_err(|_| Error::DeadlineExpired)??;
        truncate_results(&body, max_results)
    }

    async fn fetch(&self, lat: f64, lon: f64, radius_km: f64) -> Result<String, Error> {
        let radius_m = (radius_km * 1000.0).round() as i64;
        debug!(lat, lon, radius_m, "places lookup");
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("location", format!("{},{}", lat, lon)),
                ("radius", radius_m.to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }
        Ok(response.text().await?)
    }
}

/// Cap the upstream `results` array and re-render. A body without a
/// `results` array passes through re-rendered as-is.
fn truncate_results(body: &str, max_results: usize) -> Result<String, Error> {
    let mut value: serde_json::Value = serde_json::from_str(body)?;
    if let Some(results) = value.get_mut("results").and_then(|v| v.as_array_mut()) {
        results.truncate(max_results);
    }
    Ok(serde_json::to_string_pretty(&value)?)
}
