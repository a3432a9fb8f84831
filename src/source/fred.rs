//! FRED (St. Louis Fed) API client: observations, series metadata, releases.

use futures::future::join_all;
use serde_json::Value;
use tracing::info;

use crate::model::{FetchError, MetaRecord, MetaValue, RawObservation, meta_record_from_json};
use crate::source::retry::RetryingClient;
use crate::source::traits::EconSource;

const BASE_URL: &str = "https://api.stlouisfed.org/fred";

pub const SERIES_META_COLUMNS: [&str; 12] = [
    "id",
    "title",
    "realtime_start",
    "realtime_end",
    "observation_start",
    "observation_end",
    "frequency",
    "units",
    "seasonal_adjustment",
    "last_updated",
    "popularity",
    "notes",
];

const RELEASE_COLUMNS: [&str; 6] = ["id", "realtime_start", "realtime_end", "name", "press_release", "link"];

pub struct FredClient {
    http: RetryingClient,
    api_key: String,
    base_url: String,
}

impl FredClient {
    pub fn new(http: RetryingClient, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn params(&self, series_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("api_key", self.api_key.clone()),
            ("file_type", "json".to_string()),
            ("series_id", series_id.to_string()),
        ]
    }

    /// Issues one request per id concurrently; the first failure fails the batch.
    async fn fetch_each(&self, endpoint: &str, ids: &[String]) -> Result<Vec<(String, Value)>, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let requests = ids.iter().map(|id| {
            let url = url.clone();
            async move {
                let params = self.params(id);
                let payload = self.http.get_json(&url, &params).await?;
                Ok::<_, FetchError>((id.clone(), payload))
            }
        });

        join_all(requests).await.into_iter().collect()
    }
}

#[async_trait::async_trait]
impl EconSource for FredClient {
    async fn fetch_observations(&self, ids: &[String]) -> Result<Vec<RawObservation>, FetchError> {
        let payloads = self.fetch_each("/series/observations", ids).await?;
        let mut rows = Vec::new();
        for (id, payload) in payloads {
            rows.extend(parse_observations(&id, &payload)?);
        }
        info!("Fetched {} FRED observations for {} series", rows.len(), ids.len());
        Ok(rows)
    }

    async fn fetch_metadata(&self, ids: &[String]) -> Result<Vec<MetaRecord>, FetchError> {
        let payloads = self.fetch_each("/series", ids).await?;
        let mut records = Vec::new();
        for (_, payload) in payloads {
            records.extend(parse_series_meta(&payload)?);
        }
        Ok(records)
    }

    async fn fetch_releases(&self, ids: &[String]) -> Result<Vec<MetaRecord>, FetchError> {
        let payloads = self.fetch_each("/series/release", ids).await?;
        let mut records = Vec::new();
        for (id, payload) in payloads {
            records.extend(parse_release(&id, &payload)?);
        }
        Ok(records)
    }
}

fn payload_array<'a>(payload: &'a Value, key: &str) -> Result<&'a Vec<Value>, FetchError> {
    if let Some(message) = payload.get("error_message").and_then(Value::as_str) {
        return Err(FetchError::Upstream(message.to_string()));
    }
    payload
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Decode(format!("missing {key:?} array in FRED payload")))
}

pub fn parse_observations(id: &str, payload: &Value) -> Result<Vec<RawObservation>, FetchError> {
    payload_array(payload, "observations")?
        .iter()
        .map(|entry| {
            let date = entry
                .get("date")
                .and_then(Value::as_str)
                .ok_or_else(|| FetchError::Decode(format!("observation without date for {id}")))?;
            let value = entry.get("value").cloned().unwrap_or(Value::Null);
            Ok(RawObservation::new(id, date, value))
        })
        .collect()
}

pub fn parse_series_meta(payload: &Value) -> Result<Vec<MetaRecord>, FetchError> {
    Ok(payload_array(payload, "seriess")?
        .iter()
        .map(|entry| meta_record_from_json(entry, &SERIES_META_COLUMNS))
        .collect())
}

/// First release of the series, tagged with `series_id`.
pub fn parse_release(series_id: &str, payload: &Value) -> Result<Option<MetaRecord>, FetchError> {
    Ok(payload_array(payload, "releases")?.first().map(|entry| {
        let mut record = meta_record_from_json(entry, &RELEASE_COLUMNS);
        record.insert("series_id".to_string(), MetaValue::from(series_id));
        record
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::meta_text;
    use serde_json::json;

    #[test]
    fn observations_keep_raw_values() {
        let payload = json!({
            "observations": [
                {"realtime_start": "2024-01-01", "date": "2023-01-01", "value": "299.17"},
                {"realtime_start": "2024-01-01", "date": "2023-02-01", "value": "."}
            ]
        });

        let rows = parse_observations("CPIAUCSL", &payload).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], RawObservation::new("CPIAUCSL", "2023-01-01", json!("299.17")));
        assert_eq!(rows[1].value, json!("."));
    }

    #[test]
    fn upstream_error_message_is_reported() {
        let payload = json!({"error_code": 400, "error_message": "Bad Request. The series does not exist."});
        assert!(matches!(parse_observations("NOPE", &payload), Err(FetchError::Upstream(_))));
        assert!(matches!(parse_observations("NOPE", &json!({})), Err(FetchError::Decode(_))));
    }

    #[test]
    fn series_meta_uses_known_columns() {
        let payload = json!({"seriess": [{"id": "UNRATE", "title": "Unemployment Rate", "units": "Percent", "popularity": 94}]});

        let records = parse_series_meta(&payload).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), SERIES_META_COLUMNS.len());
        assert_eq!(meta_text(&records[0], "units"), Some("Percent"));
        assert_eq!(records[0]["notes"], MetaValue::Null);
    }

    #[test]
    fn release_is_tagged_with_series() {
        let payload = json!({"releases": [{"id": 10, "name": "Consumer Price Index", "link": "http://www.bls.gov/cpi/"}]});

        let record = parse_release("CPIAUCSL", &payload).unwrap().unwrap();

        assert_eq!(meta_text(&record, "series_id"), Some("CPIAUCSL"));
        assert_eq!(record["id"], MetaValue::Integer(10));
        assert!(parse_release("X", &json!({"releases": []})).unwrap().is_none());
    }
}
