//! EOD Historical Data API client: daily bars and exchange ticker lists.

use chrono::NaiveDate;
use futures::future::join_all;
use serde_json::Value;
use tracing::info;

use crate::model::{FetchError, MetaRecord, MetaValue, PriceBar};
use crate::series::frame::format_date;
use crate::source::retry::RetryingClient;
use crate::source::traits::MarketSource;

const BASE_URL: &str = "https://eodhd.com/api";

/// Upstream ticker field -> stored column.
const TICKER_FIELDS: [(&str, &str); 6] = [
    ("Name", "name"),
    ("Country", "country"),
    ("Exchange", "exchange"),
    ("Currency", "currency"),
    ("Type", "type"),
    ("Isin", "isin"),
];

pub struct EodClient {
    http: RetryingClient,
    api_token: String,
    base_url: String,
}

impl EodClient {
    pub fn new(http: RetryingClient, api_token: impl Into<String>) -> Self {
        Self {
            http,
            api_token: api_token.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        vec![("api_token", self.api_token.clone()), ("fmt", "json".to_string())]
    }

    async fn fetch_symbol(&self, symbol: &str, from: NaiveDate) -> Result<Vec<PriceBar>, FetchError> {
        let url = format!("{}/eod/{}", self.base_url, symbol);
        let mut params = self.params();
        params.push(("from", format_date(from)));
        let payload = self.http.get_json(&url, &params).await?;
        parse_history(symbol, payload)
    }
}

#[async_trait::async_trait]
impl MarketSource for EodClient {
    async fn fetch_history(&self, symbols: &[String], from: NaiveDate) -> Result<Vec<PriceBar>, FetchError> {
        let results = join_all(symbols.iter().map(|s| self.fetch_symbol(s, from))).await;
        let mut bars = Vec::new();
        for result in results {
            bars.extend(result?);
        }
        info!("Fetched {} EOD bars for {} symbols since {}", bars.len(), symbols.len(), from);
        Ok(bars)
    }

    async fn fetch_tickers(&self, exchange: &str) -> Result<Vec<MetaRecord>, FetchError> {
        let url = format!("{}/exchange-symbol-list/{}", self.base_url, exchange);
        let payload = self.http.get_json(&url, &self.params()).await?;
        parse_tickers(exchange, &payload)
    }
}

pub fn parse_history(symbol: &str, payload: Value) -> Result<Vec<PriceBar>, FetchError> {
    let mut bars: Vec<PriceBar> =
        serde_json::from_value(payload).map_err(|e| FetchError::Decode(format!("{symbol}: {e}")))?;
    for bar in &mut bars {
        bar.symbol = symbol.to_string();
    }
    Ok(bars)
}

/// Ticker rows keyed by `code` in the `{Code}.{exchange}` form the history
/// endpoint expects.
pub fn parse_tickers(exchange: &str, payload: &Value) -> Result<Vec<MetaRecord>, FetchError> {
    let entries = payload
        .as_array()
        .ok_or_else(|| FetchError::Decode(format!("ticker list for {exchange} is not an array")))?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let code = entry.get("Code")?.as_str()?;
            let mut record = MetaRecord::new();
            record.insert("code".to_string(), MetaValue::Text(format!("{code}.{exchange}")));
            for (field, column) in TICKER_FIELDS {
                let value = entry.get(field).map(MetaValue::from).unwrap_or(MetaValue::Null);
                record.insert(column.to_string(), value);
            }
            Some(record)
        })
        .collect())
}
