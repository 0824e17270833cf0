//! Ticker registry: symbol sources and the one-time bootstrap
//!
//! The registry is loaded from the sink at the start of every session and
//! handed to the extractor as an immutable snapshot.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{MentionError, Result};
use crate::extract::TickerRegistry;
use crate::models::Ticker;
use crate::repository::{MentionSink, SymbolSource};
use crate::retry::{retry, RetryPolicy};
use crate::validation::InputValidator;

const COMPONENT: &str = "iex";

#[derive(Debug, Deserialize)]
struct IexSymbol {
    symbol: String,
    #[serde(default)]
    name: Option<String>,
}

/// Reference symbols from the IEX Cloud REST API
pub struct IexSymbolSource {
    client: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

impl IexSymbolSource {
    pub fn new(base_url: &str, token: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(MentionError::Configuration("IEX token is required".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MentionError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry,
        })
    }

    async fn fetch(&self) -> Result<Vec<IexSymbol>> {
        let url = format!("{}/ref-data/symbols", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .map_err(|e| MentionError::from_http(COMPONENT, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MentionError::from_status(COMPONENT, status.as_u16(), body));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| MentionError::from_http(COMPONENT, &e))?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl SymbolSource for IexSymbolSource {
    async fn list_symbols(&self) -> Result<Vec<Ticker>> {
        let symbols = retry(&self.retry, "list_symbols", || self.fetch()).await?;
        Ok(symbols
            .into_iter()
            .map(|s| Ticker {
                company_name: s.name.unwrap_or_default(),
                symbol: s.symbol,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct CsvSymbol {
    symbol: String,
    #[serde(default, alias = "company_name")]
    name: String,
}

/// Reference symbols from a local CSV file with `symbol,name` headers
pub struct CsvSymbolSource {
    path: PathBuf,
}

impl CsvSymbolSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SymbolSource for CsvSymbolSource {
    async fn list_symbols(&self) -> Result<Vec<Ticker>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(&path)?;
            let mut tickers = Vec::new();
            for row in reader.deserialize::<CsvSymbol>() {
                let row = row?;
                tickers.push(Ticker {
                    symbol: row.symbol,
                    company_name: row.name,
                });
            }
            Ok::<_, MentionError>(tickers)
        })
        .await
        .map_err(|e| MentionError::Configuration(format!("CSV reader task failed: {e}")))?
    }
}

/// Outcome of a registry bootstrap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Symbols returned by the source
    pub listed: usize,
    /// Rows written to the sink
    pub written: usize,
    /// Symbols rejected by validation
    pub invalid: usize,
    /// Repeated symbols in the listing
    pub duplicates: usize,
    /// True when the table was already populated and nothing was fetched
    pub already_populated: bool,
}

/// Populate the ticker table from `source`.
///
/// No-op when the table already has rows, unless `force` is set.
pub async fn bootstrap<S, K>(source: &S, sink: &K, force: bool) -> Result<BootstrapReport>
where
    S: SymbolSource + ?Sized,
    K: MentionSink + ?Sized,
{
    let existing = sink.count_tickers().await?;
    if existing > 0 && !force {
        info!(existing, "Ticker table already populated");
        return Ok(BootstrapReport {
            already_populated: true,
            ..BootstrapReport::default()
        });
    }

    let validator = InputValidator::new()?;
    let listed = source.list_symbols().await?;
    let mut report = BootstrapReport {
        listed: listed.len(),
        ..BootstrapReport::default()
    };

    let mut seen = HashSet::new();
    let mut valid = Vec::with_capacity(listed.len());
    for ticker in listed {
        if let Err(e) = validator.validate_symbol(&ticker) {
            warn!(error = %e, "Skipping invalid symbol");
            report.invalid += 1;
            continue;
        }
        if !seen.insert(ticker.symbol.clone()) {
            report.duplicates += 1;
            continue;
        }
        valid.push(ticker);
    }

    report.written = sink.upsert_tickers(&valid).await?;
    info!(
        listed = report.listed,
        written = report.written,
        invalid = report.invalid,
        duplicates = report.duplicates,
        "Ticker table bootstrapped"
    );
    Ok(report)
}

/// Load the registry snapshot used by a crawl session.
///
/// An empty registry is a configuration error: the bootstrap has not run.
pub async fn load_registry<K: MentionSink + ?Sized>(sink: &K) -> Result<TickerRegistry> {
    let tickers = sink.list_tickers().await?;
    if tickers.is_empty() {
        return Err(MentionError::Configuration(
            "ticker registry is empty; run the bootstrap command first".to_string(),
        ));
    }
    Ok(TickerRegistry::new(tickers))
}
