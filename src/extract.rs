//! Ticker extraction from free text
//!
//! The extractor is a pure function over a registry snapshot. The heuristic is
//! deliberately simple: a whitespace token is a candidate when it carries the
//! `$` cashtag prefix or is at most five characters long once the prefix is
//! removed, and a candidate counts only when it matches a registry symbol
//! exactly (case-sensitive, punctuation untouched).

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::Ticker;

/// Cashtag prefix
pub const CASHTAG: char = '$';

/// Longest bare token still considered a candidate
pub const MAX_BARE_LEN: usize = 5;

/// Immutable snapshot of valid ticker symbols, loaded once per session
#[derive(Debug, Clone, Default)]
pub struct TickerRegistry {
    symbols: HashSet<String>,
    names: HashMap<String, String>,
}

impl TickerRegistry {
    /// Build a registry from ticker rows.
    #[must_use]
    pub fn new(tickers: Vec<Ticker>) -> Self {
        let mut symbols = HashSet::with_capacity(tickers.len());
        let mut names = HashMap::with_capacity(tickers.len());
        for ticker in tickers {
            symbols.insert(ticker.symbol.clone());
            names.insert(ticker.symbol, ticker.company_name);
        }
        Self { symbols, names }
    }

    /// Symbol set handed to [`extract`]
    #[must_use]
    pub const fn symbols(&self) -> &HashSet<String> {
        &self.symbols
    }

    /// Display name of a symbol
    #[must_use]
    pub fn company_name(&self, symbol: &str) -> Option<&str> {
        self.names.get(symbol).map(String::as_str)
    }

    /// True when `symbol` is registered
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Number of registered symbols
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True when no symbol is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl FromIterator<Ticker> for TickerRegistry {
    fn from_iter<I: IntoIterator<Item = Ticker>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Return the registry symbols mentioned in `text`.
///
/// Duplicates collapse, so `"$AAPL AAPL"` yields a single `AAPL`.
#[must_use]
pub fn extract(text: &str, registry: &HashSet<String>) -> BTreeSet<String> {
    text.split_whitespace()
        .filter_map(candidate)
        .filter(|token| registry.contains(*token))
        .map(ToString::to_string)
        .collect()
}

/// Strip the cashtag prefix and apply the length rule.
fn candidate(token: &str) -> Option<&str> {
    let stripped = token.trim_start_matches(CASHTAG);
    if stripped.is_empty() {
        return None;
    }

    let is_cashtag = stripped.len() != token.len();
    if is_cashtag || stripped.chars().count() <= MAX_BARE_LEN {
        Some(stripped)
    } else {
        None
    }
}
