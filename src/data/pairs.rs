use std::collections::{BTreeSet, HashMap};

use crate::data::types::PriceResult;
use crate::error::PriceError;

/// Supported external pairs and their Kraken classic pair codes (BTC is XBT upstream).
const CATALOG: [(&str, &str); 3] = [
    ("BTC/CHF", "XXBTZCHF"),
    ("BTC/EUR", "XXBTZEUR"),
    ("BTC/USD", "XXBTZUSD"),
];

pub fn supported() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|(pair, _)| *pair)
}

pub fn symbol_for(pair: &str) -> Option<&'static str> {
    CATALOG
        .iter()
        .find(|(p, _)| *p == pair)
        .map(|(_, symbol)| *symbol)
}

/// Parse a comma-separated `pairs` query into sorted unique pairs.
/// A blank query selects every supported pair.
pub fn normalize(raw: &str) -> Result<Vec<String>, PriceError> {
    if raw.trim().is_empty() {
        return Ok(supported().map(str::to_string).collect());
    }

    let mut pairs = BTreeSet::new();
    for item in raw.split(',') {
        let pair = item.trim().to_uppercase();
        if pair.is_empty() {
            continue;
        }
        if symbol_for(&pair).is_none() {
            return Err(PriceError::UnknownIdentifier(pair));
        }
        pairs.insert(pair);
    }

    if pairs.is_empty() {
        return Err(PriceError::EmptyRequest);
    }
    Ok(pairs.into_iter().collect())
}

/// Sorted unique upstream symbols for `pairs`.
pub fn to_symbols(pairs: &[String]) -> Result<Vec<String>, PriceError> {
    let symbols = pairs
        .iter()
        .map(|pair| {
            symbol_for(pair)
                .map(str::to_string)
                .ok_or_else(|| PriceError::UnknownIdentifier(pair.clone()))
        })
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(symbols.into_iter().collect())
}

/// Map symbol prices back to the requested pairs; pairs without a price are left out.
pub fn to_identifiers(pairs: &[String], prices: &HashMap<String, f64>) -> PriceResult {
    pairs
        .iter()
        .filter_map(|pair| {
            let symbol = symbol_for(pair)?;
            prices.get(symbol).map(|price| (pair.clone(), *price))
        })
        .collect()
}
