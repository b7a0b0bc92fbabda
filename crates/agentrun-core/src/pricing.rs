//! Model pricing used to derive USD cost from token counts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
    #[serde(default)]
    pub cache_read: f64,
}

impl ModelPrice {
    pub const fn new(input: f64, output: f64, cache_read: f64) -> Self {
        Self {
            input,
            output,
            cache_read,
        }
    }
}

/// Prices keyed by model-id prefix. The longest matching prefix wins, so
/// `gpt-5-mini` can be priced separately from `gpt-5`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    prices: BTreeMap<String, ModelPrice>,
}

const PER_MILLION: f64 = 1_000_000.0;

impl Default for PricingTable {
    fn default() -> Self {
        Self::empty()
            .with_price("gpt-4o", ModelPrice::new(2.50, 10.00, 1.25))
            .with_price("gpt-4o-mini", ModelPrice::new(0.15, 0.60, 0.075))
            .with_price("gpt-4.1", ModelPrice::new(2.00, 8.00, 0.50))
            .with_price("gpt-5", ModelPrice::new(1.25, 10.00, 0.125))
            .with_price("gpt-5-mini", ModelPrice::new(0.25, 2.00, 0.025))
            .with_price("claude-sonnet-4", ModelPrice::new(3.00, 15.00, 0.30))
            .with_price("claude-opus-4", ModelPrice::new(15.00, 75.00, 1.50))
            .with_price("claude-haiku-4", ModelPrice::new(1.00, 5.00, 0.10))
    }
}

impl PricingTable {
    /// A table that prices every model at zero.
    pub fn empty() -> Self {
        Self {
            prices: BTreeMap::new(),
        }
    }

    pub fn with_price(mut self, prefix: impl Into<String>, price: ModelPrice) -> Self {
        self.prices.insert(prefix.into(), price);
        self
    }

    pub fn price_for(&self, model: &str) -> Option<&ModelPrice> {
        self.prices
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, price)| price)
    }

    /// Cost of one model call. Unknown models cost nothing.
    ///
    /// `input_tokens` is taken to exclude cache reads, which are priced at
    /// their own rate.
    pub fn cost(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        cache_read_tokens: u64,
    ) -> f64 {
        let Some(price) = self.price_for(model) else {
            return 0.0;
        };
        (input_tokens as f64 * price.input
            + output_tokens as f64 * price.output
            + cache_read_tokens as f64 * price.cache_read)
            / PER_MILLION
    }
}
