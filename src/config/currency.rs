//! Currency conversion table
//!
//! Currencies and their rates are data carried in [`Settings`](super::Settings)
//! and handed to whatever needs to convert an entered amount into the base
//! currency.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::models::Money;

/// Rate and display symbol for one currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyInfo {
    /// Units of this currency per one unit of the base currency
    pub rate: f64,
    pub symbol: String,
}

impl CurrencyInfo {
    pub fn new(rate: f64, symbol: impl Into<String>) -> Self {
        Self {
            rate,
            symbol: symbol.into(),
        }
    }
}

/// Base currency plus the rates of every other known currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyTable {
    pub base: String,
    pub currencies: BTreeMap<String, CurrencyInfo>,
}

impl Default for CurrencyTable {
    fn default() -> Self {
        let mut currencies = BTreeMap::new();
        currencies.insert("USD".to_string(), CurrencyInfo::new(1.0, "$"));
        currencies.insert("EUR".to_string(), CurrencyInfo::new(0.92, "€"));
        currencies.insert("GBP".to_string(), CurrencyInfo::new(0.79, "£"));
        currencies.insert("INR".to_string(), CurrencyInfo::new(83.12, "₹"));
        currencies.insert("JPY".to_string(), CurrencyInfo::new(149.50, "¥"));

        Self {
            base: "USD".to_string(),
            currencies,
        }
    }
}

impl CurrencyTable {
    /// Look up a currency by code (case-insensitive)
    pub fn get(&self, code: &str) -> LedgerResult<&CurrencyInfo> {
        let code = code.trim().to_uppercase();
        self.currencies
            .get(&code)
            .ok_or_else(|| LedgerError::Currency(format!("Unknown currency: {}", code)))
    }

    /// Whether `code` names the base currency
    pub fn is_base(&self, code: &str) -> bool {
        code.trim().eq_ignore_ascii_case(&self.base)
    }

    /// Convert an amount in `code` into the base currency
    pub fn to_base(&self, amount: Money, code: &str) -> LedgerResult<Money> {
        if self.is_base(code) {
            return Ok(amount);
        }
        let info = self.get(code)?;
        if info.rate <= 0.0 {
            return Err(LedgerError::Currency(format!(
                "Invalid rate {} for {}",
                info.rate, code
            )));
        }
        Ok(Money::from_cents(
            (amount.cents() as f64 / info.rate).round() as i64,
        ))
    }

    /// Convert a base-currency amount into `code`
    pub fn from_base(&self, amount: Money, code: &str) -> LedgerResult<Money> {
        if self.is_base(code) {
            return Ok(amount);
        }
        let info = self.get(code)?;
        Ok(Money::from_cents(
            (amount.cents() as f64 * info.rate).round() as i64,
        ))
    }

    /// Display symbol for a currency, falling back to the code itself
    pub fn symbol(&self, code: &str) -> String {
        self.get(code)
            .map(|info| info.symbol.clone())
            .unwrap_or_else(|_| format!("{} ", code.trim().to_uppercase()))
    }
}
