//! Service price resolution
//!
//! Unit prices come from, in order: an external price override, the plan
//! line's own unit cost, then the category default from reference data.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{normalize_key, TreatmentItem};
use crate::reference::ReferenceData;

/// External source of market prices
pub trait PriceSource: Send + Sync {
    /// Unit price for `service` when received by the given member
    fn price_for(&self, service: &str, member_index: usize) -> Option<f64>;
}

/// Price overrides keyed by service name and (optionally) member
#[derive(Debug, Clone, Default)]
pub struct PriceOverrides {
    prices: HashMap<(String, Option<usize>), f64>,
}

impl PriceOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a price; `member_index` None applies to every member
    pub fn insert(&mut self, service: &str, member_index: Option<usize>, price: f64) -> Result<()> {
        if !price.is_finite() || price < 0.0 {
            return Err(Error::InvalidData(format!(
                "Price for '{}' must be non-negative, got {}",
                service, price
            )));
        }
        self.prices.insert((normalize_key(service), member_index), price);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Load from a CSV file
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Parse CSV with columns `service,member,price`
    ///
    /// A blank or `*` member applies the price to every member.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut overrides = Self::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result?;
            let row = line + 2;

            let service = record
                .get(0)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::InvalidData(format!("Row {}: missing service", row)))?;

            let member = match record.get(1).unwrap_or("") {
                "" | "*" => None,
                value => Some(value.parse::<usize>().map_err(|_| {
                    Error::InvalidData(format!("Row {}: invalid member index '{}'", row, value))
                })?),
            };

            let price_str = record
                .get(2)
                .ok_or_else(|| Error::InvalidData(format!("Row {}: missing price", row)))?;
            let price = parse_price(price_str)?;

            overrides.insert(service, member, price)?;
        }

        debug!("Loaded {} price overrides", overrides.len());
        Ok(overrides)
    }
}

impl PriceSource for PriceOverrides {
    fn price_for(&self, service: &str, member_index: usize) -> Option<f64> {
        let key = normalize_key(service);
        self.prices
            .get(&(key.clone(), Some(member_index)))
            .or_else(|| self.prices.get(&(key, None)))
            .copied()
    }
}

/// Unit price for a plan line: override, then line cost, then category default
///
/// An override on an expected-value line is weighted by the line's
/// probability, the same way its own unit cost was.
pub fn resolve_unit_price(
    item: &TreatmentItem,
    reference: &ReferenceData,
    prices: Option<&dyn PriceSource>,
) -> f64 {
    if let Some(price) = prices.and_then(|p| p.price_for(&item.name, item.member_index)) {
        return price * item.probability.unwrap_or(1.0);
    }
    item.unit_cost.unwrap_or_else(|| reference.category_cost(item.category))
}

/// Parse a price string, tolerating currency symbols and commas
fn parse_price(s: &str) -> Result<f64> {
    let cleaned = s.trim().replace(['$', ',', ' '], "");
    cleaned
        .parse::<f64>()
        .map_err(|_| Error::InvalidData(format!("Unable to parse price: {}", s)))
}
