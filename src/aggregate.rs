// src/aggregate.rs

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    io::Write,
};
use tracing::{debug, warn};

use crate::fiscal::{FiscalYear, TradeType};
use crate::series::{SeriesStore, SeriesTable};

pub const COMBINED_COUNTRYWISE_FILE: &str = "combined_countrywise_trade.csv";

/// One point of the trend chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub fiscal_year: String,
    pub total: f64,
}

/// Total trade value per fiscal year, summed across HS codes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedTotals(BTreeMap<FiscalYear, f64>);

impl CombinedTotals {
    pub fn get(&self, year: FiscalYear) -> Option<f64> {
        self.0.get(&year).copied()
    }

    /// Ascending by calendar year.
    pub fn iter(&self) -> impl Iterator<Item = (FiscalYear, f64)> + '_ {
        self.0.iter().map(|(fy, v)| (*fy, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn chart_series(&self) -> Vec<ChartPoint> {
        self.iter()
            .map(|(fy, total)| ChartPoint {
                fiscal_year: fy.to_string(),
                total,
            })
            .collect()
    }
}

/// Fiscal year → country → value, summed across HS codes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedCountryTable(BTreeMap<FiscalYear, BTreeMap<String, f64>>);

impl CombinedCountryTable {
    pub fn get(&self, year: FiscalYear, country: &str) -> Option<f64> {
        self.0.get(&year).and_then(|c| c.get(country)).copied()
    }

    pub fn year(&self, year: FiscalYear) -> Option<&BTreeMap<String, f64>> {
        self.0.get(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = FiscalYear> + '_ {
        self.0.keys().copied()
    }

    /// Union of countries over every year, sorted.
    pub fn countries(&self) -> BTreeSet<&str> {
        self.0
            .values()
            .flat_map(|c| c.keys().map(String::as_str))
            .collect()
    }

    /// One row per fiscal year, one column per country; gaps are 0.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let countries = self.countries();
        let mut wtr = WriterBuilder::new().from_writer(writer);

        let mut header = vec!["Fiscal Year".to_string()];
        header.extend(countries.iter().map(|c| c.to_string()));
        wtr.write_record(&header).context("writing countrywise header")?;

        for (fy, values) in &self.0 {
            let mut record = vec![fy.to_string()];
            record.extend(
                countries
                    .iter()
                    .map(|c| values.get(*c).copied().unwrap_or(0.0).to_string()),
            );
            wtr.write_record(&record)
                .with_context(|| format!("writing countrywise row {}", fy))?;
        }
        wtr.flush().context("flushing countrywise csv")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub totals: CombinedTotals,
    /// `None` when no table carried a single country row.
    pub countries: Option<CombinedCountryTable>,
}

/// Combine already-loaded tables.
///
/// A table's contribution to the totals comes from its `Total` row when it has
/// one, otherwise from the sum of its country rows.
pub fn merge_tables<'a, I>(tables: I) -> Aggregation
where
    I: IntoIterator<Item = &'a SeriesTable>,
{
    let mut totals: BTreeMap<FiscalYear, f64> = BTreeMap::new();
    let mut countries: BTreeMap<FiscalYear, BTreeMap<String, f64>> = BTreeMap::new();

    for table in tables {
        let total_row = table.total_row();
        for fy in table.years() {
            let contribution = match total_row {
                Some(row) => row.get(&fy).copied().unwrap_or(0.0),
                None => table
                    .country_rows()
                    .map(|(_, cells)| cells.get(&fy).copied().unwrap_or(0.0))
                    .sum(),
            };
            *totals.entry(fy).or_insert(0.0) += contribution;

            for (country, cells) in table.country_rows() {
                *countries
                    .entry(fy)
                    .or_default()
                    .entry(country.to_string())
                    .or_insert(0.0) += cells.get(&fy).copied().unwrap_or(0.0);
            }
        }
    }

    Aggregation {
        totals: CombinedTotals(totals),
        countries: (!countries.is_empty()).then_some(CombinedCountryTable(countries)),
    }
}

/// Load each code's table from `store` and merge them. Codes with nothing
/// stored, or whose table cannot be read, contribute nothing.
pub fn aggregate<S>(store: &S, hs_codes: &[String], trade_type: TradeType) -> Aggregation
where
    S: SeriesStore + ?Sized,
{
    let mut tables = Vec::with_capacity(hs_codes.len());
    for hs_code in hs_codes {
        match store.load(hs_code, trade_type) {
            Ok(Some(table)) => {
                debug!(hs_code = %hs_code, rows = table.len(), years = table.years().len(), "loaded series");
                tables.push(table);
            }
            Ok(None) => debug!(hs_code = %hs_code, "no series stored; skipping"),
            Err(e) => warn!(hs_code = %hs_code, error = ?e, "could not load series; skipping"),
        }
    }
    merge_tables(&tables)
}
