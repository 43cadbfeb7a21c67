// src/series/table.rs

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    io::{Read, Write},
};

use crate::fiscal::FiscalYear;

/// Label of the portal's synthetic summary row.
pub const TOTAL_ROW: &str = "Total";

pub fn is_total_label(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case(TOTAL_ROW)
}

/// One table row from one scrape. Values are US$ million.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub country: String,
    pub fiscal_year: FiscalYear,
    pub value: f64,
}

/// Sparse country × fiscal-year matrix for one HS code and trade type.
///
/// Rows keep the order in which they were first seen; columns are always
/// reported in ascending calendar-year order. Absent cells read as 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesTable {
    rows: Vec<(String, BTreeMap<FiscalYear, f64>)>,
    index: HashMap<String, usize>,
}

impl SeriesTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one cell. A later record for the same (country, year) replaces the earlier one.
    pub fn insert(&mut self, record: TradeRecord) {
        self.set(&record.country, record.fiscal_year, record.value);
    }

    pub fn set(&mut self, label: &str, year: FiscalYear, value: f64) {
        let idx = match self.index.get(label) {
            Some(&i) => i,
            None => {
                self.rows.push((label.to_string(), BTreeMap::new()));
                self.index.insert(label.to_string(), self.rows.len() - 1);
                self.rows.len() - 1
            }
        };
        self.rows[idx].1.insert(year, value);
    }

    /// Ascending union of every fiscal year carried by any row.
    pub fn years(&self) -> Vec<FiscalYear> {
        self.rows
            .iter()
            .flat_map(|(_, cells)| cells.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|(label, _)| label.as_str())
    }

    pub fn row(&self, label: &str) -> Option<&BTreeMap<FiscalYear, f64>> {
        self.index.get(label).map(|&i| &self.rows[i].1)
    }

    pub fn get(&self, label: &str, year: FiscalYear) -> Option<f64> {
        self.row(label).and_then(|cells| cells.get(&year).copied())
    }

    pub fn value(&self, label: &str, year: FiscalYear) -> f64 {
        self.get(label, year).unwrap_or(0.0)
    }

    /// The portal's summary row, if the source carried one.
    pub fn total_row(&self) -> Option<&BTreeMap<FiscalYear, f64>> {
        self.rows
            .iter()
            .find(|(label, _)| is_total_label(label))
            .map(|(_, cells)| cells)
    }

    pub fn country_rows(&self) -> impl Iterator<Item = (&str, &BTreeMap<FiscalYear, f64>)> {
        self.rows
            .iter()
            .filter(|(label, _)| !is_total_label(label))
            .map(|(label, cells)| (label.as_str(), cells))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Dense view: one record per (row, column) with absent cells filled as 0.
    pub fn records(&self) -> Vec<TradeRecord> {
        let years = self.years();
        self.rows
            .iter()
            .flat_map(|(label, cells)| {
                years.iter().map(move |&fy| TradeRecord {
                    country: label.clone(),
                    fiscal_year: fy,
                    value: cells.get(&fy).copied().unwrap_or(0.0),
                })
            })
            .collect()
    }

    /// Row label column first, then one column per fiscal year, ascending.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let years = self.years();
        let mut wtr = WriterBuilder::new().from_writer(writer);

        let mut header = Vec::with_capacity(years.len() + 1);
        header.push(String::new());
        header.extend(years.iter().map(FiscalYear::to_string));
        wtr.write_record(&header).context("writing series header")?;

        for (label, cells) in &self.rows {
            let mut record = Vec::with_capacity(years.len() + 1);
            record.push(label.clone());
            record.extend(
                years
                    .iter()
                    .map(|fy| cells.get(fy).copied().unwrap_or(0.0).to_string()),
            );
            wtr.write_record(&record)
                .with_context(|| format!("writing series row {}", label))?;
        }
        wtr.flush().context("flushing series csv")?;
        Ok(())
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let years = rdr
            .headers()
            .context("reading series header")?
            .iter()
            .skip(1)
            .map(|h| h.parse::<FiscalYear>().map_err(anyhow::Error::from))
            .collect::<Result<Vec<_>>>()?;

        let mut table = SeriesTable::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.with_context(|| format!("reading series row {}", line + 1))?;
            let Some(label) = record.get(0) else { continue };
            for (fy, raw) in years.iter().zip(record.iter().skip(1)) {
                let raw = raw.trim();
                let value = if raw.is_empty() {
                    0.0
                } else {
                    raw.parse::<f64>().with_context(|| {
                        format!("bad value {:?} for {} in {}", raw, label, fy)
                    })?
                };
                table.set(label, *fy, value);
            }
        }
        Ok(table)
    }
}

impl FromIterator<TradeRecord> for SeriesTable {
    fn from_iter<I: IntoIterator<Item = TradeRecord>>(iter: I) -> Self {
        let mut table = SeriesTable::new();
        for record in iter {
            table.insert(record);
        }
        table
    }
}
