// src/scrape.rs

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, ScrapeError};
use crate::fiscal::{FiscalYear, TradeType};
use crate::portal::{Currency, PageSession, RawRow, COUNTRY_COLUMN, MIN_RESULT_COLUMNS, VALUE_COLUMN};
use crate::series::{SeriesTable, TradeRecord};

/// Shared stop switch, checked between years and between HS codes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("scrape cancelled")]
pub struct Cancelled;

/// Per-year outcome, reported while a range is being scraped.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeEvent {
    YearDone { year: i32, rows: usize },
    YearFailed { year: i32, error: String },
}

/// Portal figures come with thousands separators; an empty cell means 0.
/// Negative or non-numeric text is rejected.
pub fn parse_trade_value(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|&c| c != ',').collect();
    if cleaned.is_empty() {
        return Some(0.0);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Column 1 is the country, column 3 the value.
pub fn row_to_record(row: &RawRow, fiscal_year: FiscalYear) -> Result<TradeRecord> {
    if row.len() < MIN_RESULT_COLUMNS {
        return Err(ScrapeError::Parse(format!("{} cells", row.len())));
    }
    let country = row.cell(COUNTRY_COLUMN).unwrap_or_default().trim();
    if country.is_empty() {
        return Err(ScrapeError::Parse("empty country cell".into()));
    }
    let raw = row.cell(VALUE_COLUMN).unwrap_or_default();
    let value = parse_trade_value(raw)
        .ok_or_else(|| ScrapeError::Parse(format!("value {:?} for {}", raw, country)))?;
    Ok(TradeRecord {
        country: country.to_string(),
        fiscal_year,
        value,
    })
}

/// Upper bound on the wait between two attempts at the same year.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// `base * 2^attempt`, saturating and capped at [`MAX_BACKOFF`].
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

/// Runs one [`PageSession`] across a range of fiscal years for one HS code.
pub struct YearRangeScraper<S> {
    session: S,
    currency: Currency,
    retries: u32,
    backoff: Duration,
    cancel: Option<CancelFlag>,
}

impl<S: PageSession> YearRangeScraper<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            currency: Currency::Usd,
            retries: 0,
            backoff: Duration::from_millis(500),
            cancel: None,
        }
    }

    /// Re-run a year up to `retries` more times after a navigation or timeout failure.
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn scrape(
        &self,
        hs_code: &str,
        start_year: i32,
        end_year: i32,
        trade_type: TradeType,
    ) -> std::result::Result<SeriesTable, Cancelled> {
        self.scrape_with_events(hs_code, start_year, end_year, trade_type, &mut |_| {})
            .await
    }

    /// Both bounds inclusive. A failing year is logged and skipped; the
    /// other years still land in the table.
    #[instrument(level = "info", skip(self, on_event), fields(trade = %trade_type))]
    pub async fn scrape_with_events(
        &self,
        hs_code: &str,
        start_year: i32,
        end_year: i32,
        trade_type: TradeType,
        on_event: &mut (dyn FnMut(ScrapeEvent) + Send),
    ) -> std::result::Result<SeriesTable, Cancelled> {
        let mut table = SeriesTable::new();

        for year in start_year..=end_year {
            if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                info!(year, "cancelled before year");
                return Err(Cancelled);
            }

            let fiscal_year = FiscalYear::new(year);
            match self.query_year(hs_code, year).await {
                Ok(rows) => {
                    let mut kept = 0;
                    for row in &rows {
                        match row_to_record(row, fiscal_year) {
                            Ok(record) => {
                                table.insert(record);
                                kept += 1;
                            }
                            Err(e) => debug!(%fiscal_year, error = %e, "skipping row"),
                        }
                    }
                    info!(%fiscal_year, rows = kept, "scraped year");
                    on_event(ScrapeEvent::YearDone { year, rows: kept });
                }
                Err(e) => {
                    warn!(%fiscal_year, error = %e, "error scraping {} HS code {}", trade_type, hs_code);
                    on_event(ScrapeEvent::YearFailed {
                        year,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(table)
    }

    async fn query_year(&self, hs_code: &str, year: i32) -> Result<Vec<RawRow>> {
        let mut attempt = 0;
        loop {
            match self.session.submit_query(year, hs_code, self.currency).await {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_unit_local() && attempt < self.retries => {
                    let delay = backoff_delay(self.backoff, attempt);
                    attempt += 1;
                    warn!(year, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
