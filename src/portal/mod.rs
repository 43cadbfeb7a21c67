// src/portal/mod.rs

//! The trade-statistics portal: one form round-trip per (year, HS code).
//!
//! Everything the pipeline needs from the portal goes through [`PageSession`],
//! so tests can swap the HTTP session for a canned one.

pub mod form;
pub mod session;
pub mod table;

pub use form::FormPlan;
pub use session::{HttpPageSession, HttpSessionFactory};
pub use table::parse_result_table;

use crate::error::Result;
use crate::fiscal::TradeType;

pub const IMPORT_URL: &str = "https://tradestat.commerce.gov.in/eidb/icomcntq.asp";
pub const EXPORT_URL: &str = "https://tradestat.commerce.gov.in/eidb/ecomcntq.asp";

// Form control ids on the query page.
pub(crate) const YEAR_SELECT: &str = "#select2";
pub(crate) const USD_RADIO: &str = "#radiousd";
pub(crate) const INR_RADIO: &str = "#radiorupee";
pub(crate) const SUBMIT_BUTTON: &str = "#button1";

/// The result table sits second in the content pane.
pub(crate) const RESULT_TABLE: &str = "body > div > div:nth-of-type(2) > div > table:nth-of-type(2)";

/// Rows shorter than this are merged or header artifacts.
pub const MIN_RESULT_COLUMNS: usize = 4;
pub const COUNTRY_COLUMN: usize = 1;
pub const VALUE_COLUMN: usize = 3;

/// Currency unit radio on the query form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Currency {
    #[default]
    Usd,
    Inr,
}

impl Currency {
    pub(crate) fn radio_selector(&self) -> &'static str {
        match self {
            Currency::Usd => USD_RADIO,
            Currency::Inr => INR_RADIO,
        }
    }
}

/// One data row of the result table, cell text indexed by column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RawRow {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }

    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// A single interactive form round-trip against the portal.
///
/// Each call starts from a fresh page load; nothing is assumed to survive
/// between calls.
#[allow(async_fn_in_trait)]
pub trait PageSession {
    async fn submit_query(&self, year: i32, hs_code: &str, currency: Currency)
        -> Result<Vec<RawRow>>;
}

/// Builds one independent session per HS-code scrape.
pub trait SessionFactory {
    type Session: PageSession;

    fn open(&self, trade_type: TradeType) -> Result<Self::Session>;
}

#[inline]
pub(crate) fn selector(css: &str) -> Result<scraper::Selector> {
    scraper::Selector::parse(css)
        .map_err(|e| crate::error::ScrapeError::Parse(format!("bad selector {}: {:?}", css, e)))
}

/// Visible text of an element with runs of whitespace collapsed.
pub(crate) fn element_text(el: &scraper::ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
