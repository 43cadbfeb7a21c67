// src/pipeline.rs

use anyhow::Context;
use std::{collections::HashSet, path::PathBuf, time::Duration};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::aggregate::{aggregate, Aggregation, ChartPoint, COMBINED_COUNTRYWISE_FILE};
use crate::archive::{Archive, ArchiveBuilder};
use crate::fiscal::{FiscalYear, TradeType};
use crate::portal::SessionFactory;
use crate::scrape::{CancelFlag, YearRangeScraper};
use crate::series::{SeriesStore, StoreHandle};

/// What the user asked for in one submit action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    pub hs_codes: Vec<String>,
    pub start_year: i32,
    pub end_year: i32,
    pub trade_type: TradeType,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Please select at least one HS Code before fetching data.")]
    NoHsCodes,
    #[error("HS code {0:?} must be letters and digits only")]
    InvalidHsCode(String),
    #[error("start year {start} is after end year {end}")]
    InvertedRange { start: i32, end: i32 },
    #[error("fiscal year {0} is outside the supported range")]
    UnsupportedYear(FiscalYear),
}

impl TradeRequest {
    pub fn new<I, S>(hs_codes: I, start_year: i32, end_year: i32, trade_type: TradeType) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hs_codes: hs_codes.into_iter().map(Into::into).collect(),
            start_year,
            end_year,
            trade_type,
        }
    }

    /// Trimmed, de-duplicated (first occurrence wins) and checked.
    pub fn validate(&self) -> Result<TradeRequest, RequestError> {
        let mut seen = HashSet::new();
        let mut hs_codes = Vec::with_capacity(self.hs_codes.len());
        for code in self.hs_codes.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(RequestError::InvalidHsCode(code.to_string()));
            }
            if seen.insert(code) {
                hs_codes.push(code.to_string());
            }
        }
        if hs_codes.is_empty() {
            return Err(RequestError::NoHsCodes);
        }
        if self.start_year > self.end_year {
            return Err(RequestError::InvertedRange {
                start: self.start_year,
                end: self.end_year,
            });
        }
        for year in [self.start_year, self.end_year] {
            let fy = FiscalYear::new(year);
            if !fy.is_supported() {
                return Err(RequestError::UnsupportedYear(fy));
            }
        }
        Ok(TradeRequest {
            hs_codes,
            ..self.clone()
        })
    }
}

/// Reported after each HS code finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub hs_code: String,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total) as u8
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("run cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub chart: Vec<ChartPoint>,
    pub aggregation: Aggregation,
    pub archive: Archive,
    /// Per-code files this run wrote; the caller schedules their deletion.
    pub artifacts: Vec<PathBuf>,
    /// Codes that produced no table at all.
    pub failed_codes: Vec<String>,
}

/// One request end to end: scrape every code in turn, aggregate, package.
pub struct Pipeline<F, S> {
    factory: F,
    store: S,
    retries: u32,
    backoff: Duration,
    cancel: CancelFlag,
}

impl<F: SessionFactory, S: SeriesStore> Pipeline<F, S> {
    pub fn new(factory: F, store: S) -> Self {
        Self {
            factory,
            store,
            retries: 0,
            backoff: Duration::from_millis(500),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(level = "info", skip_all, fields(trade = %request.trade_type))]
    pub async fn run(
        &self,
        request: &TradeRequest,
        on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<PipelineOutput, PipelineError> {
        let request = request.validate()?;
        let total = request.hs_codes.len();
        info!(
            codes = total,
            "Scraping {} data from {} to {}",
            request.trade_type,
            FiscalYear::new(request.start_year),
            FiscalYear::new(request.end_year)
        );

        let mut persisted = Vec::with_capacity(total);
        let mut artifacts = Vec::with_capacity(total);
        let mut failed_codes = Vec::new();
        for (i, hs_code) in request.hs_codes.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            match self.scrape_code(hs_code, &request).await {
                Ok(handle) => {
                    artifacts.extend(handle.path);
                    persisted.push(handle.hs_code);
                }
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => {
                    error!(hs_code = %hs_code, error = %e, "HS code produced no table");
                    failed_codes.push(hs_code.clone());
                }
            }
            on_progress(Progress {
                completed: i + 1,
                total,
                hs_code: hs_code.clone(),
            });
        }

        // Only this run's tables; a failed code must not pull in an older one.
        let aggregation = aggregate(&self.store, &persisted, request.trade_type);

        let mut builder = ArchiveBuilder::new(request.trade_type);
        for path in &artifacts {
            builder.add_file(path)?;
        }
        if let Some(countries) = &aggregation.countries {
            let mut csv = Vec::new();
            countries.write_csv(&mut csv)?;
            builder.add_bytes(COMBINED_COUNTRYWISE_FILE, &csv)?;
        }
        let archive = builder.finish()?;
        info!(
            years = aggregation.totals.len(),
            files = artifacts.len(),
            "Scraping complete!"
        );

        Ok(PipelineOutput {
            chart: aggregation.totals.chart_series(),
            aggregation,
            archive,
            artifacts,
            failed_codes,
        })
    }

    async fn scrape_code(
        &self,
        hs_code: &str,
        request: &TradeRequest,
    ) -> Result<StoreHandle, PipelineError> {
        let session = self
            .factory
            .open(request.trade_type)
            .context("opening portal session")?;
        let scraper = YearRangeScraper::new(session)
            .with_retries(self.retries, self.backoff)
            .with_cancel(self.cancel.clone());

        let table = scraper
            .scrape(hs_code, request.start_year, request.end_year, request.trade_type)
            .await
            .map_err(|_| PipelineError::Cancelled)?;
        let handle = self
            .store
            .persist(&table, hs_code, request.trade_type)
            .with_context(|| format!("persisting series for {}", hs_code))?;
        Ok(handle)
    }
}
