// src/series/store.rs

use anyhow::{anyhow, bail, Context, Result};
use std::{
    collections::HashMap,
    fs,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::RwLock,
};
use tracing::debug;

use super::SeriesTable;
use crate::fiscal::TradeType;

/// `{hs_code}_{trade_type_lowercased}.csv`
pub fn series_file_name(hs_code: &str, trade_type: TradeType) -> String {
    format!("{}_{}.csv", hs_code, trade_type.file_suffix())
}

/// What a persist produced; `path` is set when the store wrote a file the
/// caller now owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHandle {
    pub hs_code: String,
    pub trade_type: TradeType,
    pub path: Option<PathBuf>,
}

/// Hand-off point between scraping and aggregation, keyed by (HS code, trade type).
pub trait SeriesStore {
    /// Store `table`, replacing any earlier table under the same key.
    fn persist(&self, table: &SeriesTable, hs_code: &str, trade_type: TradeType)
        -> Result<StoreHandle>;

    /// `Ok(None)` when nothing was ever persisted for the key.
    fn load(&self, hs_code: &str, trade_type: TradeType) -> Result<Option<SeriesTable>>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<(String, TradeType), SeriesTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeriesStore for MemoryStore {
    fn persist(
        &self,
        table: &SeriesTable,
        hs_code: &str,
        trade_type: TradeType,
    ) -> Result<StoreHandle> {
        self.tables
            .write()
            .map_err(|_| anyhow!("series store lock poisoned"))?
            .insert((hs_code.to_string(), trade_type), table.clone());
        Ok(StoreHandle {
            hs_code: hs_code.to_string(),
            trade_type,
            path: None,
        })
    }

    fn load(&self, hs_code: &str, trade_type: TradeType) -> Result<Option<SeriesTable>> {
        Ok(self
            .tables
            .read()
            .map_err(|_| anyhow!("series store lock poisoned"))?
            .get(&(hs_code.to_string(), trade_type))
            .cloned())
    }
}

/// One CSV per key in a directory.
#[derive(Debug, Clone)]
pub struct CsvDirStore {
    dir: PathBuf,
}

impl CsvDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, hs_code: &str, trade_type: TradeType) -> Result<PathBuf> {
        if hs_code.is_empty() || !hs_code.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("HS code {:?} is not usable as a file key", hs_code);
        }
        Ok(self.dir.join(series_file_name(hs_code, trade_type)))
    }
}

impl SeriesStore for CsvDirStore {
    fn persist(
        &self,
        table: &SeriesTable,
        hs_code: &str,
        trade_type: TradeType,
    ) -> Result<StoreHandle> {
        let path = self.path_for(hs_code, trade_type)?;
        let tmp_path = self
            .dir
            .join(format!(".{}.tmp", series_file_name(hs_code, trade_type)));

        let file = fs::File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        table
            .write_csv(BufWriter::new(file))
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;

        debug!(path = %path.display(), rows = table.len(), "persisted series");
        Ok(StoreHandle {
            hs_code: hs_code.to_string(),
            trade_type,
            path: Some(path),
        })
    }

    fn load(&self, hs_code: &str, trade_type: TradeType) -> Result<Option<SeriesTable>> {
        let path = self.path_for(hs_code, trade_type)?;
        if !path.is_file() {
            return Ok(None);
        }
        let file = fs::File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        SeriesTable::read_csv(file)
            .with_context(|| format!("reading {}", path.display()))
            .map(Some)
    }
}
