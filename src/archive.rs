// src/archive.rs

use anyhow::{anyhow, Context, Result};
use std::{
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
};
use tracing::info;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::fiscal::TradeType;

/// In-memory zip handed to whoever offers the download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub fn archive_file_name(trade_type: TradeType) -> String {
    format!("trade_data_{}.zip", trade_type.as_str())
}

/// Accumulates zip entries in memory.
pub struct ArchiveBuilder {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    trade_type: TradeType,
}

impl ArchiveBuilder {
    pub fn new(trade_type: TradeType) -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            trade_type,
        }
    }

    /// Add the current byte content of `path` under its base name.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("artifact {} has no file name", path.display()))?;
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        self.add_bytes(name, &bytes)
    }

    pub fn add_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let base = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("bad archive entry name {:?}", name))?;
        self.zip
            .start_file(base, self.options)
            .with_context(|| format!("adding {} to archive", base))?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    pub fn finish(self) -> Result<Archive> {
        let cursor = self.zip.finish().context("finishing archive")?;
        Ok(Archive {
            file_name: archive_file_name(self.trade_type),
            bytes: cursor.into_inner(),
        })
    }
}

impl Archive {
    /// Pack the byte content of each artifact under its base name. The
    /// artifacts may be deleted as soon as this returns.
    pub fn build<P: AsRef<Path>>(trade_type: TradeType, artifacts: &[P]) -> Result<Self> {
        let mut builder = ArchiveBuilder::new(trade_type);
        for path in artifacts {
            builder.add_file(path)?;
        }
        builder.finish()
    }

    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), bytes = self.bytes.len(), "wrote archive");
        Ok(path)
    }
}
