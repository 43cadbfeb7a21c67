// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Runtime knobs. Portal URLs and form control ids are fixed and live in
/// [`crate::portal`], not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where per-code CSVs and the archive are written.
    pub output_dir: PathBuf,
    /// Reference list of HS codes (`HSN_CD` column).
    pub hs_codes_path: PathBuf,
    /// Bound on waiting for the result table after submitting.
    pub result_timeout_secs: u64,
    /// Pause after each fresh page load before touching the form.
    pub page_settle_millis: u64,
    /// Extra attempts per (HS code, year) after a navigation or timeout failure.
    pub result_retries: u32,
    pub retry_backoff_millis: u64,
    /// Grace period before scheduled artifacts are deleted.
    pub cleanup_delay_secs: u64,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            hs_codes_path: PathBuf::from("hscodes.csv"),
            result_timeout_secs: 10,
            page_settle_millis: 0,
            result_retries: 0,
            retry_backoff_millis: 500,
            cleanup_delay_secs: 10,
            user_agent: concat!("tradestat/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Load from a YAML file; absent keys fall back to defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_millis)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_millis)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "result_timeout_secs: 25\noutput_dir: /tmp/trade").unwrap();

        let cfg = Config::from_yaml_file(f.path()).unwrap();
        assert_eq!(cfg.result_timeout(), Duration::from_secs(25));
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/trade"));
        assert_eq!(cfg.cleanup_delay(), Duration::from_secs(10));
        assert_eq!(cfg.hs_codes_path, PathBuf::from("hscodes.csv"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::from_yaml_file("/definitely/not/here.yaml").is_err());
    }
}
