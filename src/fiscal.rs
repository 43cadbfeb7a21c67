// src/fiscal.rs

use serde::{Deserialize, Serialize};
use std::{fmt, ops::RangeInclusive, str::FromStr};

/// Indian fiscal year (April–March), identified by the calendar year it starts in.
///
/// Ordering follows the calendar year, so `1999-00` sorts before `2000-01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FiscalYear(i32);

impl FiscalYear {
    /// Years offered by the portal's year selector.
    pub const SUPPORTED: RangeInclusive<i32> = 1997..=2024;

    pub const DEFAULT_START: i32 = 2015;
    pub const DEFAULT_END: i32 = 2024;

    pub fn new(start_year: i32) -> Self {
        FiscalYear(start_year)
    }

    pub fn start_year(self) -> i32 {
        self.0
    }

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self.0)
    }

    pub fn supported() -> impl Iterator<Item = FiscalYear> {
        Self::SUPPORTED.map(FiscalYear)
    }
}

impl fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.0, (self.0 + 1).rem_euclid(100))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a fiscal year label: {0:?}")]
pub struct FiscalYearParseError(pub String);

impl FromStr for FiscalYear {
    type Err = FiscalYearParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || FiscalYearParseError(s.to_string());
        let (start, suffix) = s.trim().split_once('-').ok_or_else(err)?;
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if start.len() != 4 || suffix.len() != 2 || !digits(start) || !digits(suffix) {
            return Err(err());
        }
        let start: i32 = start.parse().map_err(|_| err())?;
        let suffix: i32 = suffix.parse().map_err(|_| err())?;
        if (start + 1).rem_euclid(100) != suffix {
            return Err(err());
        }
        Ok(FiscalYear(start))
    }
}

/// `2015` → `"2015-16"`.
pub fn to_fiscal_year(year: i32) -> String {
    FiscalYear::new(year).to_string()
}

/// `"2015-16"` → `2015`.
pub fn from_fiscal_year(label: &str) -> Result<i32, FiscalYearParseError> {
    label.parse::<FiscalYear>().map(FiscalYear::start_year)
}

/// Selects which portal endpoint/dataset is queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TradeType {
    Import,
    Export,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Import => "Import",
            TradeType::Export => "Export",
        }
    }

    /// Lowercased form used in artifact file names.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            TradeType::Import => "import",
            TradeType::Export => "export",
        }
    }

    pub fn portal_url(&self) -> &'static str {
        match self {
            TradeType::Import => crate::portal::IMPORT_URL,
            TradeType::Export => crate::portal::EXPORT_URL,
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "import" | "imports" => Ok(TradeType::Import),
            "export" | "exports" => Ok(TradeType::Export),
            other => Err(format!("unknown trade type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_over_supported_range() {
        for y in FiscalYear::SUPPORTED {
            assert_eq!(from_fiscal_year(&to_fiscal_year(y)).unwrap(), y);
        }
    }

    #[test]
    fn century_boundaries() {
        assert_eq!(to_fiscal_year(1999), "1999-00");
        assert_eq!(to_fiscal_year(2009), "2009-10");
        assert_eq!(from_fiscal_year("1999-00").unwrap(), 1999);
    }

    #[test]
    fn rejects_inconsistent_labels() {
        assert!(from_fiscal_year("2015-17").is_err());
        assert!(from_fiscal_year("2015").is_err());
        assert!(from_fiscal_year("15-16").is_err());
        assert!(from_fiscal_year("Total").is_err());
    }

    #[test]
    fn signs_are_not_digits() {
        assert!(from_fiscal_year("+099-00").is_err());
        assert!(from_fiscal_year("2015-+6").is_err());
        assert!(" 2015-16 ".parse::<FiscalYear>().is_ok());
    }

    #[test]
    fn ordering_is_by_calendar_year() {
        let mut years: Vec<FiscalYear> = ["2001-02", "1999-00", "2000-01"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        years.sort();
        let labels: Vec<String> = years.iter().map(|y| y.to_string()).collect();
        assert_eq!(labels, vec!["1999-00", "2000-01", "2001-02"]);
    }

    #[test]
    fn trade_type_parsing_and_names() {
        assert_eq!("EXPORT".parse::<TradeType>().unwrap(), TradeType::Export);
        assert_eq!("imports".parse::<TradeType>().unwrap(), TradeType::Import);
        assert!("both".parse::<TradeType>().is_err());
        assert_eq!(TradeType::Export.file_suffix(), "export");
        assert!(TradeType::Import.portal_url().ends_with("icomcntq.asp"));
    }
}
