// src/series/mod.rs

pub mod store;
pub mod table;

pub use store::{series_file_name, CsvDirStore, MemoryStore, SeriesStore, StoreHandle};
pub use table::{is_total_label, SeriesTable, TradeRecord, TOTAL_ROW};
