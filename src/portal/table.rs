// src/portal/table.rs

use scraper::Html;
use tracing::trace;

use super::{element_text, selector, RawRow, MIN_RESULT_COLUMNS, RESULT_TABLE};
use crate::error::Result;

/// Extract data rows from a result page.
///
/// Returns `Ok(None)` when the page carries no result table at all. The header
/// row is skipped; rows with fewer than four cells or with merged (`colspan`)
/// cells are dropped.
pub fn parse_result_table(html: &str) -> Result<Option<Vec<RawRow>>> {
    let doc = Html::parse_document(html);
    let Some(table) = doc.select(&selector(RESULT_TABLE)?).next() else {
        return Ok(None);
    };

    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;

    let mut rows = Vec::new();
    for (i, tr) in table.select(&row_sel).skip(1).enumerate() {
        let cells: Vec<_> = tr.select(&cell_sel).collect();
        if cells.len() < MIN_RESULT_COLUMNS {
            trace!(row = i + 1, cells = cells.len(), "dropping short row");
            continue;
        }
        if cells.iter().any(|c| c.value().attr("colspan").is_some()) {
            trace!(row = i + 1, "dropping merged row");
            continue;
        }
        rows.push(RawRow {
            cells: cells.iter().map(element_text).collect(),
        });
    }
    Ok(Some(rows))
}
