use std::collections::HashMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());

// Guards against absurd span attributes in hostile markup.
const MAX_SPAN: usize = 1_000;

/// A parsed HTML table laid out on a rectangular grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Text of the first grid row. Repeated names get `.1`, `.2`, … suffixes
    /// in order of appearance, so every header is unique.
    pub headers: Vec<String>,
    /// Remaining grid rows, each exactly `headers.len()` cells wide.
    pub rows: Vec<Vec<String>>,
}

/// Parse the first `<table>` in `html`.
///
/// Cells spanning several rows or columns are copied into every grid slot
/// they cover, so a header cell with `rowspan="2"` reappears in the first
/// data row. Returns `None` when there is no table or it has no rows.
pub fn parse_table(html: &str) -> Option<RawTable> {
    let doc = Html::parse_fragment(html);
    let table = doc.select(&TABLE).next()?;
    let mut grid = build_grid(table);
    if grid.is_empty() {
        return None;
    }

    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut grid {
        row.resize(width, String::new());
    }
    let mut rows = grid.into_iter();
    let headers = dedupe_headers(rows.next()?);
    Some(RawTable {
        headers,
        rows: rows.collect(),
    })
}

fn build_grid(table: ElementRef<'_>) -> Vec<Vec<String>> {
    let mut grid = Vec::new();
    // Per column: rows still covered by a rowspan above, and the spanned text.
    let mut carry: Vec<Option<(usize, String)>> = Vec::new();

    for tr in table.select(&ROW) {
        let mut cells = tr
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|e| matches!(e.value().name(), "td" | "th"));
        let mut row = Vec::new();
        let mut col = 0;

        loop {
            if let Some(text) = take_carried(&mut carry, col) {
                row.push(text);
                col += 1;
                continue;
            }
            let Some(cell) = cells.next() else { break };
            let text = cell_text(cell);
            let colspan = span(cell, "colspan");
            let rowspan = span(cell, "rowspan");
            for _ in 0..colspan {
                if carry.len() <= col {
                    carry.resize(col + 1, None);
                }
                carry[col] = (rowspan > 1).then(|| (rowspan - 1, text.clone()));
                row.push(text.clone());
                col += 1;
            }
        }

        // Rowspans from above that extend past this row's last cell.
        while col < carry.len() {
            row.push(take_carried(&mut carry, col).unwrap_or_default());
            col += 1;
        }

        if !row.is_empty() {
            grid.push(row);
        }
    }
    grid
}

fn take_carried(carry: &mut [Option<(usize, String)>], col: usize) -> Option<String> {
    let slot = carry.get_mut(col)?;
    let (remaining, text) = slot.as_mut()?;
    let out = text.clone();
    *remaining -= 1;
    if *remaining == 0 {
        *slot = None;
    }
    Some(out)
}

fn span(cell: ElementRef<'_>, attr: &str) -> usize {
    cell.value()
        .attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_SPAN)
}

/// Visible text of a cell with whitespace runs collapsed.
pub fn cell_text(cell: ElementRef<'_>) -> String {
    let raw: String = cell.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .map(|h| {
            let n = seen.entry(h.clone()).or_insert(0);
            let name = if *n == 0 { h } else { format!("{}.{}", h, n) };
            *n += 1;
            name
        })
        .collect()
}
