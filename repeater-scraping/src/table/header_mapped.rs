use log::{debug, trace};
use repeater_scraping_utils::selector;
use scraper::{ElementRef, Html};

use super::{
    clean_html,
    columns::{is_usable, looks_like_header, map_columns, normalize_header, row_from_cells},
    ScrapedRow, TableStrategy,
};

/// Finds the header row of each table and reads the rows below it by column.
pub struct HeaderMapped;

impl TableStrategy for HeaderMapped {
    fn name(&self) -> &'static str {
        "header-mapped"
    }

    fn extract(&self, html: &str) -> anyhow::Result<Vec<ScrapedRow>> {
        let document = Html::parse_document(&clean_html(html));
        for (i, table) in document.select(selector!("table")).enumerate() {
            let rows = parse_table(table);
            if !rows.is_empty() {
                debug!("Table #{i} has {} rows", rows.len());
                return Ok(rows);
            }
        }
        Ok(vec![])
    }
}

fn cell_text(cell: ElementRef) -> String {
    cell.text().collect::<String>()
}

fn parse_table(table: ElementRef) -> Vec<ScrapedRow> {
    let rows = table.select(selector!("tr")).collect::<Vec<_>>();
    let Some((header_index, map)) = rows.iter().enumerate().find_map(|(i, row)| {
        let headers = row
            .select(selector!("th, td"))
            .map(|cell| normalize_header(&cell_text(cell)))
            .collect::<Vec<_>>();
        looks_like_header(&headers).then(|| (i, map_columns(&headers)))
    }) else {
        return vec![];
    };
    if !is_usable(&map) {
        trace!("Header without call sign or frequency columns: {map:?}");
        return vec![];
    }
    rows[header_index + 1..]
        .iter()
        .filter_map(|row| {
            let cells = row
                .select(selector!("td"))
                .map(cell_text)
                .collect::<Vec<_>>();
            if cells.len() < map.len() {
                return None;
            }
            let parsed = row_from_cells(&cells, &map);
            if parsed.is_none() {
                trace!("Skipping row {cells:?}");
            }
            parsed
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::HeaderMapped;
    use crate::table::TableStrategy;

    #[test]
    fn column_order_does_not_matter() {
        let html = r#"<table>
            <tr><td>Off-Set</td><td>Cidade</td><td>Freq.TX</td><td>Indicativo</td></tr>
            <tr><td>439.100</td><td>Itu</td><td>434.100</td><td>PY2ITU</td></tr>
            <tr><td>short</td></tr>
        </table>"#;
        let rows = HeaderMapped.extract(html).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].callsign, "PY2ITU");
        assert_eq!(rows[0].rx, 439.1);
        assert_eq!(rows[0].tx, 434.1);
        assert_eq!(rows[0].city, "Itu");
    }

    #[test]
    fn skips_tables_without_frequencies() {
        let html = r#"<table>
            <tr><th>Indicativo</th><th>Cidade</th><th>Mantenedor</th></tr>
            <tr><td>PY2ITU</td><td>Itu</td><td>Fulano</td></tr>
        </table>"#;
        assert!(HeaderMapped.extract(html).unwrap().is_empty());
    }
}
