use itertools::Itertools;
use log::trace;
use repeater_scraping_utils::regex;
use scraper::Html;

use super::{
    clean_html,
    columns::{is_usable, looks_like_header, map_columns, normalize_header, row_from_cells},
    ScrapedRow, TableStrategy,
};

/// Last resort for markup that does not parse into a usable tree: reads the
/// first table with plain regular expressions.
pub struct RegexScan;

impl TableStrategy for RegexScan {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn extract(&self, html: &str) -> anyhow::Result<Vec<ScrapedRow>> {
        let html = clean_html(html);
        let Some(table) = regex!(r"(?is)<table\b[^>]*>.*?</table>").find(&html) else {
            return Ok(vec![]);
        };
        let mut rows = regex!(r"(?is)<tr\b[^>]*>.*?</tr>").find_iter(table.as_str());
        let Some(header) = rows.next() else {
            return Ok(vec![]);
        };
        let headers = regex!(r"(?is)<t[hd]\b[^>]*>(.*?)</t[hd]>")
            .captures_iter(header.as_str())
            .map(|c| normalize_header(&strip_tags(&c[1])))
            .collect::<Vec<_>>();
        if !looks_like_header(&headers) {
            return Ok(vec![]);
        }
        let map = map_columns(&headers);
        if !is_usable(&map) {
            return Ok(vec![]);
        }
        Ok(rows
            .filter_map(|row| {
                let cells = regex!(r"(?is)<td\b[^>]*>(.*?)</td>")
                    .captures_iter(row.as_str())
                    .map(|c| strip_tags(&c[1]))
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
            .collect())
    }
}

/// Cell text with tags removed and character references decoded.
fn strip_tags(html: &str) -> String {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<String>()
        .split_whitespace()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{strip_tags, RegexScan};
    use crate::table::TableStrategy;

    #[test]
    fn reads_first_table() {
        let html = r#"<TABLE border=1>
            <tr><th><b>Indicativo</b></th><th>Freq.TX</th><th>Off-Set</th><th>Cidade</th></tr>
            <tr><td><a href="x">PY2SJC</a></td><td>147.090</td><td>147,690</td><td>S&atilde;o Carlos&nbsp;-&nbsp;SP</td></tr>
            <tr><td>PY2BAD</td><td>--</td><td>147.690</td><td>Itu</td></tr>
        </TABLE><table><tr><td>PY2OTHER</td></tr></table>"#;
        let rows = RegexScan.extract(html).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].callsign, "PY2SJC");
        assert_eq!(rows[0].tx, 147.09);
        assert_eq!(rows[0].rx, 147.69);
        assert_eq!(rows[0].city, "São Carlos");
    }

    #[test]
    fn tags_and_spaces() {
        assert_eq!(strip_tags(" <b>PY2 </b>&nbsp; X "), "PY2 X");
        assert_eq!(strip_tags("S&atilde;o Jos&eacute;&nbsp;-&nbsp;SP"), "São José - SP");
        assert!(RegexScan.extract("<p>nothing</p>").unwrap().is_empty());
    }
}
