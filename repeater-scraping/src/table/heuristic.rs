use repeater_scraping_utils::{regex, selector};
use scraper::Html;

use super::{clean_city_name, clean_html, ScrapedRow, TableStrategy, UNKNOWN_CITY};
use crate::record::parse_float_prefix;

/// Guesses the meaning of each cell of wide rows from its shape.
pub struct HeuristicScan;

impl TableStrategy for HeuristicScan {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn extract(&self, html: &str) -> anyhow::Result<Vec<ScrapedRow>> {
        let document = Html::parse_document(&clean_html(html));
        for table in document.select(selector!("table")) {
            let rows = table
                .select(selector!("tr"))
                .filter_map(|row| {
                    let cells = row
                        .select(selector!("td"))
                        .map(|cell| cell.text().collect::<String>().trim().to_owned())
                        .collect::<Vec<_>>();
                    (cells.len() >= 6).then(|| scan_cells(&cells)).flatten()
                })
                .collect::<Vec<_>>();
            if !rows.is_empty() {
                return Ok(rows);
            }
        }
        Ok(vec![])
    }
}

fn is_frequency_like(text: &str) -> bool {
    regex!(r"\d{3}\.\d{3}").is_match(text)
}

fn looks_like_city(text: &str) -> bool {
    let len = text.chars().count();
    len > 2
        && len < 50
        && !regex!(r"PY[A-Z0-9]").is_match(text)
        && !is_frequency_like(text)
        && !regex!(r"^\d+$").is_match(text)
        && (text.contains("SP") || regex!(r"[A-Z][a-z]+").is_match(text))
}

fn scan_cells(cells: &[String]) -> Option<ScrapedRow> {
    let mut callsign = None;
    let mut tx = None;
    let mut rx = None;
    let mut tone = None;
    let mut city = None;

    for (index, text) in cells.iter().enumerate() {
        let first_callsign = callsign
            .is_none()
            .then(|| regex!(r"PY[A-Z0-9]{2,}(?:/\d)?").find(text))
            .flatten();
        if let Some(m) = first_callsign {
            callsign = Some(m.as_str().to_owned());
            if index == 1 && cells.len() > 4 {
                tx = parse_float_prefix(&cells[2]);
                rx = parse_float_prefix(&cells[3]);
                tone = Some(cells[4].clone()).filter(|t| !t.is_empty());
                city = cells.get(5).map(|c| clean_city_name(c));
            }
        }
        if let Some(m) = regex!(r"\d{3}\.\d{3}").find(text) {
            let freq = parse_float_prefix(m.as_str());
            if tx.is_none() {
                tx = freq;
            } else if rx.is_none() {
                rx = freq;
            }
        }
        if tone.is_none()
            && (text == "OPEN"
                || text == "D-STAR"
                || (regex!(r"^\d+\.\d+$").is_match(text) && !is_frequency_like(text)))
        {
            tone = Some(text.clone());
        }
        if looks_like_city(text) {
            city = Some(clean_city_name(text));
        }
    }

    let (callsign, tx, rx) = (callsign?, tx.filter(|&f| f != 0.0)?, rx.filter(|&f| f != 0.0)?);
    Some(ScrapedRow {
        callsign,
        tx,
        rx,
        tone: tone.unwrap_or_default(),
        city: city
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNKNOWN_CITY.to_owned()),
    })
}
