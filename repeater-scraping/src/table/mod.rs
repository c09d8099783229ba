//! Pulls repeater rows out of loosely structured HTML tables.

use itertools::Itertools;
use log::{debug, info, warn};
use repeater_scraping_utils::regex;

use crate::{
    normalize::{CityResolver, Uf},
    record::{round_to, Location, RepeaterRecord, Tone},
};

pub mod columns;
mod header_mapped;
mod heuristic;
mod regex_scan;

pub use header_mapped::HeaderMapped;
pub use heuristic::HeuristicScan;
pub use regex_scan::RegexScan;

pub const UNKNOWN_CITY: &str = "Desconhecida";

/// One table row, before normalization.
#[derive(Clone, PartialEq, Debug)]
pub struct ScrapedRow {
    pub callsign: String,
    pub tx: f64,
    pub rx: f64,
    pub tone: String,
    pub city: String,
}

impl ScrapedRow {
    pub fn into_record(self, uf: Uf, cities: &dyn CityResolver) -> RepeaterRecord {
        let rx = round_to(self.rx, 3);
        let tx = round_to(self.tx, 3);
        let city = cities
            .resolve(&self.city, uf)
            .unwrap_or_else(|| UNKNOWN_CITY.to_owned());
        RepeaterRecord {
            rx,
            tx,
            offset: round_to(self.rx - self.tx, 3),
            tone: Some(Tone::from_scraped(&self.tone)),
            location: Location::new(uf, city),
            info: [("callsign".to_owned(), self.callsign.into())]
                .into_iter()
                .collect(),
            extra: Default::default(),
        }
    }
}

pub trait TableStrategy {
    fn name(&self) -> &'static str;
    fn extract(&self, html: &str) -> anyhow::Result<Vec<ScrapedRow>>;
}

pub fn default_strategies() -> Vec<Box<dyn TableStrategy>> {
    vec![
        Box::new(HeaderMapped),
        Box::new(HeuristicScan),
        Box::new(RegexScan),
    ]
}

/// Runs `strategies` in order and returns the first non-empty result.
pub fn extract_rows(html: &str, strategies: &[Box<dyn TableStrategy>]) -> Vec<ScrapedRow> {
    for strategy in strategies {
        match strategy.extract(html) {
            Ok(rows) if !rows.is_empty() => {
                info!("{}: extracted {} rows", strategy.name(), rows.len());
                return rows;
            }
            Ok(_) => debug!("{}: no rows", strategy.name()),
            Err(e) => warn!("{} failed: {e:#}", strategy.name()),
        }
    }
    warn!("No strategy found any repeater rows");
    vec![]
}

pub fn extract_records(html: &str, uf: Uf, cities: &dyn CityResolver) -> Vec<RepeaterRecord> {
    extract_rows(html, &default_strategies())
        .into_iter()
        .map(|row| row.into_record(uf, cities))
        .collect()
}

/// Drops scripts, styles, comments and presentational attributes, and collapses whitespace.
pub fn clean_html(html: &str) -> String {
    let mut html = html.to_owned();
    for pattern in [
        regex!(r"(?is)<script\b.*?</script\s*>"),
        regex!(r"(?is)<style\b.*?</style\s*>"),
        regex!(r"(?i)<link\b[^>]*>"),
        regex!(r"(?i)<meta\b[^>]*>"),
        regex!(r#"(?i)\s+on\w+\s*=\s*"[^"]*""#),
        regex!(r#"(?i)\s+style\s*=\s*"[^"]*""#),
        regex!(r#"(?i)\s+class\s*=\s*"[^"]*""#),
        regex!(r#"(?i)\s+id\s*=\s*"[^"]*""#),
        regex!(r"(?s)<!--.*?-->"),
    ] {
        html = pattern.replace_all(&html, "").into_owned();
    }
    html.split_whitespace().join(" ")
}

/// `"Santos - SP"` becomes `"Santos"`.
pub fn clean_city_name(city: &str) -> String {
    let city = regex!(r"(?i)\s*-\s*SP\s*$").replace(city, "");
    let city = regex!(r"(?i)\s+SP\s*$").replace(&city, "");
    let city = regex!(r"^&\w+;").replace(&city, "");
    let city = regex!(r"[^A-Za-z0-9_\sÀ-ÿ-]").replace_all(&city, "");
    city.trim().to_owned()
}
