use std::collections::BTreeMap;

use itertools::Itertools;
use repeater_scraping_utils::regex;
use strum::{Display, EnumString};

use super::{clean_city_name, ScrapedRow, UNKNOWN_CITY};
use crate::record::parse_float_prefix;

/// Canonical column meaning.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Callsign,
    MaintainerCallsign,
    Tx,
    Rx,
    Tone,
    City,
    LicenseDate,
    Maintainer,
    Index,
}

/// Header texts seen on repeater tables, lowercased.
pub const HEADER_SYNONYMS: &[(&str, Field)] = &[
    ("indicativo", Field::Callsign),
    ("indicativo mantenedor", Field::MaintainerCallsign),
    ("freq.tx", Field::Tx),
    ("freq tx", Field::Tx),
    ("freq", Field::Tx),
    ("off-set", Field::Rx),
    ("offset", Field::Rx),
    ("freq.rx", Field::Rx),
    ("tone mode", Field::Tone),
    ("tone", Field::Tone),
    ("tone / mode", Field::Tone),
    ("mode", Field::Tone),
    ("cidade de sp", Field::City),
    ("cidade", Field::City),
    ("licença anatel atualizada", Field::LicenseDate),
    ("licença", Field::LicenseDate),
    ("mantenedor operacional", Field::Maintainer),
    ("mantenedor", Field::Maintainer),
    ("#", Field::Index),
];

pub type ColumnMap = BTreeMap<Field, usize>;

/// Lowercases and collapses whitespace, as header texts are compared.
pub fn normalize_header(text: &str) -> String {
    text.split_whitespace().join(" ").to_lowercase()
}

/// The field whose longest synonym appears in `header`.
pub fn field_for_header(header: &str) -> Option<Field> {
    HEADER_SYNONYMS
        .iter()
        .filter(|(pattern, _)| header.contains(pattern))
        .max_by_key(|(pattern, _)| pattern.len())
        .map(|&(_, field)| field)
}

/// A row is a header row when at least 3 of its cells name a known column.
pub fn looks_like_header(headers: &[String]) -> bool {
    headers
        .iter()
        .filter(|header| field_for_header(header).is_some())
        .count()
        >= 3
}

/// Maps each field to the first column whose header names it.
pub fn map_columns(headers: &[String]) -> ColumnMap {
    let mut map = ColumnMap::new();
    for (index, header) in headers.iter().enumerate() {
        if let Some(field) = field_for_header(header) {
            map.entry(field).or_insert(index);
        }
    }
    map
}

/// Whether a table with this header can yield repeaters at all.
pub fn is_usable(map: &ColumnMap) -> bool {
    map.contains_key(&Field::Callsign)
        && (map.contains_key(&Field::Tx) || map.contains_key(&Field::Rx))
}

pub fn is_callsign(text: &str) -> bool {
    regex!(r"PY[A-Z0-9]{2,}").is_match(text)
}

/// Reads one data row through the column map.  Rows without a valid call sign
/// or without both frequencies are dropped.
pub fn row_from_cells(cells: &[String], map: &ColumnMap) -> Option<ScrapedRow> {
    let cell = |field| {
        map.get(&field)
            .and_then(|&i| cells.get(i))
            .map_or("", |s| s.trim())
    };
    let callsign = cell(Field::Callsign);
    if !is_callsign(callsign) {
        return None;
    }
    let tx = parse_float_prefix(cell(Field::Tx))?;
    let rx = parse_float_prefix(cell(Field::Rx))?;
    let city = match cell(Field::City) {
        "" => UNKNOWN_CITY,
        city => city,
    };
    Some(ScrapedRow {
        callsign: callsign.to_owned(),
        tx,
        rx,
        tone: cell(Field::Tone).to_owned(),
        city: clean_city_name(city),
    })
}

#[cfg(test)]
mod tests {
    use super::{
        field_for_header, is_usable, looks_like_header, map_columns, normalize_header,
        row_from_cells, Field,
    };

    fn strings(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|x| normalize_header(x)).collect()
    }

    #[test]
    fn longest_synonym_wins() {
        assert_eq!(field_for_header("indicativo mantenedor"), Some(Field::MaintainerCallsign));
        assert_eq!(field_for_header("freq.rx"), Some(Field::Rx));
        assert_eq!(field_for_header("freq.tx"), Some(Field::Tx));
        assert_eq!(field_for_header("tone / mode"), Some(Field::Tone));
        assert_eq!(field_for_header("cidade de sp"), Some(Field::City));
        assert_eq!(field_for_header("altitude"), None);
    }

    #[test]
    fn maps_columns_in_any_order() {
        let headers = strings(&["Cidade", "Off-Set", "Indicativo", "Freq.TX"]);
        assert!(looks_like_header(&headers));
        let map = map_columns(&headers);
        assert_eq!(map[&Field::City], 0);
        assert_eq!(map[&Field::Rx], 1);
        assert_eq!(map[&Field::Callsign], 2);
        assert_eq!(map[&Field::Tx], 3);
        assert!(is_usable(&map));

        let row = row_from_cells(
            &["Santos - SP", "146,770", "PY2AAA", "146.170"].map(String::from),
            &map,
        )
        .unwrap();
        assert_eq!(row.callsign, "PY2AAA");
        assert_eq!(row.tx, 146.17);
        assert_eq!(row.rx, 146.77);
        assert_eq!(row.city, "Santos");
    }

    #[test]
    fn rejects_rows_and_tables() {
        let headers = strings(&["Indicativo", "Freq.TX", "Off-Set", "Cidade"]);
        let map = map_columns(&headers);
        let cells = |xs: [&str; 4]| xs.map(String::from);
        assert!(row_from_cells(&cells(["XX1AAA", "146.170", "146.770", "A"]), &map).is_none());
        assert!(row_from_cells(&cells(["PY2AAA", "146.170", "-", "A"]), &map).is_none());
        let row = row_from_cells(&cells(["PY2AAA", "146.170", "146.770", ""]), &map).unwrap();
        assert_eq!(row.city, "Desconhecida");

        let headers = strings(&["Cidade", "Tone", "Mantenedor"]);
        assert!(looks_like_header(&headers));
        assert!(!is_usable(&map_columns(&headers)));
    }
}
