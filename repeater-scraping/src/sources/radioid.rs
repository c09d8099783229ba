//! The DMR repeater list of radioid.net.

use std::collections::BTreeMap;

use anyhow::Context;
use log::trace;
use repeater_scraping_utils::regex;
use serde_json::{Map, Value};
use typed_builder::TypedBuilder;

use super::{RepeaterSource, RunContext, RunResult};
use crate::{
    fetch::HttpGet,
    normalize::{capitalize, fold_key, CityResolver, Uf},
    record::{parse_float_prefix, round_to, Location, RepeaterRecord},
};

pub const RADIOID_URL: &str = "https://radioid.net/static/rptrs.json";

/// Reads a local copy first, then the published list.
#[derive(Clone, Debug, TypedBuilder)]
pub struct RadioId {
    #[builder(default = "rptrs.json".to_owned(), setter(into))]
    pub local_path: String,
    #[builder(default = RADIOID_URL.to_owned(), setter(into))]
    pub url: String,
}

impl Default for RadioId {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RepeaterSource for RadioId {
    const NAME: &'static str = "radioid.net";
    const SUFFIX: &'static str = "radioidnet";
    const STORAGE_KEY: &'static str = "radioid.net";
    const AGGREGATE_CSV: &'static str = "radioid-net.csv";

    async fn run<H: HttpGet>(&self, ctx: &mut RunContext<'_, H>) -> anyhow::Result<RunResult> {
        let json = ctx
            .fetcher
            .load_first(
                &mut *ctx.store,
                &[self.local_path.as_str(), self.url.as_str()],
                Self::STORAGE_KEY,
            )
            .await?;
        let raw = json
            .get("rptrs")
            .and_then(Value::as_array)
            .context("Invalid JSON: expected an object with '.rptrs'")?;

        let mut states = BTreeMap::<Uf, Vec<RepeaterRecord>>::new();
        for entry in raw {
            let Some(object) = entry.as_object() else {
                trace!("Skipping non-object entry {entry}");
                continue;
            };
            if let Some((uf, record)) = process_record(object.clone(), ctx.cities) {
                states.entry(uf).or_default().push(record);
            }
        }

        let mut result = RunResult::new(raw.len());
        for (uf, mut records) in states {
            records.sort_by_cached_key(|r| fold_key(&r.location.city));
            let path = ctx.layout.state_file("", Some(uf), Self::SUFFIX);
            let path = ctx.buffer.stage_records(path, Some(uf), &records)?;
            result.add_state(uf, records, path);
        }
        Ok(result)
    }
}

const DROPPED_FIELDS: &[&str] = &[
    "state", "country", "status", "city", "map_info", "map", "locator", "trustee",
];

/// `"TS1 TS2"` becomes `[1, 2]`.
fn parse_timeslots(value: &Value) -> Vec<u32> {
    let Some(text) = value.as_str() else {
        return vec![];
    };
    regex!(r"(?i)TS")
        .replace_all(text, "")
        .split_whitespace()
        .filter_map(|n| n.parse().ok())
        .filter(|&n| n > 0)
        .collect()
}

fn number_or_zero(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_float_prefix(s),
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).unwrap_or(0.0)
}

/// Turns one raw entry into a record of the common schema, or `None` when it
/// is not an active Brazilian repeater with a known state and city.
pub fn process_record(
    mut raw: Map<String, Value>,
    cities: &dyn CityResolver,
) -> Option<(Uf, RepeaterRecord)> {
    let text = |raw: &Map<String, Value>, key: &str| {
        raw.get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_owned()
    };
    if !regex!(r"(?i)bra(s|z)il").is_match(&text(&raw, "country"))
        || text(&raw, "status").to_lowercase() != "active"
    {
        return None;
    }
    let Some(uf) = Uf::from_name(&text(&raw, "state")) else {
        trace!("Unknown state in {raw:?}");
        return None;
    };
    let Some(city) = cities.resolve(&text(&raw, "city"), uf) else {
        trace!("Unknown city in {raw:?}");
        return None;
    };
    for field in DROPPED_FIELDS {
        raw.remove(*field);
    }

    let mut number = |key: &str| {
        raw.remove(key)
            .filter(|v| !v.is_null())
            .map(|v| number_or_zero(&v))
    };
    let rx = number("frequency").unwrap_or(0.0);
    let offset = number("offset").unwrap_or(0.0);
    let color = number("color_code");
    let dmr_id = number("id");

    let mut info = BTreeMap::new();
    if let Some(id) = dmr_id {
        info.insert("dmr_id".to_owned(), id.into());
    }
    for (from, to) in [
        ("ipsc_network", "ipsc"),
        ("assigned", "assigned"),
        ("callsign", "callsign"),
    ] {
        if let Some(value) = raw.remove(from) {
            info.insert(to.to_owned(), value);
        }
    }

    let tone = raw
        .remove("tone")
        .and_then(|v| serde_json::from_value(v).ok());
    for key in ["rx", "tx", "location", "info"] {
        raw.remove(key);
    }

    let mut extra = Map::new();
    if let Some(color) = color {
        extra.insert("color".to_owned(), color.into());
    }
    if let Some(ts) = raw.remove("ts_linked") {
        extra.insert("timeslot".to_owned(), parse_timeslots(&ts).into());
    }
    for (key, value) in raw {
        let value = match value {
            Value::String(s) => Value::String(capitalize(&s)),
            value => value,
        };
        extra.insert(key, value);
    }

    Some((
        uf,
        RepeaterRecord {
            rx,
            tx: round_to(rx + offset, 5),
            offset,
            tone,
            location: Location::new(uf, city),
            info,
            extra,
        },
    ))
}
