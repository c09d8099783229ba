use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use derive_more::From;
use itertools::Itertools;
use log::{debug, info};
use repeater_scraping_utils::fs_json_util::write_text;
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::{normalize::Uf, paths::normalize_destination, record::RepeaterRecord};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Format {
    Json,
    Csv,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
        }
    }

    pub fn from_name(name: &str) -> anyhow::Result<Self> {
        let name = name.trim();
        name.parse()
            .map_err(|_| anyhow::anyhow!("Format {name:?} is not supported"))
    }
}

/// Anything that can be saved.
#[derive(Clone, Debug, From)]
pub enum Payload {
    /// Written as is for JSON; converted for CSV when it holds JSON.
    Text(String),
    Records(Vec<RepeaterRecord>),
    ByState(BTreeMap<String, Vec<RepeaterRecord>>),
    Value(Value),
}

impl Payload {
    fn into_value(self) -> anyhow::Result<Value> {
        Ok(match self {
            Payload::Text(text) => Value::String(text),
            Payload::Records(records) => serde_json::to_value(records)?,
            Payload::ByState(by_state) => serde_json::to_value(by_state)?,
            Payload::Value(value) => value,
        })
    }
}

/// Numbers the records of each city: the location becomes `[uf, city, n]`,
/// with `n` counting down to 1 over the records of that city.
pub fn number_by_city(value: &mut Value) {
    fn key(record: &Value) -> Option<String> {
        let location = record.get("location")?.as_array()?;
        let uf = location.first()?.as_str()?;
        let city = location.get(1)?.as_str()?;
        Some(format!(
            "{}:{}",
            uf.trim().to_lowercase(),
            city.trim().to_lowercase()
        ))
    }

    match value {
        Value::Array(records) => {
            let mut counter = HashMap::<String, u64>::new();
            for key in records.iter().filter_map(key) {
                *counter.entry(key).or_default() += 1;
            }
            for record in records.iter_mut() {
                let Some(key) = key(record) else { continue };
                let Some(n) = counter.get_mut(&key) else { continue };
                if let Some(Value::Array(location)) = record.get_mut("location") {
                    location.truncate(2);
                    location.push((*n).into());
                }
                *n -= 1;
            }
        }
        Value::Object(map) => map.values_mut().for_each(number_by_city),
        _ => {}
    }
}

/// The rows a CSV file is made of.  Objects whose values are all arrays are
/// treated as records grouped by state and flattened.
fn csv_rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Object(map) if !map.is_empty() && map.values().all(Value::is_array) => map
            .into_iter()
            .flat_map(|(_, rows)| match rows {
                Value::Array(rows) => rows,
                _ => vec![],
            })
            .collect(),
        value => vec![value],
    }
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| csv_cell(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

/// Semicolon separated, with a header line only when `header` is given.
/// Columns are every top-level key followed by every `info.<key>`.
pub fn to_csv(rows: &[Value], header: Option<&[String]>) -> anyhow::Result<String> {
    let objects = rows.iter().filter_map(Value::as_object).collect::<Vec<_>>();
    let keys = objects.iter().flat_map(|o| o.keys()).unique().collect_vec();
    let info_keys = objects
        .iter()
        .filter_map(|o| o.get("info").and_then(Value::as_object))
        .flat_map(|info| info.keys())
        .unique()
        .collect_vec();

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![]);
    if let Some(header) = header {
        writer.write_record(header)?;
    }
    for object in objects {
        let info = object.get("info").and_then(Value::as_object);
        let cells = keys
            .iter()
            .map(|k| csv_cell(object.get(*k)))
            .chain(
                info_keys
                    .iter()
                    .map(|k| csv_cell(info.and_then(|i| i.get(*k)))),
            );
        writer.write_record(cells.collect_vec())?;
    }
    let bytes = writer.into_inner().context("While finishing the CSV buffer")?;
    Ok(String::from_utf8(bytes)?)
}

fn render(payload: Payload, format: Format, header: Option<&[String]>) -> anyhow::Result<String> {
    match (payload, format) {
        (Payload::Text(text), Format::Json) => Ok(text),
        (Payload::Text(text), Format::Csv) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                if let Ok(value) = serde_json::from_str::<Value>(&text) {
                    return to_csv(&csv_rows(value), header);
                }
            }
            Ok(text)
        }
        (payload, format) => {
            let mut value = payload.into_value()?;
            if !(value.is_array() || value.is_object()) {
                bail!("The records to save have an invalid type: {value}");
            }
            number_by_city(&mut value);
            match format {
                Format::Json => Ok(serde_json::to_string(&value)?),
                Format::Csv => to_csv(&csv_rows(value), header),
            }
        }
    }
}

/// Writes `payload` as `format` to `dest` (see [`normalize_destination`]) and
/// returns the path actually written.
pub fn save(
    payload: impl Into<Payload>,
    dest: &Path,
    format: Format,
    header: Option<&[String]>,
) -> anyhow::Result<PathBuf> {
    let path = normalize_destination(dest, format);
    let contents = render(payload.into(), format, header)
        .with_context(|| format!("While preparing {path:?}"))?;
    write_text(&path, &contents)?;
    debug!("Wrote {} bytes to {path:?}", contents.len());
    Ok(path)
}

/// Per-file, per-state values collected during a run and written at the end.
#[derive(Default, Debug)]
pub struct SaveBuffer {
    files: BTreeMap<PathBuf, Map<String, Value>>,
}

impl SaveBuffer {
    /// Stages `value` under `uf` (or `main`) of the file at `path`.  Staging the
    /// same state twice merges the top-level keys of two objects and replaces
    /// anything else.
    pub fn stage(&mut self, path: impl Into<PathBuf>, uf: Option<Uf>, value: Value) -> PathBuf {
        let path = path.into();
        let key = uf.map_or_else(|| "main".to_owned(), Uf::lower);
        let slot = self.files.entry(path.clone()).or_default();
        match (slot.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(new)) => existing.extend(new),
            (_, value) => {
                slot.insert(key, value);
            }
        }
        path
    }

    pub fn stage_records(
        &mut self,
        path: impl Into<PathBuf>,
        uf: Option<Uf>,
        records: &[RepeaterRecord],
    ) -> anyhow::Result<PathBuf> {
        Ok(self.stage(path, uf, serde_json::to_value(records)?))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&Map<String, Value>> {
        self.files.get(path)
    }

    /// Writes every staged file as JSON and then as CSV, and empties the buffer.
    pub fn flush(&mut self) -> anyhow::Result<Vec<PathBuf>> {
        let mut written = vec![];
        for (path, states) in std::mem::take(&mut self.files) {
            let value = Value::Object(states);
            for format in [Format::Json, Format::Csv] {
                written.push(save(value.clone(), &path, format, None)?);
            }
        }
        info!("Flushed {} files", written.len());
        Ok(written)
    }
}
