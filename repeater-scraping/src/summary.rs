//! Paginated listing of the homologation records, plus the id index used by the lookup page.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use getset::{CopyGetters, Getters};
use log::{info, warn};
use repeater_scraping_utils::{
    fs_json_util::{read_json, write_json},
    regex,
};
use serde::Serialize;
use serde_json::Value;

pub const PAGE_SIZE: usize = 25;

/// `[id, "Brand;model", cid, suffix]`.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct SummaryEntry(pub String, pub String, pub Value, pub String);

#[derive(Debug, Getters, CopyGetters)]
pub struct SummaryReport {
    #[getset(get_copy = "pub")]
    pages: usize,
    #[getset(get_copy = "pub")]
    items: usize,
    #[getset(get = "pub")]
    removed: Vec<PathBuf>,
}

fn strip_non_word(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The id of one element of an id list: the first element of a pair, or the element itself.
fn element_id(value: &Value) -> String {
    match value {
        Value::Array(pair) => pair.first().map(scalar_text).unwrap_or_default(),
        other => scalar_text(other),
    }
}

/// First letter upper, the rest lower.
fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Splits a file stem like `01234-567890-1234-56-x` into `("01234-567890-1234-56-", "@x")`.
pub fn split_file_stem(stem: &str) -> Option<(String, String)> {
    let prefix = regex!(r"^\d{5}[-.]?\d{6}[-.]?\d{4}[-.]?\d{2}[-.]?").find(stem)?;
    Some((
        prefix.as_str().to_owned(),
        format!("@{}", &stem[prefix.end()..]),
    ))
}

#[derive(Default, Debug)]
pub struct SummaryBuilder {
    entries: Vec<SummaryEntry>,
    index: BTreeMap<String, String>,
}

impl SummaryBuilder {
    /// Adds one record stored under the file stem `stem`.
    pub fn add_record(&mut self, stem: &str, record: &Value) -> anyhow::Result<()> {
        let (fname_or, fname_pos) = split_file_stem(stem)
            .with_context(|| format!("File name {stem:?} does not start with a certificate number"))?;
        let id = record.get("id").context("Record has no id")?;

        let (latest_id, pair_list) = match id {
            Value::Array(list) => match list.first() {
                Some(Value::Array(_)) => (list.last().map(element_id), true),
                first => (first.map(scalar_text), false),
            },
            scalar => (Some(scalar_text(scalar)), false),
        };
        let latest_id = strip_non_word(&latest_id.unwrap_or_default());

        if let (true, Value::Array(list)) = (pair_list, id) {
            let stripped_or = strip_non_word(&fname_or);
            for alternate in list {
                let alternate = strip_non_word(&element_id(alternate));
                let target = if alternate == stripped_or {
                    &fname_pos
                } else {
                    &fname_or
                };
                self.index.insert(alternate, target.clone());
            }
        } else {
            let first = match id {
                Value::Array(list) => list.first().map(scalar_text).unwrap_or_default(),
                scalar => scalar_text(scalar),
            };
            self.index.insert(strip_non_word(&first), fname_pos.clone());
        }

        let text = |key: &str| record.get(key).and_then(Value::as_str).unwrap_or("");
        let brand = capitalize_first(text("mc"));
        self.entries.push(SummaryEntry(
            latest_id,
            format!("{brand};{}", text("md")),
            record.get("cid").cloned().unwrap_or(Value::Null),
            fname_pos,
        ));
        Ok(())
    }

    /// Adds every record file of `dir`, in name order.
    pub fn scan(&mut self, dir: &Path) -> anyhow::Result<()> {
        let mut names = fs_err::read_dir(dir)?
            .map(|entry| Ok(entry?.file_name().to_string_lossy().into_owned()))
            .collect::<anyhow::Result<Vec<_>>>()?;
        names.sort();
        for name in names {
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            if regex!(r"(?i)^sumario(\d+|_)").is_match(&name) {
                continue;
            }
            let record: Value = read_json(dir.join(&name))?;
            if let Err(e) = self.add_record(stem, &record) {
                warn!("Skipping {name:?}: {e:#}");
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> &[SummaryEntry] {
        &self.entries
    }

    pub fn index(&self) -> &BTreeMap<String, String> {
        &self.index
    }

    /// Pages of [`PAGE_SIZE`] entries.  Every page but the last ends with the
    /// index of the next one; the last ends with `-1` when there are several.
    pub fn pages(&self) -> anyhow::Result<Vec<Vec<Value>>> {
        let chunks = self.entries.chunks(PAGE_SIZE).collect::<Vec<_>>();
        let total = chunks.len();
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut page = chunk
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<Result<Vec<_>, _>>()?;
                if i + 1 < total {
                    page.push((i + 1).into());
                } else if total > 1 {
                    page.push((-1).into());
                }
                Ok(page)
            })
            .collect()
    }

    /// Writes `sumario<N>.json` and `sumario_all.json` into `dir`, removing
    /// pages left over from a longer listing.
    pub fn write(&self, dir: &Path) -> anyhow::Result<SummaryReport> {
        let pages = self.pages()?;
        let mut removed = vec![];
        for entry in fs_err::read_dir(dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(captures) = regex!(r"(?i)^sumario(\d+)\.json$").captures(name) else {
                continue;
            };
            if captures[1].parse::<usize>().map_or(true, |n| n >= pages.len()) {
                fs_err::remove_file(&path)?;
                warn!("Removed stale page {path:?}");
                removed.push(path);
            }
        }
        for (i, page) in pages.iter().enumerate() {
            write_json(dir.join(format!("sumario{i}.json")), page)?;
        }
        write_json(dir.join("sumario_all.json"), &self.index)?;
        info!(
            "{} summary pages written, {} items in total",
            pages.len(),
            self.entries.len()
        );
        Ok(SummaryReport {
            pages: pages.len(),
            items: self.entries.len(),
            removed,
        })
    }
}

/// Rebuilds the summary of the homologation directory `dir`.
pub fn build_summary(dir: &Path) -> anyhow::Result<SummaryReport> {
    let mut builder = SummaryBuilder::default();
    builder.scan(dir)?;
    builder.write(dir)
}
