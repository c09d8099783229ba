//! Turns a `?<id>[/<destination>[/<index>]]` query into a record page, a
//! summary page or a redirect.

use anyhow::Context;
use getset::Getters;
use itertools::Itertools;
use log::{info, warn};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{Map, Value};

use crate::{
    fetch::{CachedFetch, Candidate, FetchOptions, Transport},
    query::{format_cid, id_from_url, index_key, ParsedQuery},
    render::{link_target, pre_format, substitute, text_of},
};

pub const INDEX_URL: &str = "/DADOS/homologacoes/sumario_all.json";

/// Aliases followed in the id index before giving up.
const MAX_ALIAS_HOPS: usize = 3;

/// Deferred candidates tried after the direct URL.
const INDEX_RESOLVERS: usize = 3;

/// Record keys shown on the page, in order, with their labels.  Every record must have them.
pub const PROPS: &[(&str, &str)] = &[
    ("id", "Peticionamento ou Processo"),
    ("tp", "Tipo de processo"),
    ("dp", "Data da Petição"),
    ("mc", "Marca"),
    ("md", "Modelo"),
    ("fccid", "FCC ID"),
    ("sn", "Número de Série"),
    ("r", "Homologação<sup>1</sup>"),
    ("v", "Validação da Homologação<sup>1</sup>"),
    ("dt", "Data de Homologação"),
    ("cid", "Código de Identificação"),
];

const SUMMARY_HINT: &str = "\n\n<br /><br /><p>Consulte o <a href=\"/?sumario0\">Sumário</a> para lista de rádios.</p>";

fn prop_label(key: &str) -> Option<&'static str> {
    PROPS.iter().find(|(k, _)| *k == key).map(|(_, label)| *label)
}

fn destinations_help() -> String {
    let items = PROPS
        .iter()
        .map(|(key, label)| format!("<li><b>{key}:</b> {label}</li>"))
        .join("");
    format!(
        "\n\n<p>Apenas os destinos abaixo podem ser usados, <b>mas</b> note que a maioria não conterá URL:</p><ul class='pr'>{items}</ul>{SUMMARY_HINT}"
    )
}

#[derive(Clone, PartialEq, Eq, Debug, Getters, thiserror::Error)]
#[error("{title} ({id})")]
#[getset(get = "pub")]
pub struct LookupError {
    id: String,
    title: String,
    description: String,
}

impl LookupError {
    fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
        }
    }

    /// The record file exists but cannot be shown.
    pub fn malformed_record(id: &str) -> Self {
        Self::new(
            id,
            "Dados de registro incorretos",
            "O arquivo do registro existe, mas a formatação está incorreta, impedindo a exibição.",
        )
    }

    /// Missing, invalid or unknown query.
    pub fn bad_parameter(id: &str) -> Self {
        Self::new(
            id,
            "Parâmetro inexistente",
            format!("A URL deve terminar com <span class=\"url\">\"/?<b>XXX</b>\"</span>, onde \"XXX\" é o nº do peticionamento, despacho ou homologação Anatel sem pontuação. {SUMMARY_HINT}"),
        )
    }

    pub fn malformed_summary(id: &str) -> Self {
        Self::new(
            id,
            "Sumário mal formatado",
            "O sumário existe, mas possui uma formatação incompatível para exibição.",
        )
    }

    fn destination(id: &str, title: String, description: &str) -> Self {
        Self::new(id, title, format!("{description}{}", destinations_help()))
    }

    /// The error id as shown next to the title.
    pub fn id_html(&self) -> String {
        if self.id.is_empty() {
            String::new()
        } else {
            format!("<sup>{}</sup>", self.id.to_uppercase())
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Row {
    Field { label: String, value: String },
    Malformed,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SummaryRow {
    pub cells: [String; 3],
    pub link: String,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Nav {
    pub previous: Option<i64>,
    pub next: Option<i64>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SummaryTable {
    pub header: [String; 3],
    pub rows: Vec<SummaryRow>,
    pub nav: Option<Nav>,
}

impl SummaryTable {
    pub fn header() -> [String; 3] {
        ["Peticionamento", "Marca / Modelo", "ID"].map(str::to_owned)
    }
}

/// Everything shown on the page.  Title and description hold HTML.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Page {
    pub title: Option<String>,
    pub description: Option<String>,
    pub rows: Vec<Row>,
    pub summary: Option<SummaryTable>,
    pub error: Option<LookupError>,
}

impl Page {
    /// Shows `error`.  A title already on the page is kept.
    pub fn fail(&mut self, error: LookupError) {
        if self.title.is_none() {
            self.title = Some(format!("⚠️ {}{}", error.title, error.id_html()));
        }
        self.description = Some(format!("\n\n{}", error.description));
        self.error = Some(error);
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Outcome {
    Redirect(String),
    Page(Page),
}

fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

pub fn record_url(cid: &str) -> String {
    format!("DADOS/homologacoes/{cid}.json?t={}", nonce())
}

/// The record URL the id index gives for the id of `previous` (or `cid` when
/// there is no previous URL).  Index values without `@` name another id.
pub fn resolve_in_index(
    index: Option<&Map<String, Value>>,
    previous: Option<&str>,
    cid: &str,
) -> anyhow::Result<Option<String>> {
    let Some(index) = index else {
        return Ok(None);
    };
    let mut from = previous.map_or(cid, id_from_url).to_owned();
    for _ in 0..=MAX_ALIAS_HOPS {
        let key = index_key(&from);
        let value = index
            .get(&key)
            .and_then(Value::as_str)
            .with_context(|| format!("{key:?} is not in the id index"))?;
        match value.split_once('@') {
            Some((before, after)) => {
                let target = format!("{before}{}", format_cid(&format!("{key}{after}")));
                return Ok(Some(record_url(&target)));
            }
            None => from = id_from_url(value).to_owned(),
        }
    }
    anyhow::bail!("Too many aliases in the id index, the last one being {from:?}")
}

pub struct Lookup<T> {
    fetch: CachedFetch<T>,
    options: FetchOptions,
}

impl<T: Transport> Lookup<T> {
    pub fn new(transport: T, options: FetchOptions) -> Self {
        Self {
            fetch: CachedFetch::new(transport),
            options,
        }
    }

    pub async fn run(&mut self, search: &str) -> Outcome {
        let mut page = Page::default();
        match self.fill(search, &mut page).await {
            Ok(Some(url)) => Outcome::Redirect(url),
            Ok(None) => Outcome::Page(page),
            Err(error) => {
                info!("Lookup of {search:?} failed: {error}");
                page.fail(error);
                Outcome::Page(page)
            }
        }
    }

    async fn fetch_index(&mut self) -> Option<Map<String, Value>> {
        match self
            .fetch
            .json(vec![Candidate::url(INDEX_URL)], &self.options)
            .await
        {
            Ok(Value::Object(index)) => Some(index),
            Ok(_) => {
                warn!("The id index is not an object");
                None
            }
            Err(e) => {
                warn!("The id index is not available: {e}");
                None
            }
        }
    }

    async fn fill(&mut self, search: &str, page: &mut Page) -> Result<Option<String>, LookupError> {
        let query = ParsedQuery::parse(search).ok_or_else(|| LookupError::bad_parameter("CX"))?;
        if !query.has_valid_id() {
            return Err(LookupError::bad_parameter("1T"));
        }
        let cid = query.cid();
        let index = self.fetch_index().await;

        let mut candidates = vec![Candidate::Url(record_url(&cid))];
        for _ in 0..INDEX_RESOLVERS {
            let (index, cid) = (index.as_ref(), cid.as_str());
            candidates.push(Candidate::Deferred(Box::new(move |previous| {
                resolve_in_index(index, previous, cid)
            })));
        }
        let data = match self.fetch.json(candidates, &self.options).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Could not load {cid:?}: {e}");
                return Err(LookupError::bad_parameter("BX"));
            }
        };

        if let Some(number) = query.summary_page() {
            fill_summary(page, number, &data)?;
            return Ok(None);
        }
        check_record(&data)?;
        match query.destination() {
            Some(destination) => destination_url(&query, &destination, &data).map(Some),
            None => {
                fill_record(page, &data)?;
                Ok(None)
            }
        }
    }
}

fn fill_summary(page: &mut Page, number: i64, data: &Value) -> Result<(), LookupError> {
    let Value::Array(entries) = data else {
        return Err(LookupError::malformed_summary("S1"));
    };
    let table = page.summary.insert(SummaryTable {
        header: SummaryTable::header(),
        rows: vec![],
        nav: None,
    });
    for (i, entry) in entries.iter().enumerate() {
        if let (true, Some(next)) = (i + 1 == entries.len(), entry.as_i64()) {
            table.nav = Some(Nav {
                previous: (number >= 1).then_some(number - 1),
                next: (next >= 0).then_some(next),
            });
            continue;
        }
        let row = match entry {
            Value::Array(row) if row.len() == 4 => row,
            _ => return Err(LookupError::malformed_summary("S2")),
        };
        let id = index_key(&text_of(&row[0]));
        let suffix = text_of(&row[3]).replacen('@', "", 1);
        table.rows.push(SummaryRow {
            cells: [text_of(&row[0]), text_of(&row[1]), text_of(&row[2])],
            link: format!("/?{id}{suffix}"),
        });
    }
    page.title = Some("Sumário".to_owned());
    Ok(())
}

fn check_record(data: &Value) -> Result<(), LookupError> {
    for (key, _) in PROPS {
        if data.get(key).is_none() {
            return Err(LookupError::malformed_record(&format!(":{key}")));
        }
    }
    match data.get("items") {
        Some(Value::Array(_)) => Ok(()),
        _ => Err(LookupError::malformed_record("ITM1")),
    }
}

fn destination_url(query: &ParsedQuery, destination: &str, data: &Value) -> Result<String, LookupError> {
    let invalid = || format!("Destino \"{destination}\" inválido");
    if prop_label(destination).is_none() {
        return Err(LookupError::destination("D1", invalid(), "Destino não é permitido."));
    }
    let Some(value) = data.get(destination) else {
        return Err(LookupError::destination(
            "D2",
            format!("Destino \"{destination}\" inexistente"),
            "Variável não definida no registro.",
        ));
    };
    let selected = match (query.index(), value) {
        (Some(i), Value::Array(list)) => match list.get(i) {
            Some(nested @ Value::Array(_)) => nested,
            _ => value,
        },
        _ => value,
    };
    link_target(selected).ok_or_else(|| {
        LookupError::destination(
            "D3",
            invalid(),
            "Variável de destino não é uma URL válida ou existente.",
        )
    })
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn fill_record(page: &mut Page, data: &Value) -> Result<(), LookupError> {
    let text = |key: &str| data.get(key).map(text_of).unwrap_or_default();
    page.title = Some(format!("<small>{}</small> {}", capitalize_first(&text("mc")), text("md")));

    let field = |key: &str, label: &str| Row::Field {
        label: substitute(label),
        value: pre_format(&data[key], Some(key)),
    };
    page.rows.extend(PROPS.iter().map(|&(key, label)| field(key, label)));

    let items = data["items"].as_array().map(Vec::as_slice).unwrap_or_default();
    for item in items {
        let row = match item {
            Value::Array(pair) => match pair.first() {
                Some(Value::String(label)) if !label.is_empty() => Some(Row::Field {
                    label: substitute(label),
                    value: pre_format(pair.get(1).unwrap_or(&Value::Null), None),
                }),
                _ => None,
            },
            // A bare key repeats one of the fields above.
            Value::String(key) => prop_label(key).map(|label| field(key.as_str(), label)),
            _ => None,
        };
        match row {
            Some(row) => page.rows.push(row),
            None => {
                page.rows.push(Row::Malformed);
                return Err(LookupError::malformed_record("ITM2"));
            }
        }
    }
    Ok(())
}
