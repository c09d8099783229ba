use std::{collections::HashMap, fmt::Debug, path::PathBuf};

use anyhow::Context;
use itertools::Itertools;
use repeater_scraping_utils::fs_json_util::read_json;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Brazilian state (unidade federativa).
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Uf {
    AC,
    AL,
    AP,
    AM,
    BA,
    CE,
    DF,
    ES,
    GO,
    MA,
    MT,
    MS,
    MG,
    PA,
    PB,
    PR,
    PE,
    PI,
    RJ,
    RN,
    RS,
    RO,
    RR,
    SC,
    SP,
    SE,
    TO,
}

impl Uf {
    pub fn full_name(self) -> &'static str {
        use Uf::*;
        match self {
            AC => "Acre",
            AL => "Alagoas",
            AP => "Amapá",
            AM => "Amazonas",
            BA => "Bahia",
            CE => "Ceará",
            DF => "Distrito Federal",
            ES => "Espírito Santo",
            GO => "Goiás",
            MA => "Maranhão",
            MT => "Mato Grosso",
            MS => "Mato Grosso do Sul",
            MG => "Minas Gerais",
            PA => "Pará",
            PB => "Paraíba",
            PR => "Paraná",
            PE => "Pernambuco",
            PI => "Piauí",
            RJ => "Rio de Janeiro",
            RN => "Rio Grande do Norte",
            RS => "Rio Grande do Sul",
            RO => "Rondônia",
            RR => "Roraima",
            SC => "Santa Catarina",
            SP => "São Paulo",
            SE => "Sergipe",
            TO => "Tocantins",
        }
    }

    /// Accepts either the two-letter code or the full name, ignoring case and accents.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if let Ok(uf) = name.parse() {
            return Some(uf);
        }
        let key = fold_key(name);
        Uf::iter().find(|uf| fold_key(uf.full_name()) == key)
    }

    /// Lowercase code, as used in directory and file names.
    pub fn lower(self) -> String {
        self.as_ref().to_ascii_lowercase()
    }
}

/// Lowercases, strips Portuguese diacritics and collapses whitespace.
pub fn fold_key(s: &str) -> String {
    s.split_whitespace()
        .map(|word| word.chars().map(fold_char).collect::<String>())
        .join(" ")
}

fn fold_char(c: char) -> char {
    match c.to_lowercase().next().unwrap_or(c) {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        c => c,
    }
}

/// Capitalizes every space-separated word: `"SAO jose"` becomes `"Sao Jose"`.
pub fn capitalize(s: &str) -> String {
    s.to_lowercase()
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .join(" ")
}

/// Resolves a scraped city name to the spelling used in the output files.
pub trait CityResolver {
    fn resolve(&self, city: &str, uf: Uf) -> Option<String>;
}

/// Canonical city names per state, matched by [`fold_key`].
#[derive(Default, Debug)]
pub struct CityIndex {
    cities: HashMap<Uf, HashMap<String, String>>,
}

impl CityIndex {
    pub fn from_lists(lists: impl IntoIterator<Item = (Uf, Vec<String>)>) -> Self {
        let cities = lists
            .into_iter()
            .map(|(uf, names)| {
                let names = names
                    .into_iter()
                    .map(|name| (fold_key(&name), name))
                    .collect();
                (uf, names)
            })
            .collect();
        Self { cities }
    }

    /// Loads a `{ "SP": ["São Paulo", ...], ... }` file.
    pub fn load<P: Into<PathBuf> + Debug>(path: P) -> anyhow::Result<Self> {
        let raw: HashMap<String, Vec<String>> = read_json(path)?;
        let lists = raw
            .into_iter()
            .map(|(uf, names)| {
                let parsed = Uf::from_name(&uf)
                    .with_context(|| format!("Unknown state in city list: {uf:?}"))?;
                anyhow::Ok((parsed, names))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self::from_lists(lists))
    }

    pub fn len(&self) -> usize {
        self.cities.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CityResolver for CityIndex {
    fn resolve(&self, city: &str, uf: Uf) -> Option<String> {
        let city = city.split_whitespace().join(" ");
        if city.is_empty() {
            return None;
        }
        let canonical = self
            .cities
            .get(&uf)
            .and_then(|names| names.get(&fold_key(&city)));
        Some(match canonical {
            Some(name) => name.clone(),
            None => capitalize(&city),
        })
    }
}
