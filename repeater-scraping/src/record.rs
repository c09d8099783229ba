use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::normalize::Uf;

/// One repeater, in the schema shared by every source.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct RepeaterRecord {
    pub rx: f64,
    pub tx: f64,
    pub offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
    pub location: Location,
    #[serde(default)]
    pub info: BTreeMap<String, Value>,
    /// Source-specific fields that have no dedicated slot (color, timeslot, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RepeaterRecord {
    pub fn callsign(&self) -> Option<&str> {
        self.info.get("callsign").and_then(Value::as_str)
    }
}

/// `[UF, city]`, or `[UF, city, n]` once the per-city counter has been applied.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Location {
    pub uf: Uf,
    pub city: String,
    pub seq: Option<u32>,
}

impl Location {
    pub fn new(uf: Uf, city: impl Into<String>) -> Self {
        Self {
            uf,
            city: city.into(),
            seq: None,
        }
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.seq {
            Some(seq) => (self.uf, &self.city, seq).serialize(serializer),
            None => (self.uf, &self.city).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Counted(Uf, String, u32),
            Plain(Uf, String),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Counted(uf, city, seq) => Location {
                uf,
                city,
                seq: Some(seq),
            },
            Repr::Plain(uf, city) => Location::new(uf, city),
        })
    }
}

/// Squelch setting: a CTCSS frequency, or a mode name like `OPEN` / `D-STAR`.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tone {
    Hz(f64),
    Text(String),
}

impl Tone {
    /// Scraped tables give the tone as free text; numbers are kept as 2-decimal strings.
    pub fn from_scraped(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Tone::Text("0.00".to_owned());
        }
        match parse_float_prefix(text) {
            Some(hz) => Tone::Text(format!("{hz:.2}")),
            None => Tone::Text(text.to_uppercase()),
        }
    }

    /// The CTCSS frequency, if any.
    pub fn hz(&self) -> Option<f64> {
        match self {
            Tone::Hz(hz) => Some(*hz),
            Tone::Text(text) => text.parse().ok(),
        }
    }
}

impl Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tone::Hz(hz) => write!(f, "{hz}"),
            Tone::Text(text) => f.write_str(text),
        }
    }
}

pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Parses the leading numeric part of `s`, accepting a comma as the decimal separator.
/// `"145,310 MHz"` gives `145.31`; `"OPEN"` gives `None`.
pub fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim().replacen(',', ".", 1);
    let m = repeater_scraping_utils::regex!(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").find(&s)?;
    m.as_str().parse().ok()
}
