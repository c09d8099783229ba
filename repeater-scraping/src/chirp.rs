//! CHIRP memory import files (Baofeng UV-5R column set).

use std::{fmt::Debug, path::PathBuf};

use anyhow::Context;
use repeater_scraping_utils::fs_json_util::{read_json, write_text};
use serde::Serialize;
use serde_json::Value;

use crate::record::RepeaterRecord;

/// Longest memory name the UV-5R displays.
pub const NAME_LENGTH: usize = 7;
const DEFAULT_TONE: f64 = 88.5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ChirpRow {
    location: usize,
    name: String,
    frequency: String,
    duplex: &'static str,
    offset: String,
    tone: &'static str,
    #[serde(rename = "rToneFreq")]
    r_tone_freq: String,
    #[serde(rename = "cToneFreq")]
    c_tone_freq: String,
    dtcs_code: &'static str,
    dtcs_polarity: &'static str,
    rx_dtcs_code: &'static str,
    cross_mode: &'static str,
    mode: &'static str,
    #[serde(rename = "TStep")]
    t_step: &'static str,
    skip: &'static str,
    power: &'static str,
    comment: String,
    #[serde(rename = "URCALL")]
    urcall: &'static str,
    #[serde(rename = "RPT1CALL")]
    rpt1call: &'static str,
    #[serde(rename = "RPT2CALL")]
    rpt2call: &'static str,
    #[serde(rename = "DVCODE")]
    dvcode: &'static str,
}

impl ChirpRow {
    fn new(location: usize, record: &RepeaterRecord) -> Self {
        let split = record.tx - record.rx;
        let duplex = match split {
            s if s > 1e-9 => "+",
            s if s < -1e-9 => "-",
            _ => "",
        };
        let hz = record
            .tone
            .as_ref()
            .and_then(|tone| tone.hz())
            .filter(|&hz| hz > 0.0);
        let tone_freq = format!("{:.1}", hz.unwrap_or(DEFAULT_TONE));
        let name = record
            .callsign()
            .unwrap_or(record.location.city.as_str())
            .chars()
            .take(NAME_LENGTH)
            .collect();
        Self {
            location,
            name,
            frequency: format!("{:.6}", record.rx),
            duplex,
            offset: format!("{:.6}", split.abs()),
            tone: if hz.is_some() { "Tone" } else { "" },
            r_tone_freq: tone_freq.clone(),
            c_tone_freq: tone_freq,
            dtcs_code: "023",
            dtcs_polarity: "NN",
            rx_dtcs_code: "023",
            cross_mode: "Tone->Tone",
            mode: "FM",
            t_step: "5.00",
            skip: "",
            power: "High",
            comment: record.location.city.clone(),
            urcall: "",
            rpt1call: "",
            rpt2call: "",
            dvcode: "",
        }
    }
}

/// The CSV CHIRP imports, memories numbered from 0.
pub fn chirp_csv(records: &[RepeaterRecord]) -> anyhow::Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![]);
    for (location, record) in records.iter().enumerate() {
        writer.serialize(ChirpRow::new(location, record))?;
    }
    let bytes = writer
        .into_inner()
        .context("While finishing the CHIRP buffer")?;
    Ok(String::from_utf8(bytes)?)
}

/// Reads records from a JSON file holding either an array of records or an
/// object of arrays keyed by state.
pub fn read_records<P: Into<PathBuf> + Debug>(path: P) -> anyhow::Result<Vec<RepeaterRecord>> {
    let value: Value = read_json(path)?;
    let lists = match value {
        Value::Array(_) => vec![value],
        Value::Object(map) => map.into_iter().map(|(_, list)| list).collect(),
        other => anyhow::bail!("Expected records, found {other}"),
    };
    let mut records = vec![];
    for list in lists {
        records.extend(serde_json::from_value::<Vec<RepeaterRecord>>(list)?);
    }
    Ok(records)
}

/// Converts the records of `input` into a CHIRP file at `output`, returning the number of memories.
pub fn export_file(input: PathBuf, output: PathBuf) -> anyhow::Result<usize> {
    let records = read_records(input)?;
    write_text(output, &chirp_csv(&records)?)?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::{chirp_csv, export_file};
    use crate::{
        normalize::Uf,
        record::{Location, RepeaterRecord, Tone},
    };

    fn record(rx: f64, tx: f64, tone: Option<Tone>) -> RepeaterRecord {
        RepeaterRecord {
            rx,
            tx,
            offset: tx - rx,
            tone,
            location: Location::new(Uf::SP, "Campinas"),
            info: BTreeMap::from([("callsign".to_owned(), json!("PY2CMP/1"))]),
            extra: Default::default(),
        }
    }

    #[test]
    fn columns_and_rows() {
        let csv = chirp_csv(&[
            record(146.73, 146.13, Some(Tone::Text("77.00".to_owned()))),
            record(439.0, 434.0, Some(Tone::Text("OPEN".to_owned()))),
            record(145.5, 145.5, None),
        ])
        .unwrap();
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(
            lines[0],
            "Location,Name,Frequency,Duplex,Offset,Tone,rToneFreq,cToneFreq,DtcsCode,DtcsPolarity,\
             RxDtcsCode,CrossMode,Mode,TStep,Skip,Power,Comment,URCALL,RPT1CALL,RPT2CALL,DVCODE"
        );
        assert_eq!(
            lines[1],
            "0,PY2CMP/,146.730000,-,0.600000,Tone,77.0,77.0,023,NN,023,Tone->Tone,FM,5.00,,High,Campinas,,,,"
        );
        assert!(lines[2].starts_with("1,PY2CMP/,439.000000,-,5.000000,,88.5,88.5,"));
        assert!(lines[3].starts_with("2,PY2CMP/,145.500000,,0.000000,,"));
    }

    #[test]
    fn exports_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sp.json");
        let r = record(146.73, 146.13, None);
        fs_err::write(&input, json!({"sp": [r.clone(), r]}).to_string()).unwrap();
        let output = dir.path().join("sp.chirp.csv");
        assert_eq!(export_file(input, output.clone()).unwrap(), 2);
        assert_eq!(fs_err::read_to_string(output).unwrap().lines().count(), 3);
    }
}
