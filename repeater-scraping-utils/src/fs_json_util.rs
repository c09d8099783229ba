use std::{
    fmt::Debug,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use fs_err::File;
use serde::{Deserialize, Serialize};

pub fn read_json<P: Into<PathBuf> + Debug, T: for<'de> Deserialize<'de>>(
    path: P,
) -> anyhow::Result<T> {
    let path = path.into();
    (|| serde_json::from_reader(BufReader::new(File::open(&path)?)).map_err(anyhow::Error::new))()
        .with_context(|| {
            format!(
                "While trying to parse {path:?} as {}",
                std::any::type_name::<T>()
            )
        })
}

/// Writes `value` as compact JSON, creating the parent directories if needed.
pub fn write_json<P: Into<PathBuf>, T: Serialize>(path: P, value: &T) -> anyhow::Result<()> {
    let path = path.into();
    create_parent_dir(&path)?;
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("While trying to write JSON to {path:?}"))?;
    writer.flush()?;
    Ok(())
}

/// Writes raw text, creating the parent directories if needed.
pub fn write_text<P: Into<PathBuf>>(path: P, contents: &str) -> anyhow::Result<()> {
    let path = path.into();
    create_parent_dir(&path)?;
    fs_err::write(&path, contents)?;
    Ok(())
}

pub fn read_toml<P: Into<PathBuf> + Debug, T: for<'de> Deserialize<'de>>(
    path: P,
) -> anyhow::Result<T> {
    let path = path.into();
    (|| toml::from_str(&fs_err::read_to_string(&path)?).map_err(anyhow::Error::new))().with_context(
        || {
            format!(
                "While trying to parse {path:?} as {}",
                std::any::type_name::<T>()
            )
        },
    )
}

fn create_parent_dir(path: &Path) -> anyhow::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs_err::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::{read_json, read_toml, write_json, write_text};

    #[test]
    fn json_round_trip_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.json");
        let value: BTreeMap<String, Vec<u32>> = [("x".to_owned(), vec![1, 2, 3])].into();
        write_json(&path, &value).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"x":[1,2,3]}"#
        );
        let read: BTreeMap<String, Vec<u32>> = read_json(&path).unwrap();
        assert_eq!(read, value);
    }

    #[test]
    fn read_toml_reports_type_on_failure() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Conf {
            port: u16,
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.toml");
        write_text(&path, "port = \"not a number\"").unwrap();
        let err = read_toml::<_, Conf>(&path).unwrap_err();
        assert!(format!("{err}").contains("Conf"), "{err}");
    }
}
