use std::{fmt::Debug, path::PathBuf, time::Duration};

use repeater_scraping_utils::fs_json_util::read_toml;
use serde::Deserialize;
use url::Url;

use crate::sources::{LabreSp, RadioId};

/// Settings of a scraping run, read from a TOML file.  Every key is optional.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory that contains `DADOS/`.
    pub data_root: PathBuf,
    /// Overrides the published radioid.net list.
    pub radioid_url: Option<Url>,
    pub radioid_local_path: String,
    /// Overrides the LABRE-SP repeater page.
    pub labre_url: Option<Url>,
    /// `{ "SP": ["São Paulo", ...] }`.
    pub cities_path: Option<PathBuf>,
    /// Keeps downloaded payloads between runs when set.
    pub storage_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            radioid_url: None,
            radioid_local_path: RadioId::default().local_path,
            labre_url: None,
            cities_path: None,
            storage_path: None,
            timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn load<P: Into<PathBuf> + Debug>(path: P) -> anyhow::Result<Self> {
        read_toml(path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn radioid(&self) -> RadioId {
        let source = RadioId::builder().local_path(&self.radioid_local_path);
        match &self.radioid_url {
            Some(url) => source.url(url.as_str()).build(),
            None => source.build(),
        }
    }

    pub fn labre_sp(&self) -> LabreSp {
        match &self.labre_url {
            Some(url) => LabreSp::builder().url(url.as_str()).build(),
            None => LabreSp::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use super::Config;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs_err::write(&path, "data_root = \"site\"\ntimeout_secs = 3\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.data_root, PathBuf::from("site"));
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.radioid().local_path, "rptrs.json");
        assert!(config.labre_sp().url.starts_with("https://www.labre-sp.org.br/"));
        assert_eq!(config.storage_path, None);
    }

    #[test]
    fn source_urls_are_overridable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs_err::write(&path, "labre_url = \"http://localhost:8080/labre.html\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.labre_sp().url, "http://localhost:8080/labre.html");
        assert_eq!(config.radioid().url, "https://radioid.net/static/rptrs.json");

        fs_err::write(&path, "labre_url = \"not a url\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn unknown_types_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs_err::write(&path, "timeout_secs = \"soon\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
