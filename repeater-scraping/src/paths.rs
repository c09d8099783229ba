use std::path::{Path, PathBuf};

use crate::{normalize::Uf, save::Format};

/// Directory layout of the published data.
#[derive(Clone, Debug)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dados(&self) -> PathBuf {
        self.root.join("DADOS")
    }

    pub fn homologations(&self) -> PathBuf {
        self.dados().join("homologacoes")
    }

    pub fn repeaters(&self) -> PathBuf {
        self.dados().join("repetidoras")
    }

    /// `repetidoras/<base>/uf/sp/sp.<suffix>.json`, or `repetidoras/<base>.<suffix>.json` without a state.
    pub fn state_file(&self, base: &str, uf: Option<Uf>, suffix: &str) -> PathBuf {
        let suffix = if suffix.is_empty() {
            String::new()
        } else {
            format!(".{suffix}")
        };
        let base = base.trim_matches('/');
        match uf {
            Some(uf) => {
                let uf = uf.lower();
                self.repeaters()
                    .join(base)
                    .join("uf")
                    .join(&uf)
                    .join(format!("{uf}{suffix}.json"))
            }
            None => {
                let stem = Path::new(base)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .filter(|s| !s.is_empty())
                    .unwrap_or("dados");
                self.repeaters().join(format!("{stem}{suffix}.json"))
            }
        }
    }
}

/// Where a save of `format` should land, given what the caller asked for.
///
/// Empty means `dados.<ext>`; a path that looks like a file gets its extension
/// replaced; anything else is treated as a directory.
pub fn normalize_destination(path: &Path, format: Format) -> PathBuf {
    let ext = format.extension();
    if path.as_os_str().is_empty() {
        return PathBuf::from(format!("dados.{ext}"));
    }
    if path.extension().is_some() {
        path.with_extension(ext)
    } else {
        path.join(format!("dados.{ext}"))
    }
}
