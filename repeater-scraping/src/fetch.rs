use std::{
    collections::HashMap,
    future::Future,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::bail;
use itertools::Itertools;
use log::{debug, info, warn};
use serde_json::Value;

use crate::storage::{get_or_insert_with, KeyValueStore};

/// A candidate that failed this many times is not tried again during the run.
pub const MAX_FAILURES: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Timed out")]
    Timeout,
    #[error("No way to load {0:?} in this environment")]
    Unsupported(String),
    #[error("Server returned {0}")]
    Status(u16),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Content is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Skipped after failing too many times")]
    TooManyFailures,
    #[error("Every candidate for {resource:?} failed: {}", summarize(.attempts))]
    Exhausted {
        resource: String,
        attempts: Vec<(String, FetchError)>,
    },
}

fn summarize(attempts: &[(String, FetchError)]) -> String {
    attempts
        .iter()
        .map(|(candidate, e)| format!("[{candidate}: {e}]"))
        .join(", ")
}

/// The capability to GET a URL as text.
pub trait HttpGet {
    fn get_text(&self, url: &str) -> impl Future<Output = Result<String, FetchError>>;
}

pub struct ReqwestGet {
    client: reqwest::Client,
}

impl ReqwestGet {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("repeater-scraping/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl HttpGet for ReqwestGet {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let network = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        };
        let response = self.client.get(url).send().await.map_err(network)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_owned()));
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.text().await.map_err(network)
    }
}

pub fn is_url(s: &str) -> bool {
    repeater_scraping_utils::regex!(r"^\s*[a-zA-Z]+://").is_match(s)
}

/// Neither a URL, a protocol-relative URL, a drive path nor an absolute path.
pub fn is_relative(s: &str) -> bool {
    !is_url(s)
        && !s.starts_with('/')
        && !repeater_scraping_utils::regex!(r"^(?:[a-zA-Z]+:)?//").is_match(s)
        && !repeater_scraping_utils::regex!(r"^[a-zA-Z]:\\").is_match(s)
}

fn normalize_separators(p: &str) -> String {
    repeater_scraping_utils::regex!(r"/{2,}")
        .replace_all(&p.replace('\\', "/"), "/")
        .into_owned()
}

/// Loads resources by trying local files and HTTP in turn.
///
/// Holds the per-run content cache and failure counters.
pub struct Fetcher<H> {
    http: Option<H>,
    root: PathBuf,
    local: bool,
    cache: HashMap<String, String>,
    failures: HashMap<String, u32>,
}

impl<H: HttpGet> Fetcher<H> {
    /// A fetcher that can read the local filesystem under `root`.
    pub fn local(root: impl Into<PathBuf>, http: Option<H>) -> Self {
        Self {
            http,
            root: root.into(),
            local: true,
            cache: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    /// A fetcher without filesystem access.
    pub fn remote(http: H) -> Self {
        Self {
            http: Some(http),
            root: PathBuf::new(),
            local: false,
            cache: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    pub fn failures(&self, candidate: &str) -> u32 {
        self.failures.get(candidate).copied().unwrap_or(0)
    }

    pub fn is_cached(&self, candidate: &str) -> bool {
        self.cache.contains_key(candidate)
    }

    /// The paths tried for `path`, in order and without duplicates.
    pub fn fallback_variants(&self, path: &str) -> Vec<String> {
        if is_url(path) {
            return vec![path.trim().to_owned()];
        }
        let relative = is_relative(path);
        let mut list = vec![path.to_owned()];
        if relative {
            list.extend(["./", "../", "../../"].map(|prefix| format!("{prefix}{path}")));
        }
        if self.local {
            let root = self.root.to_string_lossy();
            list.push(join(&root, path));
            if relative {
                list.extend(["./", "../", "../../"].map(|prefix| join(&join(&root, prefix), path)));
            }
        }
        list.iter().map(|p| normalize_separators(p)).unique().collect()
    }

    async fn download(&mut self, link: &str) -> Result<String, FetchError> {
        if let Some(content) = self.cache.get(link) {
            return Ok(content.clone());
        }
        let content = if self.local && !is_url(link) {
            read_local(Path::new(link))?
        } else if is_url(link) {
            match &self.http {
                Some(http) => http.get_text(link).await?,
                None => return Err(FetchError::Unsupported(link.to_owned())),
            }
        } else {
            return Err(FetchError::Unsupported(link.to_owned()));
        };
        self.cache.insert(link.to_owned(), content.clone());
        Ok(content)
    }

    async fn try_variants<T>(
        &mut self,
        path: &str,
        parse: impl Fn(&str) -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut attempts = vec![];
        for candidate in self.fallback_variants(path) {
            if self.failures(&candidate) >= MAX_FAILURES {
                attempts.push((candidate, FetchError::TooManyFailures));
                continue;
            }
            match self.download(&candidate).await.and_then(|text| parse(&text)) {
                Ok(value) => {
                    debug!("Loaded {candidate:?}");
                    return Ok(value);
                }
                Err(e) => {
                    *self.failures.entry(candidate.clone()).or_default() += 1;
                    debug!("Candidate {candidate:?} failed: {e}");
                    attempts.push((candidate, e));
                }
            }
        }
        Err(FetchError::Exhausted {
            resource: path.to_owned(),
            attempts,
        })
    }

    pub async fn fetch_text(&mut self, path: &str) -> Result<String, FetchError> {
        self.try_variants(path, |text| Ok(text.to_owned())).await
    }

    pub async fn fetch_json(&mut self, path: &str) -> Result<Value, FetchError> {
        self.try_variants(path, |text| Ok(serde_json::from_str(text)?))
            .await
    }

    /// `None` once every fallback variant has failed.
    pub async fn get_text(&mut self, path: &str) -> Option<String> {
        self.fetch_text(path)
            .await
            .map_err(|e| warn!("{e}"))
            .ok()
    }

    /// `None` once every fallback variant has failed.
    pub async fn get_json(&mut self, path: &str) -> Option<Value> {
        self.fetch_json(path)
            .await
            .map_err(|e| warn!("{e}"))
            .ok()
    }

    /// Loads the first candidate that yields JSON and memoizes it in `store` under `storage_key`.
    pub async fn load_first(
        &mut self,
        store: &mut dyn KeyValueStore,
        candidates: &[&str],
        storage_key: &str,
    ) -> anyhow::Result<Value> {
        let fetcher = &mut *self;
        get_or_insert_with(store, storage_key, move || async move {
            let mut errors = vec![];
            for &candidate in candidates {
                match fetcher.fetch_json(candidate).await {
                    Ok(value) => {
                        info!("Loaded {storage_key:?} from {candidate:?}");
                        return Ok(value);
                    }
                    Err(e) => errors.push(e.to_string()),
                }
            }
            bail!(
                "Could not load any of {candidates:?} for {storage_key:?}:\n{}",
                errors.join("\n")
            )
        })
        .await
    }
}

fn join(base: &str, path: &str) -> String {
    if base.is_empty() {
        path.to_owned()
    } else {
        format!("{base}/{path}")
    }
}

fn read_local(path: &Path) -> Result<String, FetchError> {
    match fs_err::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(FetchError::NotFound(path.display().to_string()))
        }
        Err(source) => Err(FetchError::Read {
            path: path.to_owned(),
            source,
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{cell::RefCell, collections::HashMap};

    use serde_json::json;

    use super::{FetchError, Fetcher, HttpGet, MAX_FAILURES};
    use crate::storage::MemoryStore;

    /// Serves canned bodies and records every requested URL.
    #[derive(Default)]
    pub struct MockHttp {
        pub bodies: HashMap<String, String>,
        pub calls: RefCell<Vec<String>>,
    }

    impl MockHttp {
        pub fn with(pairs: &[(&str, &str)]) -> Self {
            Self {
                bodies: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: RefCell::default(),
            }
        }

        pub fn calls_to(&self, url: &str) -> usize {
            self.calls.borrow().iter().filter(|u| *u == url).count()
        }
    }

    impl HttpGet for MockHttp {
        async fn get_text(&self, url: &str) -> Result<String, FetchError> {
            self.calls.borrow_mut().push(url.to_owned());
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(url.to_owned()))
        }
    }

    #[test]
    fn variants_for_relative_path() {
        let fetcher = Fetcher::<MockHttp>::local("/srv/site", None);
        assert_eq!(
            fetcher.fallback_variants("DADOS/x.json"),
            vec![
                "DADOS/x.json",
                "./DADOS/x.json",
                "../DADOS/x.json",
                "../../DADOS/x.json",
                "/srv/site/DADOS/x.json",
                "/srv/site/./DADOS/x.json",
                "/srv/site/../DADOS/x.json",
                "/srv/site/../../DADOS/x.json",
            ]
        );
        assert_eq!(
            fetcher.fallback_variants("https://radioid.net/static/rptrs.json"),
            vec!["https://radioid.net/static/rptrs.json"]
        );
        assert_eq!(
            fetcher.fallback_variants("/abs//x.json"),
            vec!["/abs/x.json", "/srv/site/abs/x.json"]
        );
    }

    #[tokio::test]
    async fn reads_local_file_and_caches_it() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rptrs.json"), r#"{"rptrs":[]}"#).unwrap();
        let mut fetcher = Fetcher::<MockHttp>::local(dir.path(), None);
        assert_eq!(
            fetcher.get_json("rptrs.json").await,
            Some(json!({"rptrs": []}))
        );
        let found = format!("{}/rptrs.json", dir.path().display());
        assert!(fetcher.is_cached(&found));
        std::fs::remove_file(dir.path().join("rptrs.json")).unwrap();
        // Served from the cache even though the file is gone.
        assert_eq!(
            fetcher.get_json("rptrs.json").await,
            Some(json!({"rptrs": []}))
        );
    }

    #[tokio::test]
    async fn failing_candidate_is_tried_at_most_twice() {
        let url = "https://example.org/missing.json";
        let mut fetcher = Fetcher::remote(MockHttp::default());
        for _ in 0..4 {
            assert_eq!(fetcher.get_json(url).await, None);
        }
        assert_eq!(fetcher.failures(url), MAX_FAILURES);
        assert_eq!(fetcher.http.as_ref().unwrap().calls_to(url), 2);
    }

    #[tokio::test]
    async fn first_successful_candidate_wins() {
        let http = MockHttp::with(&[
            ("https://a.example/x.json", "not json"),
            ("https://b.example/x.json", r#"{"ok":2}"#),
            ("https://c.example/x.json", r#"{"ok":3}"#),
        ]);
        let mut fetcher = Fetcher::local(tempfile::tempdir().unwrap().path(), Some(http));
        let mut store = MemoryStore::default();
        let value = fetcher
            .load_first(
                &mut store,
                &[
                    "missing.json",
                    "https://a.example/x.json",
                    "https://b.example/x.json",
                    "https://c.example/x.json",
                ],
                "key",
            )
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": 2}));
        let http = fetcher.http.as_ref().unwrap();
        assert_eq!(http.calls_to("https://c.example/x.json"), 0);

        // Memoized in the store: nothing is fetched again.
        let again = fetcher
            .load_first(&mut store, &["https://c.example/x.json"], "key")
            .await
            .unwrap();
        assert_eq!(again, json!({"ok": 2}));
        assert_eq!(fetcher.http.as_ref().unwrap().calls_to("https://c.example/x.json"), 0);
    }

    #[tokio::test]
    async fn exhausted_candidates_are_fatal() {
        let mut fetcher = Fetcher::remote(MockHttp::default());
        let mut store = MemoryStore::default();
        let err = fetcher
            .load_first(&mut store, &["https://x.example/a.json"], "k")
            .await
            .unwrap_err();
        assert!(format!("{err}").contains("https://x.example/a.json"), "{err}");
    }

    #[tokio::test]
    async fn relative_path_without_filesystem_is_unsupported() {
        let mut fetcher = Fetcher::remote(MockHttp::default());
        match fetcher.fetch_json("rptrs.json").await {
            Err(FetchError::Exhausted { attempts, .. }) => {
                assert!(attempts
                    .iter()
                    .all(|(_, e)| matches!(e, FetchError::Unsupported(_))));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
