//! Fetching with per-URL retries, a timeout, fallback candidates and a content cache.

use std::{
    collections::HashMap,
    fmt::{self, Debug},
    future::Future,
    io,
    path::PathBuf,
    time::Duration,
};

use derive_more::From;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use typed_builder::TypedBuilder;
use url::Url;

/// What a [`Transport`] got back from the other side.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A failure without any status code.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

pub trait Transport {
    fn get(&self, url: &str) -> impl Future<Output = Result<Response, TransportError>>;
}

/// HTTP relative to a base URL.
pub struct HttpTransport {
    base: Url,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base: Url) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base, client })
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Response, TransportError> {
        let url = self
            .base
            .join(url)
            .map_err(|e| TransportError(format!("Invalid URL {url:?}: {e}")))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Response { status, body })
    }
}

/// Serves the files under `root`, like a static web server would.
pub struct FileTransport {
    root: PathBuf,
}

impl FileTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Transport for FileTransport {
    async fn get(&self, url: &str) -> Result<Response, TransportError> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let path = self.root.join(path.trim_start_matches('/'));
        let response = |status, body| Ok(Response { status, body });
        match fs_err::read_to_string(&path) {
            Ok(body) => response(200, body),
            Err(e) if e.kind() == io::ErrorKind::NotFound => response(404, String::new()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => response(403, String::new()),
            Err(e) => Err(TransportError(e.to_string())),
        }
    }
}

#[derive(Clone, Debug, Serialize, TypedBuilder)]
pub struct FetchOptions {
    /// Extra attempts of the same URL after a temporary failure.
    #[builder(default = 1)]
    pub retries: u32,
    #[builder(default = Duration::from_secs(10))]
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResponseMode {
    Json,
    Text,
}

#[derive(Clone, PartialEq, Debug, From)]
pub enum Body {
    Json(Value),
    Text(String),
}

pub type Resolver<'a> = Box<dyn FnMut(Option<&str>) -> anyhow::Result<Option<String>> + 'a>;

/// Where to look for a resource.  A deferred candidate computes its URL from
/// the previously tried one; `None` ends the search.
pub enum Candidate<'a> {
    Url(String),
    Deferred(Resolver<'a>),
}

impl Candidate<'_> {
    pub fn url(url: impl Into<String>) -> Self {
        Candidate::Url(url.into())
    }
}

impl Debug for Candidate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Candidate::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("Timed out")]
    Timeout,
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AttemptError {
    /// Whether trying the same URL again may help.
    fn is_temporary(&self) -> bool {
        match self {
            AttemptError::Timeout | AttemptError::Transport(_) => true,
            &AttemptError::Status(status) => status >= 500 || status == 429,
            AttemptError::Json(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CachedFetchError {
    #[error("All URLs failed.  Last error: {last_error}\n{urls:#?}")]
    AllFailed { last_error: String, urls: Vec<String> },
    #[error("A deferred candidate gave no URL: end of the candidates")]
    EndOfCandidates,
    #[error("A deferred candidate failed: {0:#}")]
    Resolver(anyhow::Error),
}

pub struct CachedFetch<T> {
    transport: T,
    cache: HashMap<String, Body>,
}

fn cache_key(url: &str, options: &FetchOptions, mode: ResponseMode) -> String {
    let options = serde_json::to_string(options).unwrap_or_default();
    format!("{url}-{options}-{mode:?}")
}

impl<T: Transport> CachedFetch<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            cache: HashMap::new(),
        }
    }

    async fn attempt(
        &self,
        url: &str,
        options: &FetchOptions,
        mode: ResponseMode,
    ) -> Result<Body, AttemptError> {
        let response = tokio::time::timeout(options.timeout, self.transport.get(url))
            .await
            .map_err(|_| AttemptError::Timeout)??;
        if !response.ok() {
            return Err(AttemptError::Status(response.status));
        }
        Ok(match mode {
            ResponseMode::Json => Body::Json(serde_json::from_str(&response.body)?),
            ResponseMode::Text => Body::Text(response.body),
        })
    }

    /// Tries the candidates in order, each up to `1 + options.retries` times
    /// while its failures are temporary, and returns the first success.
    pub async fn fetch(
        &mut self,
        candidates: Vec<Candidate<'_>>,
        options: &FetchOptions,
        mode: ResponseMode,
    ) -> Result<Body, CachedFetchError> {
        let mut last_url: Option<String> = None;
        let mut last_error = String::new();
        let mut tried = vec![];

        for candidate in candidates {
            let url = match candidate {
                Candidate::Url(url) => url,
                Candidate::Deferred(mut resolve) => {
                    match resolve(last_url.as_deref()).map_err(CachedFetchError::Resolver)? {
                        Some(url) => url,
                        None => return Err(CachedFetchError::EndOfCandidates),
                    }
                }
            };
            tried.push(url.clone());
            last_url = Some(url.clone());

            let key = cache_key(&url, options, mode);
            if let Some(body) = self.cache.get(&key) {
                debug!("Cache hit for {url:?}");
                return Ok(body.clone());
            }

            for attempt in 0..=options.retries {
                match self.attempt(&url, options, mode).await {
                    Ok(body) => {
                        self.cache.insert(key, body.clone());
                        return Ok(body);
                    }
                    Err(e) => {
                        debug!("Attempt {attempt} of {url:?} failed: {e}");
                        last_error = e.to_string();
                        if !e.is_temporary() {
                            break;
                        }
                    }
                }
            }
            info!("Falling back from {url:?}");
        }
        warn!("Every candidate failed: {tried:?}");
        Err(CachedFetchError::AllFailed {
            last_error,
            urls: tried,
        })
    }

    pub async fn json(
        &mut self,
        candidates: Vec<Candidate<'_>>,
        options: &FetchOptions,
    ) -> Result<Value, CachedFetchError> {
        match self.fetch(candidates, options, ResponseMode::Json).await? {
            Body::Json(value) => Ok(value),
            Body::Text(text) => Ok(Value::String(text)),
        }
    }

    pub async fn text(
        &mut self,
        candidates: Vec<Candidate<'_>>,
        options: &FetchOptions,
    ) -> Result<String, CachedFetchError> {
        match self.fetch(candidates, options, ResponseMode::Text).await? {
            Body::Text(text) => Ok(text),
            Body::Json(value) => Ok(value.to_string()),
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Forgets the given URLs; returns how many were cached.
    pub fn delete(&mut self, urls: &[&str], options: &FetchOptions, mode: ResponseMode) -> usize {
        urls.iter()
            .filter(|url| self.cache.remove(&cache_key(url, options, mode)).is_some())
            .count()
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_keys(&self) -> Vec<String> {
        self.cache.keys().cloned().collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        cell::RefCell,
        collections::{HashMap, VecDeque},
        time::Duration,
    };

    use serde_json::json;

    use super::{
        Body, CachedFetch, CachedFetchError, Candidate, FetchOptions, FileTransport, Response,
        ResponseMode, Transport, TransportError,
    };

    /// Plays back scripted responses per URL; unknown URLs are 404.
    #[derive(Default)]
    pub struct ScriptedTransport {
        pub script: RefCell<HashMap<String, VecDeque<Result<Response, TransportError>>>>,
        pub fixed: HashMap<String, String>,
        pub log: RefCell<Vec<String>>,
    }

    impl ScriptedTransport {
        pub fn serving(files: &[(&str, &str)]) -> Self {
            Self {
                fixed: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..Default::default()
            }
        }

        pub fn push(&self, url: &str, response: Result<Response, TransportError>) {
            self.script
                .borrow_mut()
                .entry(url.to_owned())
                .or_default()
                .push_back(response);
        }

        pub fn hits(&self, url: &str) -> usize {
            self.log.borrow().iter().filter(|u| *u == url).count()
        }
    }

    impl Transport for ScriptedTransport {
        async fn get(&self, url: &str) -> Result<Response, TransportError> {
            self.log.borrow_mut().push(url.to_owned());
            let path = url.split('?').next().unwrap_or_default();
            if let Some(next) = self
                .script
                .borrow_mut()
                .get_mut(url)
                .and_then(VecDeque::pop_front)
            {
                return next;
            }
            Ok(match self.fixed.get(path) {
                Some(body) => Response {
                    status: 200,
                    body: body.clone(),
                },
                None => Response {
                    status: 404,
                    body: String::new(),
                },
            })
        }
    }

    fn status(status: u16) -> Result<Response, TransportError> {
        Ok(Response {
            status,
            body: String::new(),
        })
    }

    #[tokio::test]
    async fn retries_temporary_failures_once() {
        let transport = ScriptedTransport::serving(&[("a", "1")]);
        transport.push("a", status(503));
        let mut fetch = CachedFetch::new(transport);
        let value = fetch
            .json(vec![Candidate::url("a")], &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(value, json!(1));
        assert_eq!(fetch.transport.hits("a"), 2);

        // Cached: no further request.
        fetch
            .json(vec![Candidate::url("a")], &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(fetch.transport.hits("a"), 2);
        assert_eq!(fetch.cache_size(), 1);
    }

    #[tokio::test]
    async fn permanent_failures_move_on() {
        let transport = ScriptedTransport::serving(&[("b", "\"B\"")]);
        transport.push("a", status(404));
        transport.push("c", status(429));
        transport.push("c", Err(TransportError("reset".to_owned())));
        let mut fetch = CachedFetch::new(transport);
        let value = fetch
            .json(
                vec![Candidate::url("a"), Candidate::url("c"), Candidate::url("b")],
                &FetchOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value, json!("B"));
        assert_eq!(fetch.transport.hits("a"), 1);
        assert_eq!(fetch.transport.hits("c"), 2);
    }

    #[tokio::test]
    async fn all_failed_reports_urls() {
        let mut fetch = CachedFetch::new(ScriptedTransport::default());
        let err = fetch
            .text(
                vec![Candidate::url("x"), Candidate::url("y")],
                &FetchOptions::builder().retries(3).build(),
            )
            .await
            .unwrap_err();
        match err {
            CachedFetchError::AllFailed { last_error, urls } => {
                assert_eq!(last_error, "HTTP 404");
                assert_eq!(urls, ["x", "y"]);
            }
            e => panic!("unexpected {e:?}"),
        }
        assert_eq!(fetch.transport.hits("x"), 1);
    }

    #[tokio::test]
    async fn deferred_candidates_see_the_previous_url() {
        let transport = ScriptedTransport::serving(&[("second", "2")]);
        let mut fetch = CachedFetch::new(transport);
        let mut seen = vec![];
        let value = fetch
            .json(
                vec![
                    Candidate::url("first"),
                    Candidate::Deferred(Box::new(|prev| {
                        seen.push(prev.map(str::to_owned));
                        Ok(Some("second".to_owned()))
                    })),
                ],
                &FetchOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value, json!(2));
        assert_eq!(seen, [Some("first".to_owned())]);

        let err = fetch
            .json(
                vec![
                    Candidate::url("first"),
                    Candidate::Deferred(Box::new(|_| Ok(None))),
                    Candidate::url("second"),
                ],
                &FetchOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CachedFetchError::EndOfCandidates));

        let err = fetch
            .json(
                vec![Candidate::Deferred(Box::new(|_| anyhow::bail!("no index")))],
                &FetchOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CachedFetchError::Resolver(_)));
    }

    struct Slow;
    impl Transport for Slow {
        async fn get(&self, _: &str) -> Result<Response, TransportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            status(200)
        }
    }

    #[tokio::test]
    async fn timeouts_are_temporary() {
        let mut fetch = CachedFetch::new(Slow);
        let err = fetch
            .text(
                vec![Candidate::url("z")],
                &FetchOptions::builder().timeout(Duration::from_millis(10)).build(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Timed out"));
    }

    #[tokio::test]
    async fn cache_utilities() {
        let transport = ScriptedTransport::serving(&[("a", "1"), ("b", "2")]);
        let mut fetch = CachedFetch::new(transport);
        let options = FetchOptions::default();
        for url in ["a", "b"] {
            fetch.json(vec![Candidate::url(url)], &options).await.unwrap();
        }
        fetch.text(vec![Candidate::url("a")], &options).await.unwrap();
        assert_eq!(fetch.cache_size(), 3);
        assert!(fetch.cache_keys().iter().any(|k| k.starts_with("a-") && k.ends_with("Text")));
        assert_eq!(fetch.delete(&["a", "zzz"], &options, ResponseMode::Json), 1);
        assert_eq!(fetch.cache_size(), 2);
        fetch.clear_cache();
        assert_eq!(fetch.cache_size(), 0);
        assert_eq!(Body::from(json!(1)), Body::Json(json!(1)));
    }

    #[tokio::test]
    async fn file_transport_strips_query() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::create_dir_all(dir.path().join("DADOS")).unwrap();
        fs_err::write(dir.path().join("DADOS/x.json"), "{}").unwrap();
        let transport = FileTransport::new(dir.path());
        let found = transport.get("/DADOS/x.json?t=abc").await.unwrap();
        assert_eq!((found.status, found.body.as_str()), (200, "{}"));
        assert_eq!(transport.get("DADOS/y.json").await.unwrap().status, 404);
    }
}
