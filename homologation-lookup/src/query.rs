use repeater_scraping_utils::regex;

/// Characters of the index keys: the first 17 word characters of an id.
pub const INDEX_KEY_LEN: usize = 17;

/// The parts of `?<id>[/<destination>[/<index>]]`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParsedQuery {
    segments: Vec<String>,
}

impl ParsedQuery {
    /// `None` when there is nothing after the last `?`.
    pub fn parse(search: &str) -> Option<Self> {
        let query = search.rsplit('?').next().unwrap_or_default();
        let segments = query
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>();
        (!segments.is_empty()).then_some(Self { segments })
    }

    pub fn id(&self) -> &str {
        &self.segments[0]
    }

    /// Only what survives [`format_cid`] may appear in a record id.
    pub fn has_valid_id(&self) -> bool {
        regex!(r"^[A-Za-z0-9.\-]+$").is_match(self.id())
    }

    pub fn cid(&self) -> String {
        format_cid(self.id())
    }

    pub fn destination(&self) -> Option<String> {
        self.segments.get(1).map(|s| s.to_lowercase())
    }

    /// The nested-pair index; 0 when absent, `None` when not a number.
    pub fn index(&self) -> Option<usize> {
        match self.segments.get(2) {
            None => Some(0),
            Some(s) => regex!(r"^\d+").find(s)?.as_str().parse().ok(),
        }
    }

    /// The page number of a `sumario<N>` query.
    pub fn summary_page(&self) -> Option<i64> {
        let captures = regex!(r"(?i)^sumario(\d+)$").captures(self.id())?;
        captures[1].parse().ok()
    }
}

/// `53500.077722/2025-44uvk6` becomes `53500-077722-2025-44-uvk6`.  Ids of
/// other shapes are only stripped of punctuation.
pub fn format_cid(id: &str) -> String {
    let stripped = id
        .trim()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>();
    match regex!(r"^(\d{5})(\d{6})(\d{4})(\d{2})([A-Za-z0-9]+)?$").captures(&stripped) {
        Some(c) => {
            let mut formatted = format!("{}-{}-{}-{}", &c[1], &c[2], &c[3], &c[4]);
            if let Some(rest) = c.get(5) {
                formatted.push('-');
                formatted.push_str(rest.as_str());
            }
            formatted
        }
        None => stripped,
    }
}

/// The id part of a record URL: `DADOS/homologacoes/x-y.json?t=..` gives `x-y`.
pub fn id_from_url(url: &str) -> &str {
    let url = url.split("?t=").next().unwrap_or_default();
    let url = url.split(".json").next().unwrap_or_default();
    let url = url.rsplit('?').next().unwrap_or_default();
    url.rsplit('/').next().unwrap_or_default().trim()
}

/// The key under which `id` appears in the id index.
pub fn index_key(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(INDEX_KEY_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{format_cid, id_from_url, index_key, ParsedQuery};

    #[test]
    fn empty_queries() {
        assert_eq!(ParsedQuery::parse("?"), None);
        assert_eq!(ParsedQuery::parse(""), None);
        assert_eq!(ParsedQuery::parse("?/ / "), None);
    }

    #[test]
    fn segments() {
        let q = ParsedQuery::parse("/?53500.077722/2025-44/ R /2").unwrap();
        // The last `?` starts the query, so the path before it is ignored.
        assert_eq!(q.id(), "53500.077722");
        let q = ParsedQuery::parse("?5350007772220254 4/R/2x").unwrap();
        assert_eq!(q.id(), "5350007772220254 4");
        assert!(!q.has_valid_id());
        assert_eq!(q.destination().as_deref(), Some("r"));
        assert_eq!(q.index(), Some(2));

        let q = ParsedQuery::parse("?53500.077722.2025-44/v/x").unwrap();
        assert!(q.has_valid_id());
        assert_eq!(q.cid(), "53500-077722-2025-44");
        assert_eq!(q.index(), None);
        assert_eq!(ParsedQuery::parse("?a/b").unwrap().index(), Some(0));
    }

    #[test]
    fn summary_pages() {
        assert_eq!(ParsedQuery::parse("?sumario3").unwrap().summary_page(), Some(3));
        assert_eq!(ParsedQuery::parse("?sumario").unwrap().summary_page(), None);
        assert_eq!(ParsedQuery::parse("?abc").unwrap().summary_page(), None);
    }

    #[test]
    fn cid_formatting() {
        assert_eq!(format_cid("53500077722202544"), "53500-077722-2025-44");
        assert_eq!(format_cid("53500.077722/2025-44uvk6"), "53500-077722-2025-44-uvk6");
        assert_eq!(format_cid(" 1234 "), "1234");
        assert_eq!(format_cid("sumario0"), "sumario0");
    }

    #[test]
    fn ids_from_urls() {
        assert_eq!(
            id_from_url("DADOS/homologacoes/53500-077722-2025-44-x.json?t=abc"),
            "53500-077722-2025-44-x"
        );
        assert_eq!(id_from_url("/?12345678901234567"), "12345678901234567");
        assert_eq!(index_key("53500-077722-2025-44-x"), "53500077722202544");
        assert_eq!(index_key("ab-c"), "abc");
    }
}
