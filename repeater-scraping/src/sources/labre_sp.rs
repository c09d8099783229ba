//! The repeater table published by LABRE-SP.

use anyhow::Context;
use typed_builder::TypedBuilder;

use super::{RepeaterSource, RunContext, RunResult};
use crate::{
    fetch::HttpGet,
    normalize::{CityResolver, Uf},
    record::RepeaterRecord,
    storage::get_or_insert_with,
    table::extract_records,
};

pub const LABRE_SP_URL: &str = "https://www.labre-sp.org.br/diversos.php?xid=48";

#[derive(Clone, Debug, TypedBuilder)]
pub struct LabreSp {
    #[builder(default = LABRE_SP_URL.to_owned(), setter(into))]
    pub url: String,
}

impl Default for LabreSp {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Every table on this site lists São Paulo repeaters.
pub fn records_from_html(html: &str, cities: &dyn CityResolver) -> Vec<RepeaterRecord> {
    extract_records(html, Uf::SP, cities)
}

impl RepeaterSource for LabreSp {
    const NAME: &'static str = "labre-sp";
    const SUFFIX: &'static str = "labresp";
    const STORAGE_KEY: &'static str = "labre.sp";
    const AGGREGATE_CSV: &'static str = "labre-sp.csv";

    async fn run<H: HttpGet>(&self, ctx: &mut RunContext<'_, H>) -> anyhow::Result<RunResult> {
        let fetcher = &mut *ctx.fetcher;
        let url = self.url.as_str();
        let html: String = get_or_insert_with(&mut *ctx.store, Self::STORAGE_KEY, move || async move {
            fetcher
                .fetch_text(url)
                .await
                .with_context(|| format!("While downloading {url}"))
        })
        .await?;

        let records = records_from_html(&html, ctx.cities);
        let mut result = RunResult::new(records.len());
        let path = ctx.layout.state_file("", Some(Uf::SP), Self::SUFFIX);
        let path = ctx.buffer.stage_records(path, Some(Uf::SP), &records)?;
        result.add_state(Uf::SP, records, path);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::LabreSp;
    use crate::{
        fetch::{tests::MockHttp, Fetcher},
        normalize::{CityIndex, Uf},
        paths::DataLayout,
        save::SaveBuffer,
        sources::{RepeaterSource, RunContext},
        storage::{KeyValueStore, MemoryStore},
    };

    const PAGE: &str = "<table>\
        <tr><td>Indicativo</td><td>Freq.TX</td><td>Off-Set</td><td>Tone</td><td>Cidade</td></tr>\
        <tr><td>PY2KPE</td><td>146.730</td><td>146.130</td><td>77.0</td><td>Jundiaí - SP</td></tr>\
        <tr><td>PY2KPF</td><td>439.850</td><td>434.850</td><td></td><td>Jundiaí</td></tr>\
        </table>";

    #[tokio::test]
    async fn scrapes_and_stages() {
        let source = LabreSp::default();
        let mut fetcher = Fetcher::remote(MockHttp::with(&[(source.url.as_str(), PAGE)]));
        let mut store = MemoryStore::default();
        let mut buffer = SaveBuffer::default();
        let layout = DataLayout::new("site");
        let cities = CityIndex::default();
        let mut ctx = RunContext {
            fetcher: &mut fetcher,
            store: &mut store,
            buffer: &mut buffer,
            layout: &layout,
            cities: &cities,
        };
        let result = source.run(&mut ctx).await.unwrap();
        assert_eq!(result.total_records(), 2);
        let records = &result.contents()[&Uf::SP];
        assert_eq!(records[0].offset, -0.6);
        assert_eq!(records[1].tone.as_ref().unwrap().to_string(), "0.00");
        assert_eq!(records[1].location.city, "Jundiaí");
        assert!(store.get("labre.sp").is_some());
        assert_eq!(
            result.generated_files(),
            &[layout.state_file("", Some(Uf::SP), "labresp")]
        );
    }

    #[tokio::test]
    async fn download_failure_is_an_error() {
        let source = LabreSp::default();
        let mut fetcher = Fetcher::remote(MockHttp::default());
        let mut store = MemoryStore::default();
        let mut buffer = SaveBuffer::default();
        let layout = DataLayout::new("site");
        let cities = CityIndex::default();
        let mut ctx = RunContext {
            fetcher: &mut fetcher,
            store: &mut store,
            buffer: &mut buffer,
            layout: &layout,
            cities: &cities,
        };
        assert!(source.run(&mut ctx).await.is_err());
        assert!(buffer.is_empty());
    }
}
