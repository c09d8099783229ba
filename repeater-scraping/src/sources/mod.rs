use std::{collections::BTreeMap, future::Future, path::PathBuf};

use getset::{CopyGetters, Getters};
use log::info;

use crate::{
    fetch::{Fetcher, HttpGet},
    normalize::{CityResolver, Uf},
    paths::DataLayout,
    record::RepeaterRecord,
    save::{save, Format, Payload, SaveBuffer},
    storage::KeyValueStore,
};

pub mod labre_sp;
pub mod radioid;

pub use labre_sp::LabreSp;
pub use radioid::RadioId;

/// Everything a source needs during one run.
pub struct RunContext<'a, H> {
    pub fetcher: &'a mut Fetcher<H>,
    pub store: &'a mut dyn KeyValueStore,
    pub buffer: &'a mut SaveBuffer,
    pub layout: &'a DataLayout,
    pub cities: &'a dyn CityResolver,
}

/// A provider of repeater listings.
pub trait RepeaterSource {
    const NAME: &'static str;
    /// Inserted into per-state file names: `sp.<SUFFIX>.json`.
    const SUFFIX: &'static str;
    /// Key of the raw payload in the [`KeyValueStore`].
    const STORAGE_KEY: &'static str;
    /// File under `repetidoras/` with every record of a run.
    const AGGREGATE_CSV: &'static str;

    /// Fetches, normalizes and stages the records of this source.
    fn run<H: HttpGet>(
        &self,
        ctx: &mut RunContext<'_, H>,
    ) -> impl Future<Output = anyhow::Result<RunResult>>;
}

#[derive(Default, Debug, Getters, CopyGetters)]
pub struct RunResult {
    #[getset(get_copy = "pub")]
    total_states: usize,
    #[getset(get_copy = "pub")]
    total_records: usize,
    #[getset(get_copy = "pub")]
    original_records: usize,
    #[getset(get = "pub")]
    generated_files: Vec<PathBuf>,
    #[getset(get = "pub")]
    processed_states: Vec<Uf>,
    #[getset(get = "pub")]
    contents: BTreeMap<Uf, Vec<RepeaterRecord>>,
}

impl RunResult {
    fn new(original_records: usize) -> Self {
        Self {
            original_records,
            ..Default::default()
        }
    }

    fn add_state(&mut self, uf: Uf, records: Vec<RepeaterRecord>, file: PathBuf) {
        info!("State {uf}: {} records", records.len());
        self.total_states += 1;
        self.total_records += records.len();
        self.generated_files.push(file);
        self.processed_states.push(uf);
        self.contents.insert(uf, records);
    }

    pub fn by_state(&self) -> BTreeMap<String, Vec<RepeaterRecord>> {
        self.contents
            .iter()
            .map(|(uf, records)| (uf.to_string(), records.clone()))
            .collect()
    }
}

/// Runs `source` and writes its aggregate CSV.
pub async fn run_and_export<S: RepeaterSource, H: HttpGet>(
    source: &S,
    ctx: &mut RunContext<'_, H>,
) -> anyhow::Result<RunResult> {
    info!("Running {}", S::NAME);
    let result = source.run(ctx).await?;
    info!(
        "{}: {} states, {} records (original: {})",
        S::NAME,
        result.total_states(),
        result.total_records(),
        result.original_records(),
    );
    let path = save(
        Payload::ByState(result.by_state()),
        &ctx.layout.repeaters().join(S::AGGREGATE_CSV),
        Format::Csv,
        None,
    )?;
    info!("Wrote {path:?}");
    Ok(result)
}
