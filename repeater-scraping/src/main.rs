use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::info;
use repeater_scraping::{
    config::Config,
    fetch::{Fetcher, ReqwestGet},
    normalize::CityIndex,
    paths::DataLayout,
    save::SaveBuffer,
    sources::{run_and_export, RunContext},
    storage::{FileStore, KeyValueStore, MemoryStore},
};

#[derive(Parser)]
struct Opts {
    #[arg(value_enum, default_value = "all")]
    source: Source,
    #[arg(long)]
    config_path: Option<PathBuf>,
    /// Overrides `data_root` of the config file.
    #[arg(long)]
    data_root: Option<PathBuf>,
    /// Only read local files.
    #[arg(long)]
    offline: bool,
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum Source {
    All,
    Radioid,
    LabreSp,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let opts = Opts::parse();
    let mut config = opts
        .config_path
        .map(Config::load)
        .transpose()?
        .unwrap_or_default();
    if let Some(data_root) = opts.data_root {
        config.data_root = data_root;
    }

    let layout = DataLayout::new(&config.data_root);
    let cities = match &config.cities_path {
        Some(path) => CityIndex::load(path)?,
        None => CityIndex::default(),
    };
    info!("{} canonical city names loaded", cities.len());
    let mut store: Box<dyn KeyValueStore> = match &config.storage_path {
        Some(path) => Box::new(FileStore::open(path)?),
        None => Box::new(MemoryStore::default()),
    };
    let http = (!opts.offline)
        .then(|| ReqwestGet::new(config.timeout()))
        .transpose()?;
    let mut fetcher = Fetcher::local(layout.root(), http);
    let mut buffer = SaveBuffer::default();

    let mut ctx = RunContext {
        fetcher: &mut fetcher,
        store: store.as_mut(),
        buffer: &mut buffer,
        layout: &layout,
        cities: &cities,
    };
    if matches!(opts.source, Source::All | Source::Radioid) {
        run_and_export(&config.radioid(), &mut ctx).await?;
    }
    if matches!(opts.source, Source::All | Source::LabreSp) {
        run_and_export(&config.labre_sp(), &mut ctx).await?;
    }

    for path in buffer.flush()? {
        info!("Wrote {path:?}");
    }
    Ok(())
}
