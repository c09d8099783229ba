use std::path::PathBuf;

use clap::Parser;
use repeater_scraping::{paths::DataLayout, summary::build_summary};

#[derive(Parser)]
struct Opts {
    /// Directory that contains `DADOS/`.
    #[arg(default_value = ".")]
    data_root: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let dir = DataLayout::new(opts.data_root).homologations();
    let report = build_summary(&dir)?;
    println!(
        "{} pages, {} items, {} stale pages removed",
        report.pages(),
        report.items(),
        report.removed().len()
    );
    Ok(())
}
