use std::path::PathBuf;

use clap::Parser;
use log::info;
use repeater_scraping::chirp::export_file;

#[derive(Parser)]
struct Opts {
    /// A per-state repeater file, e.g. `DADOS/repetidoras/uf/sp/sp.labresp.json`.
    input: PathBuf,
    /// Defaults to the input path with a `.chirp.csv` extension.
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let output = opts
        .output
        .unwrap_or_else(|| opts.input.with_extension("chirp.csv"));
    let count = export_file(opts.input, output.clone())?;
    info!("Wrote {count} memories to {output:?}");
    Ok(())
}
