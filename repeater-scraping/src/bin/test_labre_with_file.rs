use std::path::PathBuf;

use clap::Parser;
use repeater_scraping::{
    normalize::CityIndex, record::RepeaterRecord, sources::labre_sp::records_from_html,
};

#[derive(Parser)]
struct Opts {
    input_file: PathBuf,
    #[arg(long)]
    cities_path: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opts = Opts::parse();
    let html = fs_err::read_to_string(opts.input_file)?;
    let cities = match opts.cities_path {
        Some(path) => CityIndex::load(path)?,
        None => CityIndex::default(),
    };

    let result = records_from_html(&html, &cities);
    let serialized = serde_json::to_string_pretty(&result)?;
    println!("{}", &serialized);
    let deserialized: Vec<RepeaterRecord> = serde_json::from_str(&serialized)?;
    assert_eq!(result, deserialized);
    eprintln!("{} records", result.len());

    Ok(())
}
