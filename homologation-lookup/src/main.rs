use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use homologation_lookup::{
    fetch::{FetchOptions, FileTransport, HttpTransport, Transport},
    lookup::{Lookup, Outcome},
    render::render_html,
};
use url::Url;

#[derive(Parser)]
struct Opts {
    /// What follows the page URL, e.g. `?53500077722202544` or `?sumario0`.
    query: String,
    #[arg(long, default_value = "1")]
    retries: u32,
    #[arg(long, default_value = "10")]
    timeout_secs: u64,
    #[command(subcommand)]
    sub: Sub,
}

#[derive(Clone, Subcommand)]
enum Sub {
    /// Read the records from a directory that contains `DADOS/`.
    Local { root: PathBuf },
    /// Fetch the records from the site.
    Remote { base_url: Url },
}

async fn run<T: Transport>(transport: T, options: FetchOptions, query: &str) {
    match Lookup::new(transport, options).run(query).await {
        Outcome::Redirect(url) => println!("Redirect: {url}"),
        Outcome::Page(page) => print!("{}", render_html(&page)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let options = FetchOptions::builder()
        .retries(opts.retries)
        .timeout(Duration::from_secs(opts.timeout_secs))
        .build();
    match opts.sub {
        Sub::Local { root } => run(FileTransport::new(root), options, &opts.query).await,
        Sub::Remote { base_url } => {
            run(HttpTransport::new(base_url)?, options, &opts.query).await
        }
    }
    Ok(())
}
