use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use flagfinder_resolver::{
    commons_file_page, ClientConfig, CommonsClient, FlagResolver, ResolveError, COUNTRIES,
};
use flagfinder_store::{default_cache_dir, FlagStore, StoreConfig};
use tracing_subscriber::EnvFilter;

/// Fetch a country's flag from Wikimedia Commons.
#[derive(Parser)]
#[command(name = "flagfinder", version, about)]
struct Cli {
    /// Country whose flag to fetch, e.g. "France"
    country: Option<String>,

    /// Where to write the PNG (defaults to <country>.png)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Cache directory (defaults to the platform data directory)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Print the built-in country list and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list {
        for country in COUNTRIES {
            println!("{country}");
        }
        return Ok(());
    }

    let Some(country) = cli.country else {
        bail!("no country given; try `flagfinder France` or `flagfinder --list`");
    };
    if !flagfinder_resolver::is_known(&country) {
        tracing::warn!(country, "not in the built-in country list, trying anyway");
    }

    let cache_dir = match cli.cache_dir {
        Some(dir) => dir,
        None => default_cache_dir().context("could not determine the platform data directory")?,
    };

    let resolver = FlagResolver::new(
        FlagStore::new(StoreConfig::new(cache_dir)),
        CommonsClient::new(ClientConfig::default()),
    );

    let flag = match resolver.resolve(&country).await {
        Ok(flag) => flag,
        // The fetch succeeded, so save the image anyway and say why the
        // cache did not take it.
        Err(ResolveError::StorageFailure { flag, source }) => {
            eprintln!("warning: flag fetched but caching failed: {source}");
            flag
        }
        Err(e) => bail!(user_message(&e)),
    };

    let out = cli
        .out
        .unwrap_or_else(|| PathBuf::from(format!("{country}.png")));
    tokio::fs::write(&out, &flag.image)
        .await
        .with_context(|| format!("could not write {}", out.display()))?;

    println!("saved {} ({} bytes)", out.display(), flag.image.len());
    println!("source: {}", commons_file_page(&flag.attribution));
    Ok(())
}

/// One distinct, actionable message per failure kind.
fn user_message(err: &ResolveError) -> String {
    match err {
        ResolveError::MetadataTimeout => {
            "flag lookup timed out; Wikimedia Commons may be slow, try again".to_string()
        }
        ResolveError::MetadataTransport(e) => {
            format!("could not reach Wikimedia Commons: {e}")
        }
        ResolveError::MetadataHttp { status, reason } => {
            format!("Wikimedia Commons rejected the lookup: {status} {reason}")
        }
        ResolveError::MetadataMalformed { country } => {
            format!("no flag found for {country:?}; check the spelling or run --list")
        }
        ResolveError::ImageTimeout => "flag download timed out; try again".to_string(),
        ResolveError::ImageTransport(e) => {
            format!("could not reach the image host: {e}")
        }
        ResolveError::ImageHttp { status, reason } => {
            format!("image host rejected the download: {status} {reason}")
        }
        ResolveError::StorageFailure { source, .. } => {
            format!("flag fetched but caching failed: {source}")
        }
    }
}
