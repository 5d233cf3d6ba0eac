use anyhow::{Context, Result};
use captionpipe_http::{router, AppState};
use captionpipe_local::{CaptionResolver, InnertubeSource, YtDlpScraper};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "captionpipe")]
#[command(about = "YouTube caption extraction service", long_about = None)]
struct Cli {
    /// Address to bind on.
    #[arg(long, env = "CAPTIONPIPE_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on.
    #[arg(long, env = "CAPTIONPIPE_PORT", default_value_t = 8000)]
    port: u16,
    /// Language assumed when a request omits `language`. `auto` requests
    /// still probe the video's own language first.
    #[arg(long, env = "CAPTIONPIPE_DEFAULT_LANGUAGE", default_value = "ru")]
    default_language: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // One process-wide logging init; level comes from RUST_LOG.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let client = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .context("could not build HTTP client")?;

    let source = Arc::new(InnertubeSource::new(client));
    let scraper = Arc::new(YtDlpScraper::new());
    let resolver = Arc::new(
        CaptionResolver::new(source.clone(), scraper)
            .with_default_language(cli.default_language.as_str()),
    );

    let state = AppState {
        resolver,
        source,
        default_language: cli.default_language.clone(),
    };

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    log::info!("captionpipe listening on http://{addr}");

    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}
