use anyhow::{Context, Result};
use chrono::Local;
use crmscraper::{
    batch,
    config::{Config, DEFAULT_CONFIG_FILE},
    fetch,
};
use tokio::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) load config ──────────────────────────────────────────────
    let config = Config::load_or_default(DEFAULT_CONFIG_FILE)
        .with_context(|| format!("loading {}", DEFAULT_CONFIG_FILE))?;
    info!(output_dir = %config.output_dir.display(), "config loaded");

    // ─── 3) connect ──────────────────────────────────────────────────
    let extractor = fetch::connect(&config)
        .await
        .context("connecting to Salesforce")?;

    // ─── 4) extract, transform, export ───────────────────────────────
    let start = Instant::now();
    let run_date = Local::now().date_naive();
    let result = batch::run_batch(&extractor, &config, run_date).await;

    // ─── 5) release the session whatever happened ────────────────────
    extractor.into_session().close().await;

    match result {
        Ok(summary) => {
            for f in &summary.files {
                info!(path = %f.display(), "exported");
            }
            info!(elapsed = ?start.elapsed(), "all done");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "batch failed");
            Err(e).context("running batch")
        }
    }
}
