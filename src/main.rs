//! pdf-preview
//!
//! Renders a preview PNG for every page of a PDF.
//!
//! Usage: `pdf-preview <input.pdf> [output-dir] [password]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdf_preview::engine::MupdfEngine;
use pdf_preview::{Document, PreviewConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "pdf_preview=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = PreviewConfig::from_env().context("invalid PREVIEW_* configuration")?;

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next().map(PathBuf::from) else {
        bail!("usage: pdf-preview <input.pdf> [output-dir] [password]");
    };
    let output_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("previews"));
    let password = args.next();

    let doc = Document::open(
        Arc::new(MupdfEngine::new()),
        &input,
        password.as_deref(),
        config,
    )
    .await
    .with_context(|| format!("cannot open {}", input.display()))?;

    if let Some(report) = doc.wait_for_prefetch().await {
        tracing::info!(
            "Prefetch finished: {} rendered, {} unavailable",
            report.rendered,
            report.skipped
        );
    }

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("cannot create {}", output_dir.display()))?;

    let images = doc.all_page_images().await;
    for image in &images {
        let path = output_dir.join(format!("{}-{:04}.png", doc.file_identity(), image.page_index()));
        image
            .save_png(&path)
            .with_context(|| format!("cannot write {}", path.display()))?;
    }

    tracing::info!(
        "Wrote {} of {} pages to {}",
        images.len(),
        doc.page_count(),
        output_dir.display()
    );
    println!("{}", serde_json::to_string_pretty(&doc.info())?);

    Ok(())
}
