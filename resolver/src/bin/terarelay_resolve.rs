/// Terarelay one-shot resolver.
///
/// Runs the resolution pipeline once for a single share link and prints
/// the chosen media URL. Useful for checking a site variant against the
/// current configuration without starting the bot.
use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::info;

use terarelay_resolver::{LinkMatcher, ResolutionPipeline};
use terarelay_shared::config::ExtractionConfig;
use terarelay_shared::models::{HeaderProfile, ResolveOptions};

#[derive(Parser, Debug)]
#[command(name = "terarelay-resolve", version, about = "Resolve a share link to a direct media URL")]
struct Args {
    /// Share link to resolve
    url: String,

    /// Request pages with the mobile header profile
    #[arg(long)]
    mobile: bool,

    /// Download the selected media into DOWNLOAD_DIR and keep it
    #[arg(long)]
    download: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("terarelay_resolver=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = ExtractionConfig::from_env().context("Invalid extraction configuration")?;

    let matcher = LinkMatcher::new(&config.domains)?;
    let link = matcher
        .first_link(&args.url)
        .ok_or_else(|| anyhow!("{} does not point at a configured domain", args.url))?;

    let options = ResolveOptions {
        profile: if args.mobile {
            HeaderProfile::Mobile
        } else {
            config.default_profile
        },
        download: args.download,
    };

    let pipeline = ResolutionPipeline::from_config(&config)?;
    info!("Resolving {} with {} profile", link.normalized_url, options.profile);

    let run = pipeline.run(&link, options).await;
    let trail: Vec<String> = run.history.iter().map(|s| s.to_string()).collect();
    println!("States:  {}", trail.join(" -> "));

    let media = run.into_result()?;
    println!("URL:     {}", media.selected_url);
    println!("Quality: {}", media.quality_tag.as_deref().unwrap_or("unknown"));

    if let Some(handle) = media.local {
        let size = handle.size_bytes();
        let path = handle.keep().context("Failed to keep downloaded file")?;
        println!("File:    {} ({:.1} MB)", path.display(), size as f64 / 1024.0 / 1024.0);
    }

    Ok(())
}
