//! Binary entrypoint for the showroom signage player.
//!
//! Delegates all logic to the library crate; this file only wires tasks.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use showroom_signage::config::Configuration;
use showroom_signage::events::{Progress, RotationCommand, SessionStatus, ShowSlide};
use showroom_signage::render::{MediaProbe, TerminalRenderer};
use showroom_signage::slides::Slide;
use showroom_signage::tasks;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "showroom",
    version,
    about = "Unattended vehicle showroom slideshow"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG", default_value = "showroom.yaml")]
    config: PathBuf,
    /// Print the first N planned slides without starting the rotation
    #[arg(long = "dry-run", value_name = "SLIDES")]
    dry_run: Option<usize>,
    /// Deterministic RNG seed for random inventory order
    #[arg(long = "seed", value_name = "SEED")]
    seed: Option<u64>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("showroom_signage={level}").parse()?)
        .add_directive(format!("showroom={level}").parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper=warn".parse()?);
    // stdout belongs to the terminal renderer
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        dry_run,
        seed,
        verbose,
    } = Args::parse();
    init_tracing(verbose)?;

    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    tracing::info!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);

    let client = reqwest::Client::builder()
        .timeout(cfg.fetch.request_timeout)
        .build()
        .context("failed to build HTTP client")?;
    let seed = seed.or(cfg.shuffle_seed);

    if let Some(count) = dry_run {
        return run_dry_run(&client, &cfg, count, seed).await;
    }

    // Channels (small/bounded)
    let (rotation_tx, rotation_rx) = mpsc::channel::<RotationCommand>(4); // Loader -> Rotation
    let (show_tx, show_rx) = mpsc::channel::<ShowSlide>(8); // Rotation -> Viewer
    let (progress_tx, progress_rx) = watch::channel(Progress::default()); // Rotation -> Viewer
    let (status_tx, status_rx) = watch::channel(SessionStatus::Loading); // Loader -> Viewer

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    // Loader
    tasks.spawn({
        let client = client.clone();
        let cfg = cfg.clone();
        let cancel = cancel.clone();
        async move {
            tasks::loader::run(client, cfg, seed, status_tx, rotation_tx, cancel)
                .await
                .context("loader task failed")
        }
    });

    // Rotation
    tasks.spawn({
        let cancel = cancel.clone();
        let options = cfg.rotation.clone();
        async move {
            tasks::rotation::run(rotation_rx, show_tx, progress_tx, cancel, options)
                .await
                .context("rotation task failed")
        }
    });

    // Viewer
    tasks.spawn({
        let cancel = cancel.clone();
        let options = cfg.render.clone();
        let probe = options
            .probe_media
            .then(|| MediaProbe::new(client.clone(), options.media_timeout));
        async move {
            let renderer = TerminalRenderer::new(io::stdout());
            tasks::viewer::run(
                show_rx,
                progress_rx,
                status_rx,
                renderer,
                probe,
                options,
                cancel,
            )
            .await
            .context("viewer task failed")
        }
    });

    // Drain JoinSet; a failing task takes the others down with it
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("task error: {e:?}");
                cancel.cancel();
            }
            Err(e) => {
                tracing::error!("join error: {e}");
                cancel.cancel();
            }
        }
    }

    Ok(())
}

async fn run_dry_run(
    client: &reqwest::Client,
    cfg: &Configuration,
    count: usize,
    seed: Option<u64>,
) -> Result<()> {
    let session = tasks::loader::prepare_session(client, cfg, seed)
        .await
        .context("failed to load session data")?;

    println!(
        "# rotation dry run\n# listings: {}\n# promotions: {}\n# slides: {}\n# duration: {}\n# seed: {}\n",
        session.listings.len(),
        session.promotions.len(),
        session.slides.len(),
        humantime::format_duration(session.settings.slide_duration()),
        seed.map_or_else(|| "(random)".to_string(), |s| s.to_string())
    );

    if session.slides.is_empty() {
        println!("(no listings)");
        return Ok(());
    }

    println!("# planned order:");
    for (step, slide) in session.slides.iter().cycle().take(count).enumerate() {
        match slide {
            Slide::Vehicle(listing) => {
                println!("  {:>4}: {}", step + 1, listing.display_title())
            }
            Slide::Promotion(image) => println!("  {:>4}: [promo] {image}", step + 1),
        }
    }

    Ok(())
}
