use crate::config::Configuration;
use crate::error::LoadError;
use crate::events::{RotationCommand, SessionStatus};
use crate::fetch::{self, Documents};
use crate::model::Settings;
use crate::slides::{Inventory, Promotions, Slide, SlideDeck, arrange_inventory};
use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use reqwest::{Client, Url};
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Read-only session data derived from the two startup documents.
#[derive(Debug, Clone)]
pub struct Session {
    pub listings: Inventory,
    pub promotions: Promotions,
    pub settings: Settings,
    pub slides: Arc<[Slide]>,
}

/// Fetch both documents, arrange the inventory, resolve relative media
/// locators and build the slide sequence.
pub async fn prepare_session(
    client: &Client,
    cfg: &Configuration,
    seed: Option<u64>,
) -> Result<Session, LoadError> {
    let base = cfg.base_url().map_err(|err| locator(&cfg.base_url, err))?;
    let stock_url = cfg.stock_url().map_err(|err| locator(&cfg.stock_path, err))?;
    let settings_url = cfg
        .settings_url()
        .map_err(|err| locator(&cfg.settings_path, err))?;

    let Documents { listings, settings } = fetch::load_documents(
        client,
        &stock_url,
        &settings_url,
        &cfg.fetch.retry_policy(),
    )
    .await?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut listings = arrange_inventory(listings, &settings, &mut rng);
    for listing in &mut listings {
        listing.image = listing.image.take().map(|raw| resolve(&base, raw));
        listing.link = listing.link.take().map(|raw| resolve(&base, raw));
    }
    let promotions: Promotions = settings
        .promotions
        .iter()
        .map(|raw| resolve(&base, raw.clone()))
        .collect::<Vec<_>>()
        .into();
    let listings: Inventory = listings.into();

    let slides = SlideDeck::new().refresh(&listings, &promotions);
    Ok(Session {
        listings,
        promotions,
        settings,
        slides,
    })
}

/// One-shot session initialization.
///
/// Publishes `Loading`, then exactly one terminal status. Only a non-empty
/// sequence is handed to the rotation; a load failure is a display state,
/// not a task error, and is never retried here.
#[instrument(skip_all, fields(base = %cfg.base_url))]
pub async fn run(
    client: Client,
    cfg: Configuration,
    seed: Option<u64>,
    status_tx: watch::Sender<SessionStatus>,
    to_rotation: Sender<RotationCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    status_tx.send_replace(SessionStatus::Loading);

    let prepared = select! {
        _ = cancel.cancelled() => {
            info!("cancel received during load");
            return Ok(());
        }
        prepared = prepare_session(&client, &cfg, seed) => prepared,
    };

    match prepared {
        Err(err) => {
            error!(error = %err, "session load failed");
            stop_rotation(&to_rotation).await;
            status_tx.send_replace(SessionStatus::Failed(err.to_string()));
        }
        Ok(session) if session.slides.is_empty() => {
            info!("no listings to show");
            stop_rotation(&to_rotation).await;
            status_tx.send_replace(SessionStatus::Empty);
        }
        Ok(session) => {
            let duration = session.settings.slide_duration();
            info!(
                listings = session.listings.len(),
                promotions = session.promotions.len(),
                slides = session.slides.len(),
                duration_ms = duration.as_millis() as u64,
                "session ready"
            );
            status_tx.send_replace(SessionStatus::Ready {
                slides: session.slides.len(),
            });
            to_rotation
                .send(RotationCommand::Load {
                    slides: session.slides,
                    duration,
                })
                .await?;
        }
    }
    Ok(())
}

async fn stop_rotation(to_rotation: &Sender<RotationCommand>) {
    if to_rotation.send(RotationCommand::Stop).await.is_err() {
        debug!("rotation already gone; nothing to stop");
    }
}

fn resolve(base: &Url, raw: String) -> String {
    match base.join(&raw) {
        Ok(url) => url.into(),
        Err(_) => raw,
    }
}

fn locator(raw: &str, err: anyhow::Error) -> LoadError {
    LoadError::Locator {
        locator: raw.to_owned(),
        reason: format!("{err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_media_resolves_against_base() {
        let base = Url::parse("https://signage.test/showroom/").unwrap();
        assert_eq!(
            resolve(&base, "static/promos/a.png".into()),
            "https://signage.test/showroom/static/promos/a.png"
        );
        assert_eq!(
            resolve(&base, "/auto/fiat-panda".into()),
            "https://signage.test/auto/fiat-panda"
        );
        assert_eq!(
            resolve(&base, "https://cdn.test/x.jpg".into()),
            "https://cdn.test/x.jpg"
        );
    }
}
