use crate::config::RenderOptions;
use crate::events::{Progress, SessionStatus, ShowSlide};
use crate::render::{MediaKind, MediaProbe, MediaState, SlideRenderer, SlideView};
use anyhow::{Context, Result};
use tokio::select;
use tokio::sync::mpsc::Receiver;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Presents whatever the loader and the rotation publish.
///
/// Owns the per-instance [`MediaState`]: each [`ShowSlide`] starts a fresh
/// instance with clean flags, and probe results for any other instance are
/// discarded. Media failures only change what this slide draws.
pub async fn run<R>(
    mut slides_rx: Receiver<ShowSlide>,
    mut progress_rx: watch::Receiver<Progress>,
    mut status_rx: watch::Receiver<SessionStatus>,
    mut renderer: R,
    probe: Option<MediaProbe>,
    options: RenderOptions,
    cancel: CancellationToken,
) -> Result<()>
where
    R: SlideRenderer,
{
    let mut current: Option<(SlideView, MediaState)> = None;
    let mut next_instance: u64 = 0;
    let mut probes: JoinSet<(u64, MediaKind, Result<(u32, u32)>)> = JoinSet::new();
    let mut status_open = true;
    let mut progress_open = true;

    let initial = status_rx.borrow_and_update().clone();
    renderer.status(&initial).context("rendering status")?;
    let mut ready = initial.is_ready();

    loop {
        select! {
            _ = cancel.cancelled() => break,

            changed = status_rx.changed(), if status_open => {
                if changed.is_err() {
                    status_open = false;
                    continue;
                }
                let status = status_rx.borrow_and_update().clone();
                info!(status = ?status, "session status");
                ready = status.is_ready();
                if !ready {
                    current = None;
                    probes.abort_all();
                }
                renderer.status(&status).context("rendering status")?;
            }

            Some(ShowSlide { index, slide }) = slides_rx.recv() => {
                probes.abort_all();
                next_instance += 1;
                let view = SlideView::new(next_instance, index, &slide, &options);
                let media = MediaState::default();
                renderer.show(&view, &media).context("rendering slide")?;
                if let Some(probe) = &probe {
                    spawn_probes(&mut probes, probe, &view);
                }
                current = Some((view, media));
            }

            changed = progress_rx.changed(), if progress_open => {
                if changed.is_err() {
                    progress_open = false;
                    continue;
                }
                let Progress { index, percent } = *progress_rx.borrow_and_update();
                let visible = matches!(&current, Some((view, _)) if view.index == index);
                if ready && visible {
                    renderer.progress(percent).context("rendering progress")?;
                }
            }

            Some(joined) = probes.join_next(), if !probes.is_empty() => {
                // Aborted probes belong to replaced instances.
                let Ok((instance, kind, outcome)) = joined else { continue };
                let Some((view, media)) = current.as_mut() else { continue };
                if view.instance != instance {
                    continue;
                }
                match outcome {
                    Ok((width, height)) => {
                        debug!(instance, kind = ?kind, width, height, "media ok");
                    }
                    Err(err) => {
                        debug!(instance, kind = ?kind, error = %err, "media unavailable; using placeholder");
                        if media.mark_failed(kind) {
                            renderer.show(view, media).context("rendering slide")?;
                        }
                    }
                }
            }

            else => break,
        }
    }

    probes.shutdown().await;
    Ok(())
}

fn spawn_probes(
    probes: &mut JoinSet<(u64, MediaKind, Result<(u32, u32)>)>,
    probe: &MediaProbe,
    view: &SlideView,
) {
    let targets = [
        (MediaKind::Primary, view.primary_media()),
        (MediaKind::Qr, view.qr_media()),
    ];
    for (kind, url) in targets {
        let Some(url) = url.map(str::to_owned) else {
            continue;
        };
        let probe = probe.clone();
        let instance = view.instance;
        probes.spawn(async move { (instance, kind, probe.check(&url).await) });
    }
}
