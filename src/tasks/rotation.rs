use crate::config::RotationOptions;
use crate::events::{Progress, RotationCommand, ShowSlide};
use crate::model::DEFAULT_SLIDE_DURATION;
use crate::rotation::{Rotation, RotationPoll};
use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives the slide rotation.
///
/// Rules:
/// - One loop owns the [`Rotation`]; the advance deadline and the progress
///   tick are two wake-ups of the same loop, and each wake-up reads the clock
///   once and lets [`Rotation::poll`] decide. No separate timers to orphan.
/// - Every new window (load, advance, duration change) is announced to the
///   viewer with [`ShowSlide`] where the slide changed, and progress restarts at 0.
/// - While idle (nothing loaded, empty sequence, stopped) neither wake-up is armed.
/// - Cancellation ends the loop; nothing outlives it.
pub async fn run(
    mut commands: Receiver<RotationCommand>,
    to_viewer: Sender<ShowSlide>,
    progress_tx: watch::Sender<Progress>,
    cancel: CancellationToken,
    options: RotationOptions,
) -> Result<()> {
    let mut rotation = Rotation::new(DEFAULT_SLIDE_DURATION, options.carry_index);
    let mut ticker = interval(options.progress_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut commands_open = true;

    loop {
        let deadline = rotation.deadline();
        let rotating = rotation.is_rotating();

        let shown = select! {
            biased;

            _ = cancel.cancelled() => break,

            cmd = commands.recv(), if commands_open => {
                let Some(cmd) = cmd else {
                    // Loader is done; keep rotating over what we have.
                    commands_open = false;
                    continue;
                };
                let (opened, restarted) = apply(&mut rotation, cmd, Instant::now());
                if restarted {
                    ticker.reset();
                    progress_tx.send_replace(Progress {
                        index: rotation.index().unwrap_or_default(),
                        percent: 0.0,
                    });
                }
                opened
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                step(&mut rotation, &progress_tx)
            }

            _ = ticker.tick(), if rotating => {
                step(&mut rotation, &progress_tx)
            }
        };

        if let Some(show) = shown {
            if to_viewer.send(show).await.is_err() {
                warn!("viewer channel closed");
                // Break rather than spin forever with a dead peer.
                break;
            }
        }
    }

    info!("rotation stopped");
    Ok(())
}

/// Returns the slide opening a new window, if any, and whether the current
/// window was restarted.
fn apply(rotation: &mut Rotation, cmd: RotationCommand, now: Instant) -> (Option<ShowSlide>, bool) {
    match cmd {
        RotationCommand::Load { slides, duration } => {
            let len = slides.len();
            let retimed = rotation.set_duration(duration, now);
            let opened = rotation
                .load(slides, now)
                .map(|(index, slide)| ShowSlide { index, slide });
            if rotation.is_rotating() {
                info!(
                    slides = len,
                    duration_ms = rotation.duration().as_millis() as u64,
                    reopened = opened.is_some(),
                    retimed,
                    "rotation running"
                );
            } else {
                info!("rotation idle: empty sequence");
            }
            let restarted = rotation.is_rotating() && (retimed || opened.is_some());
            (opened, restarted)
        }
        RotationCommand::SetDuration(duration) => {
            let retimed = rotation.set_duration(duration, now);
            if retimed {
                info!(
                    duration_ms = rotation.duration().as_millis() as u64,
                    "slide duration changed; window restarted"
                );
            }
            (None, retimed && rotation.is_rotating())
        }
        RotationCommand::Stop => {
            if rotation.is_rotating() {
                info!("rotation idle: stopped");
            }
            rotation.stop();
            (None, false)
        }
    }
}

fn step(rotation: &mut Rotation, progress_tx: &watch::Sender<Progress>) -> Option<ShowSlide> {
    match rotation.poll(Instant::now()) {
        RotationPoll::Idle => None,
        RotationPoll::Progress { index, percent } => {
            progress_tx.send_replace(Progress { index, percent });
            None
        }
        RotationPoll::Advanced { index, slide } => {
            debug!(index, promotion = slide.is_promotion(), "advance");
            progress_tx.send_replace(Progress {
                index,
                percent: 0.0,
            });
            Some(ShowSlide { index, slide })
        }
    }
}
