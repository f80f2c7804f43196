//! Slide presentation boundary.
//!
//! The rotation core only hands out [`SlideView`]s; anything that can draw
//! one implements [`SlideRenderer`]. Broken media is tracked per slide
//! instance in [`MediaState`] and never reaches the rotation.

use std::io::{Cursor, Write};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Client;

use crate::config::RenderOptions;
use crate::events::SessionStatus;
use crate::model::qr_url;
use crate::slides::Slide;

/// Display-ready content of one slide instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideView {
    /// Unique per shown slide; stale media results are matched against it.
    pub instance: u64,
    pub index: usize,
    pub content: SlideContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlideContent {
    Vehicle {
        title: String,
        tags: Vec<String>,
        price: Option<String>,
        condition: Option<String>,
        image: Option<String>,
        qr: Option<String>,
    },
    Promotion {
        image: String,
    },
}

impl SlideView {
    pub fn new(instance: u64, index: usize, slide: &Slide, options: &RenderOptions) -> Self {
        let content = match slide {
            Slide::Vehicle(listing) => SlideContent::Vehicle {
                title: listing.display_title(),
                tags: listing.tags(),
                price: listing.price.clone(),
                condition: listing.condition.as_ref().map(|c| c.label().to_owned()),
                image: listing.image.clone(),
                qr: listing
                    .link
                    .as_deref()
                    .map(|link| qr_url(&options.qr_template, link, options.qr_size)),
            },
            Slide::Promotion(image) => SlideContent::Promotion {
                image: image.clone(),
            },
        };
        Self {
            instance,
            index,
            content,
        }
    }

    /// The slide's main picture, if it references one.
    pub fn primary_media(&self) -> Option<&str> {
        match &self.content {
            SlideContent::Vehicle { image, .. } => image.as_deref(),
            SlideContent::Promotion { image } => Some(image),
        }
    }

    pub fn qr_media(&self) -> Option<&str> {
        match &self.content {
            SlideContent::Vehicle { qr, .. } => qr.as_deref(),
            SlideContent::Promotion { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Primary,
    Qr,
}

/// Load failures of one slide instance; starts clean for every new instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaState {
    pub image_failed: bool,
    pub qr_failed: bool,
}

impl MediaState {
    /// Returns whether the flag changed.
    pub fn mark_failed(&mut self, kind: MediaKind) -> bool {
        let flag = match kind {
            MediaKind::Primary => &mut self.image_failed,
            MediaKind::Qr => &mut self.qr_failed,
        };
        !std::mem::replace(flag, true)
    }

    pub fn show_image<'a>(&self, view: &'a SlideView) -> Option<&'a str> {
        view.primary_media().filter(|_| !self.image_failed)
    }

    pub fn show_qr<'a>(&self, view: &'a SlideView) -> Option<&'a str> {
        view.qr_media().filter(|_| !self.qr_failed)
    }
}

pub trait SlideRenderer {
    /// Full-screen state (loading / error / empty) or the switch back to slides.
    fn status(&mut self, status: &SessionStatus) -> Result<()>;
    /// Draw a slide; called again on the same instance when its media state changes.
    fn show(&mut self, view: &SlideView, media: &MediaState) -> Result<()>;
    fn progress(&mut self, percent: f32) -> Result<()>;
}

const BAR_CELLS: usize = 20;

/// Plain-text surface for headless displays and logs.
pub struct TerminalRenderer<W: Write> {
    out: W,
    bar_cells: Option<usize>,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            bar_cells: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SlideRenderer for TerminalRenderer<W> {
    fn status(&mut self, status: &SessionStatus) -> Result<()> {
        self.bar_cells = None;
        match status {
            SessionStatus::Loading => writeln!(self.out, "Loading...")?,
            SessionStatus::Failed(detail) => {
                writeln!(self.out, "Data load failed")?;
                writeln!(self.out, "  {detail}")?;
            }
            SessionStatus::Empty => writeln!(self.out, "No listings")?,
            SessionStatus::Ready { slides } => writeln!(self.out, "{slides} slides in rotation")?,
        }
        self.out.flush()?;
        Ok(())
    }

    fn show(&mut self, view: &SlideView, media: &MediaState) -> Result<()> {
        self.bar_cells = None;
        writeln!(self.out, "--- slide {} ---", view.index + 1)?;
        match &view.content {
            SlideContent::Vehicle {
                title,
                tags,
                price,
                condition,
                ..
            } => {
                match media.show_image(view) {
                    Some(url) => writeln!(self.out, "[image] {url}")?,
                    None => writeln!(self.out, "[ PHOTO / NOT / AVAILABLE ]")?,
                }
                writeln!(self.out, "{title}")?;
                if let Some(condition) = condition {
                    writeln!(self.out, "<{condition}>")?;
                }
                if !tags.is_empty() {
                    let row: Vec<String> = tags.iter().map(|t| format!("[{t}]")).collect();
                    writeln!(self.out, "{}", row.join(" "))?;
                }
                if let Some(price) = price {
                    writeln!(self.out, ">> {price} <<")?;
                }
                if let Some(qr) = media.show_qr(view) {
                    writeln!(self.out, "[qr] {qr}")?;
                    writeln!(self.out, "Scan for details")?;
                }
            }
            SlideContent::Promotion { .. } => match media.show_image(view) {
                Some(url) => writeln!(self.out, "[promo] {url}")?,
                None => writeln!(self.out, "PROMO")?,
            },
        }
        self.out.flush()?;
        Ok(())
    }

    fn progress(&mut self, percent: f32) -> Result<()> {
        let cells = ((percent.clamp(0.0, 100.0) / 100.0) * BAR_CELLS as f32) as usize;
        if self.bar_cells == Some(cells) {
            return Ok(());
        }
        self.bar_cells = Some(cells);
        writeln!(
            self.out,
            "[{}{}] {:>3.0}%",
            "#".repeat(cells),
            " ".repeat(BAR_CELLS - cells),
            percent
        )?;
        self.out.flush()?;
        Ok(())
    }
}

/// Checks that a media URL resolves to a decodable image.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    client: Client,
    timeout: Duration,
}

impl MediaProbe {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Returns the decoded dimensions.
    pub async fn check(&self, url: &str) -> Result<(u32, u32)> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {status} for {url}");
        }
        let bytes = response.bytes().await.context("reading media body")?;
        tokio::task::spawn_blocking(move || -> Result<(u32, u32)> {
            let img = image::ImageReader::new(Cursor::new(bytes))
                .with_guessed_format()?
                .decode()?;
            Ok((img.width(), img.height()))
        })
        .await
        .context("decode task panicked")?
    }
}
