use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::model::{Listing, Settings, SlideOrder};

/// A promotion is inserted after every this many vehicle slides.
pub const PROMOTION_EVERY: usize = 4;

pub type Inventory = Arc<[Listing]>;
pub type Promotions = Arc<[String]>;

/// One unit of displayed content.
#[derive(Debug, Clone, PartialEq)]
pub enum Slide {
    Vehicle(Listing),
    /// Image URL of a promotional slide.
    Promotion(String),
}

impl Slide {
    pub fn is_promotion(&self) -> bool {
        matches!(self, Self::Promotion(_))
    }
}

/// Interleave vehicles with promotions.
///
/// One vehicle slide per listing in input order; after the k-th group of
/// [`PROMOTION_EVERY`] vehicles the promotion `promotions[(k - 1) % len]` is
/// appended. Empty promotions add nothing; empty listings yield nothing.
pub fn build_slides(listings: &[Listing], promotions: &[String]) -> Vec<Slide> {
    let inserts = if promotions.is_empty() {
        0
    } else {
        listings.len() / PROMOTION_EVERY
    };
    let mut slides = Vec::with_capacity(listings.len() + inserts);
    for (i, listing) in listings.iter().enumerate() {
        slides.push(Slide::Vehicle(listing.clone()));
        let vehicles = i + 1;
        if vehicles % PROMOTION_EVERY == 0 && !promotions.is_empty() {
            let k = vehicles / PROMOTION_EVERY;
            slides.push(Slide::Promotion(promotions[(k - 1) % promotions.len()].clone()));
        }
    }
    slides
}

/// Memoized slide sequence.
///
/// Rebuilds only when the listing or promotion list is a different
/// allocation than the one the current sequence was derived from; the same
/// inputs hand back the same `Arc`, so a running rotation is not disturbed.
#[derive(Debug)]
pub struct SlideDeck {
    inputs: Option<(Inventory, Promotions)>,
    slides: Arc<[Slide]>,
    rebuilds: usize,
}

impl SlideDeck {
    pub fn new() -> Self {
        Self {
            inputs: None,
            slides: Arc::from(Vec::new()),
            rebuilds: 0,
        }
    }

    pub fn refresh(&mut self, listings: &Inventory, promotions: &Promotions) -> Arc<[Slide]> {
        let unchanged = matches!(
            &self.inputs,
            Some((l, p)) if Arc::ptr_eq(l, listings) && Arc::ptr_eq(p, promotions)
        );
        if !unchanged {
            self.slides = build_slides(listings, promotions).into();
            self.inputs = Some((Arc::clone(listings), Arc::clone(promotions)));
            self.rebuilds += 1;
            debug!(
                listings = listings.len(),
                promotions = promotions.len(),
                slides = self.slides.len(),
                "slide sequence rebuilt"
            );
        }
        Arc::clone(&self.slides)
    }

    /// Number of times the sequence has been derived.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }
}

impl Default for SlideDeck {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply the CMS ordering and cap once per session, before building slides.
pub fn arrange_inventory<R: Rng + ?Sized>(
    mut listings: Vec<Listing>,
    settings: &Settings,
    rng: &mut R,
) -> Vec<Listing> {
    match settings.order() {
        SlideOrder::Source => {}
        SlideOrder::Random => listings.shuffle(rng),
        SlideOrder::Position => listings.sort_by(|a, b| {
            let key = |l: &Listing| l.position().map_or((1, 0), |p| (0, p));
            key(a)
                .cmp(&key(b))
                .then_with(|| a.link.as_deref().cmp(&b.link.as_deref()))
        }),
    }
    if let Some(max) = settings.max_listings.filter(|max| *max > 0) {
        listings.truncate(max);
    }
    listings
}
