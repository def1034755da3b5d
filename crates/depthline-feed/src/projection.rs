//! Spread and hover projection.
//!
//! Hovering a price on one side of the book mirrors it onto the other side at
//! the same relative distance from that side's best price.

use depthline_core::{DepthCurve, Side};
use serde::Serialize;

/// Mirror a focal price onto the opposite side of the book.
///
/// - `focal >= best_ask`: mirrored bid `best_bid - (focal/best_ask - 1) * best_bid`
/// - `focal <= best_bid`: mirrored ask `(best_bid/focal - 1) * best_ask + best_ask`
/// - inside the spread, or any non-positive input: `None`
pub fn project_other_side(focal: f64, best_bid: f64, best_ask: f64) -> Option<(Side, f64)> {
    if !(is_positive(focal) && is_positive(best_bid) && is_positive(best_ask)) {
        return None;
    }

    if focal >= best_ask {
        let distance = focal / best_ask - 1.0;
        Some((Side::Bid, best_bid - distance * best_bid))
    } else if focal <= best_bid {
        let distance = best_bid / focal - 1.0;
        Some((Side::Ask, distance * best_ask + best_ask))
    } else {
        None
    }
}

/// Spread as a ratio: `ask / bid - 1`.
pub fn compute_spread(bid: f64, ask: f64) -> f64 {
    ask / bid - 1.0
}

pub fn spread_percent(ratio: f64) -> f64 {
    ratio * 100.0
}

pub fn midpoint(bid: f64, ask: f64) -> f64 {
    (bid + ask) / 2.0
}

fn is_positive(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

/// Values shown while hovering a price on the depth chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HoverView {
    pub bid: f64,
    pub ask: f64,
    /// `ask / bid - 1` of the hovered pair.
    pub spread: f64,
    /// Midpoint of the top of book, independent of the hovered price.
    pub mid: f64,
    /// Whether `bid`/`ask` come from a projection rather than the top of book.
    pub projected: bool,
}

impl HoverView {
    /// View of the top of book with no hover.
    pub fn top_of_book(best_bid: f64, best_ask: f64) -> Self {
        Self {
            bid: best_bid,
            ask: best_ask,
            spread: compute_spread(best_bid, best_ask),
            mid: midpoint(best_bid, best_ask),
            projected: false,
        }
    }

    pub fn spread_percent(&self) -> f64 {
        spread_percent(self.spread)
    }
}

/// Compute the hover view for a focal price.
///
/// The hovered bid never goes below the deepest bid on the curve nor below
/// zero. A focal price inside the spread has no projection and yields the
/// top-of-book view. Returns `None` when either side of the curve is empty or
/// the inputs are degenerate.
pub fn hover_view(curve: &DepthCurve, focal: f64) -> Option<HoverView> {
    let best_bid = curve.best_bid()?;
    let best_ask = curve.best_ask()?;
    let deepest_bid = curve.deepest(Side::Bid)?;
    if !(is_positive(focal) && is_positive(best_bid) && is_positive(best_ask)) {
        return None;
    }

    let Some((side, mirrored)) = project_other_side(focal, best_bid, best_ask) else {
        return Some(HoverView::top_of_book(best_bid, best_ask));
    };

    let (raw_bid, ask) = match side {
        Side::Bid => (mirrored, focal),
        Side::Ask => (focal, mirrored),
    };
    let bid = deepest_bid.max(raw_bid).max(0.0);

    Some(HoverView {
        bid,
        ask,
        spread: compute_spread(bid, ask),
        mid: midpoint(best_bid, best_ask),
        projected: true,
    })
}
