//! Depth normalization.
//!
//! Turns either payload shape into a [`DepthCurve`]: per side, levels are
//! sorted from the best price outwards, a `(0, best)` sentinel is emitted, then
//! one `(running_total, price)` point per level. Zero-volume levels stay in as
//! boundaries.

use depthline_core::{DepthCurve, DepthPoint, PriceLevel, RawBookPayload, RawDelta, RawSnapshot, Side};

/// Normalize a book payload into a depth curve.
pub fn normalize(raw: &RawBookPayload) -> DepthCurve {
    match raw {
        RawBookPayload::Snapshot(snapshot) => normalize_snapshot(snapshot),
        RawBookPayload::Delta(delta) => normalize_delta(delta),
    }
}

pub fn normalize_snapshot(snapshot: &RawSnapshot) -> DepthCurve {
    let side = |side: Side| {
        let levels = snapshot.side(side).iter().map(|l| l.level()).collect();
        accumulate(side, levels)
    };
    DepthCurve {
        bids: side(Side::Bid),
        asks: side(Side::Ask),
    }
}

/// Keys that do not parse are skipped; deltas are validated before they get here.
///
/// Keys spelling the same price ("100", "100.0", "1e2") are ordered by the raw
/// key, so the curve does not depend on map iteration order.
pub fn normalize_delta(delta: &RawDelta) -> DepthCurve {
    let side = |side: Side| {
        let mut entries: Vec<_> = delta.side(side).iter().collect();
        entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        let levels = entries
            .into_iter()
            .filter_map(|(price, volume)| {
                price
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .map(|p| PriceLevel::new(p, *volume))
            })
            .collect();
        accumulate(side, levels)
    };
    DepthCurve {
        bids: side(Side::Bid),
        asks: side(Side::Ask),
    }
}

fn accumulate(side: Side, mut levels: Vec<PriceLevel>) -> Vec<DepthPoint> {
    // Stable: equal prices keep input order.
    levels.sort_by(|a, b| side.traversal_cmp(a.price, b.price));

    let Some(best) = levels.first() else {
        return Vec::new();
    };

    let mut points = Vec::with_capacity(levels.len() + 1);
    points.push(DepthPoint::new(0.0, best.price));

    let mut total = 0.0;
    for level in &levels {
        total += level.volume;
        points.push(DepthPoint::new(total, level.price));
    }
    points
}
