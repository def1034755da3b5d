//! Order book payload shapes and the canonical depth curve.
//!
//! Two wire shapes describe a book:
//! - [`RawSnapshot`]: pull endpoint, per side a list of `[price, volume, timestamp]`
//! - [`RawDelta`]: push endpoint, per side a map of price string to volume
//!
//! Both are wrapped in [`RawBookPayload`] at the transport boundary and turned
//! into a [`DepthCurve`] by the normalizer.

use crate::error::{CoreError, Result};
use crate::types::{PriceLevel, Side};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Numeric element that may be sent as a JSON number or a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Num(f64),
    Str(String),
}

impl WireNumber {
    fn into_f64<E: de::Error>(self) -> std::result::Result<f64, E> {
        match self {
            Self::Num(n) => Ok(n),
            Self::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("not a number: {s:?}"))),
        }
    }
}

/// One level of a pull snapshot.
///
/// On the wire this is `[price, volume]` or `[price, volume, timestamp]`.
/// The timestamp may also be `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SnapshotLevel {
    pub price: f64,
    pub volume: f64,
    pub timestamp: Option<f64>,
}

impl SnapshotLevel {
    pub fn new(price: f64, volume: f64) -> Self {
        Self {
            price,
            volume,
            timestamp: None,
        }
    }

    pub fn level(&self) -> PriceLevel {
        PriceLevel::new(self.price, self.volume)
    }
}

impl<'de> Deserialize<'de> for SnapshotLevel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LevelVisitor;

        impl<'de> Visitor<'de> for LevelVisitor {
            type Value = SnapshotLevel;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [price, volume] or [price, volume, timestamp] array")
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let price = seq
                    .next_element::<WireNumber>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?
                    .into_f64()?;
                let volume = seq
                    .next_element::<WireNumber>()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?
                    .into_f64()?;
                let timestamp = match seq.next_element::<Option<WireNumber>>()? {
                    Some(Some(ts)) => Some(ts.into_f64()?),
                    _ => None,
                };
                // Anything past the timestamp is venue-specific and ignored.
                while seq.next_element::<de::IgnoredAny>()?.is_some() {}

                Ok(SnapshotLevel {
                    price,
                    volume,
                    timestamp,
                })
            }
        }

        deserializer.deserialize_seq(LevelVisitor)
    }
}

/// Full book snapshot from the pull endpoint. Levels are not guaranteed sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub bids: Vec<SnapshotLevel>,
    #[serde(default)]
    pub asks: Vec<SnapshotLevel>,
}

impl RawSnapshot {
    pub fn side(&self, side: Side) -> &[SnapshotLevel] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Check every level has a finite positive price and a finite non-negative volume.
    pub fn validate(&self) -> Result<()> {
        for side in Side::BOTH {
            for level in self.side(side) {
                validate_level(side, level.price, level.volume)?;
            }
        }
        Ok(())
    }
}

/// Incremental book state from the push endpoint.
///
/// Each value is the absolute volume at that price, 0 marking a removed level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDelta {
    #[serde(default)]
    pub bid: HashMap<String, f64>,
    #[serde(default)]
    pub ask: HashMap<String, f64>,
}

impl RawDelta {
    pub fn side(&self, side: Side) -> &HashMap<String, f64> {
        match side {
            Side::Bid => &self.bid,
            Side::Ask => &self.ask,
        }
    }

    /// Parse one side into price levels, in map order.
    pub fn levels(&self, side: Side) -> Result<Vec<PriceLevel>> {
        self.side(side)
            .iter()
            .map(|(key, volume)| {
                let price = key.trim().parse::<f64>().map_err(|_| {
                    CoreError::InvalidPrice(format!("{side} key {key:?} is not numeric"))
                })?;
                validate_level(side, price, *volume)?;
                Ok(PriceLevel::new(price, *volume))
            })
            .collect()
    }

    /// Check all keys parse as prices and all volumes are usable.
    pub fn validate(&self) -> Result<()> {
        for side in Side::BOTH {
            self.levels(side)?;
        }
        Ok(())
    }
}

fn validate_level(side: Side, price: f64, volume: f64) -> Result<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(CoreError::InvalidPrice(format!("{side} price {price}")));
    }
    if !volume.is_finite() || volume < 0.0 {
        return Err(CoreError::InvalidVolume(format!(
            "{side} volume {volume} at {price}"
        )));
    }
    Ok(())
}

/// A book payload whose shape was decided at the transport boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBookPayload {
    Snapshot(RawSnapshot),
    Delta(RawDelta),
}

impl RawBookPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Delta(_) => "delta",
        }
    }
}

/// One point of a depth curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthPoint {
    pub cumulative_volume: f64,
    pub price: f64,
}

impl DepthPoint {
    pub fn new(cumulative_volume: f64, price: f64) -> Self {
        Self {
            cumulative_volume,
            price,
        }
    }
}

/// Cumulative depth per side.
///
/// Each non-empty side starts with a `(0, best_price)` sentinel followed by one
/// point per level in traversal order: bids descending, asks ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthCurve {
    pub bids: Vec<DepthPoint>,
    pub asks: Vec<DepthPoint>,
}

impl DepthCurve {
    /// Curve with no data on either side.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn side(&self, side: Side) -> &[DepthPoint] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Best price of a side (the sentinel price).
    pub fn best(&self, side: Side) -> Option<f64> {
        self.side(side).first().map(|p| p.price)
    }

    /// Price furthest from the top of book on a side.
    pub fn deepest(&self, side: Side) -> Option<f64> {
        self.side(side).last().map(|p| p.price)
    }

    /// Total volume on a side.
    pub fn total_volume(&self, side: Side) -> f64 {
        self.side(side)
            .last()
            .map(|p| p.cumulative_volume)
            .unwrap_or(0.0)
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.best(Side::Bid)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.best(Side::Ask)
    }

    /// True when neither side holds any point.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// True when both sides hold data.
    pub fn is_two_sided(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_deserialize_triples_and_pairs() {
        let json = r#"{
            "bids": [[100.0, 2.0, 1700000000000], [99, 3]],
            "asks": [["101.5", "1.25", null]],
            "timestamp": 1700000000000,
            "nonce": null
        }"#;
        let snap: RawSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.bids.len(), 2);
        assert_eq!(snap.bids[0].timestamp, Some(1_700_000_000_000.0));
        assert_eq!(snap.bids[1], SnapshotLevel::new(99.0, 3.0));
        assert_eq!(snap.asks[0].price, 101.5);
        assert_eq!(snap.asks[0].volume, 1.25);
        assert_eq!(snap.asks[0].timestamp, None);
    }

    #[test]
    fn test_snapshot_null_body() {
        let snap: Option<RawSnapshot> = serde_json::from_str("null").unwrap();
        assert!(snap.is_none());
    }

    #[test]
    fn test_snapshot_level_too_short() {
        let res: std::result::Result<SnapshotLevel, _> = serde_json::from_str("[100.0]");
        assert!(res.is_err());
    }

    #[test]
    fn test_snapshot_validate() {
        let mut snap = RawSnapshot {
            bids: vec![SnapshotLevel::new(100.0, 1.0)],
            asks: vec![SnapshotLevel::new(101.0, 0.0)],
        };
        assert!(snap.validate().is_ok());

        snap.asks.push(SnapshotLevel::new(102.0, -1.0));
        assert!(matches!(snap.validate(), Err(CoreError::InvalidVolume(_))));
    }

    #[test]
    fn test_delta_validate() {
        let delta: RawDelta =
            serde_json::from_str(r#"{"bid": {"100": 2, "99.5": 0}, "ask": {"101": 1}}"#).unwrap();
        assert!(delta.validate().is_ok());
        assert_eq!(delta.levels(Side::Bid).unwrap().len(), 2);

        let bad_key: RawDelta = serde_json::from_str(r#"{"bid": {"abc": 2}}"#).unwrap();
        assert!(matches!(bad_key.validate(), Err(CoreError::InvalidPrice(_))));

        let bad_volume: RawDelta = serde_json::from_str(r#"{"ask": {"101": -3}}"#).unwrap();
        assert!(matches!(
            bad_volume.validate(),
            Err(CoreError::InvalidVolume(_))
        ));
    }

    #[test]
    fn test_delta_missing_side_defaults_empty() {
        let delta: RawDelta = serde_json::from_str(r#"{"ask": {"101": 1}}"#).unwrap();
        assert!(delta.bid.is_empty());
        assert_eq!(delta.ask.len(), 1);
    }

    #[test]
    fn test_depth_curve_accessors() {
        let curve = DepthCurve {
            bids: vec![
                DepthPoint::new(0.0, 100.0),
                DepthPoint::new(2.0, 100.0),
                DepthPoint::new(5.0, 99.0),
            ],
            asks: vec![],
        };
        assert_eq!(curve.best_bid(), Some(100.0));
        assert_eq!(curve.deepest(Side::Bid), Some(99.0));
        assert_eq!(curve.total_volume(Side::Bid), 5.0);
        assert_eq!(curve.best_ask(), None);
        assert!(!curve.is_empty());
        assert!(!curve.is_two_sided());
        assert!(DepthCurve::empty().is_empty());
    }
}
