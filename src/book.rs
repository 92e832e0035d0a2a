//! Top-of-book depth model and the snapshot parser.
//!
//! A [`DepthSnapshot`] holds exactly [`DEPTH_LEVELS`] bid and ask levels. The
//! feed's ordering is trusted as delivered: bids best-first (descending),
//! asks best-first (ascending). Nothing here re-sorts.
//!
//! [`parse_snapshot`] decodes the depth JSON pushed by the stream and returned
//! by the REST endpoint:
//! `{"lastUpdateId": n, "bids": [["price","qty"], ...], "asks": [...]}`.
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, Side};

/// Number of levels kept per side.
pub const DEPTH_LEVELS: usize = 10;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f32,
    pub volume: f32,
}

impl PriceLevel {
    pub fn new(price: f32, volume: f32) -> Self {
        Self { price, volume }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    /// Best bid at index 0.
    pub bids: [PriceLevel; DEPTH_LEVELS],
    /// Best ask at index 0.
    pub asks: [PriceLevel; DEPTH_LEVELS],
}

impl DepthSnapshot {
    /// True for the zero-valued snapshot used to fill gaps.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Deserialize)]
struct DepthMessage {
    #[serde(rename = "lastUpdateId", default)]
    last_update_id: Option<u64>,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

/// Decode one raw payload. Levels beyond [`DEPTH_LEVELS`] are ignored.
pub fn parse_snapshot(raw: &str) -> Result<DepthSnapshot, ParseError> {
    let msg: DepthMessage =
        serde_json::from_str(raw).map_err(|e| ParseError::MalformedPayload(e.to_string()))?;
    tracing::trace!(last_update_id = ?msg.last_update_id, "decoded depth message");

    Ok(DepthSnapshot {
        bids: read_side(Side::Bid, &msg.bids)?,
        asks: read_side(Side::Ask, &msg.asks)?,
    })
}

fn read_side(side: Side, levels: &[[String; 2]]) -> Result<[PriceLevel; DEPTH_LEVELS], ParseError> {
    if levels.len() < DEPTH_LEVELS {
        return Err(ParseError::MalformedPayload(format!(
            "{} {side} levels, need {DEPTH_LEVELS}",
            levels.len()
        )));
    }
    let mut out = [PriceLevel::default(); DEPTH_LEVELS];
    for (i, [price, volume]) in levels.iter().take(DEPTH_LEVELS).enumerate() {
        out[i] = PriceLevel {
            price: read_field(side, i, "price", price)?,
            volume: read_field(side, i, "volume", volume)?,
        };
    }
    Ok(out)
}

fn read_field(side: Side, index: usize, field: &'static str, token: &str) -> Result<f32, ParseError> {
    match token.trim().parse::<f32>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(ParseError::InvalidNumericField {
            side,
            level: index + 1,
            field,
            token: token.to_string(),
        }),
    }
}
