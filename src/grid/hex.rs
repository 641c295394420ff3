//! Axial hex coordinates for the battlefield map
//!
//! Tiles are addressed by (q, r); the third cube axis s = -q - r is derived.

use serde::{Deserialize, Serialize};

/// Axial hex coordinate
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct HexCoord {
    pub q: i32,
    pub r: i32,
}

/// Unit offsets of the six neighbours, counter-clockwise from east
pub const DIRECTIONS: [HexCoord; 6] = [
    HexCoord { q: 1, r: 0 },
    HexCoord { q: 1, r: -1 },
    HexCoord { q: 0, r: -1 },
    HexCoord { q: -1, r: 0 },
    HexCoord { q: -1, r: 1 },
    HexCoord { q: 0, r: 1 },
];

impl HexCoord {
    pub const ORIGIN: HexCoord = HexCoord { q: 0, r: 0 };

    pub fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Cube coordinate S (derived from q and r)
    pub fn s(&self) -> i32 {
        -self.q - self.r
    }

    /// Distance from the origin, which is also the ring this tile sits on
    pub fn ring_index(&self) -> u32 {
        self.distance(&Self::ORIGIN)
    }

    pub fn distance(&self, other: &Self) -> u32 {
        let dq = (self.q - other.q).abs();
        let dr = (self.r - other.r).abs();
        let ds = (self.s() - other.s()).abs();
        ((dq + dr + ds) / 2) as u32
    }

    pub fn offset(&self, by: HexCoord, times: i32) -> Self {
        Self::new(self.q + by.q * times, self.r + by.r * times)
    }

    /// All six surrounding coordinates, without regard to any map bounds
    pub fn neighbors(&self) -> [HexCoord; 6] {
        DIRECTIONS.map(|d| self.offset(d, 1))
    }

    /// Hexes on the straight line from self to other, both ends included
    pub fn line_to(&self, other: &Self) -> Vec<HexCoord> {
        let n = self.distance(other);
        if n == 0 {
            return vec![*self];
        }

        // Nudge off exact edges so ties round the same way in both directions
        const EPS: f64 = 1e-6;
        let (aq, ar) = (self.q as f64 + EPS, self.r as f64 + EPS);
        let (bq, br) = (other.q as f64 + EPS, other.r as f64 + EPS);

        (0..=n)
            .map(|i| {
                let t = i as f64 / n as f64;
                Self::round(aq + (bq - aq) * t, ar + (br - ar) * t)
            })
            .collect()
    }

    fn round(q: f64, r: f64) -> Self {
        let s = -q - r;
        let mut rq = q.round();
        let mut rr = r.round();
        let rs = s.round();

        let q_diff = (rq - q).abs();
        let r_diff = (rr - r).abs();
        let s_diff = (rs - s).abs();

        if q_diff > r_diff && q_diff > s_diff {
            rq = -rr - rs;
        } else if r_diff > s_diff {
            rr = -rq - rs;
        }

        Self::new(rq as i32, rr as i32)
    }

    /// All hexes within range (inclusive), center first
    pub fn hexes_in_range(&self, range: u32) -> Vec<HexCoord> {
        let range = range as i32;
        let mut results = Vec::with_capacity((3 * range * (range + 1) + 1) as usize);
        results.push(*self);
        for q in -range..=range {
            for r in (-range).max(-q - range)..=range.min(-q + range) {
                if q != 0 || r != 0 {
                    results.push(HexCoord::new(self.q + q, self.r + r));
                }
            }
        }
        results
    }

    /// Hexes exactly `radius` steps away, walking the ring counter-clockwise
    pub fn ring(&self, radius: u32) -> Vec<HexCoord> {
        if radius == 0 {
            return vec![*self];
        }
        let mut results = Vec::with_capacity(6 * radius as usize);
        let mut cursor = self.offset(DIRECTIONS[4], radius as i32);
        for direction in DIRECTIONS {
            for _ in 0..radius {
                results.push(cursor);
                cursor = cursor.offset(direction, 1);
            }
        }
        results
    }
}
