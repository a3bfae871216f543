//! Exact musical time, measured in quarter notes

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Non-negative rational number of quarter notes, always kept reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "(u64, u64)", try_from = "(u64, u64)")]
pub struct Time {
    num: u64,
    den: u64,
}

impl Time {
    pub const ZERO: Time = Time { num: 0, den: 1 };

    /// Build `num / den` quarter notes. A zero denominator is treated as one.
    pub fn new(num: u64, den: u64) -> Self {
        let den = den.max(1);
        let g = gcd(num, den);
        Self { num: num / g, den: den / g }
    }

    pub fn from_quarters(quarters: u64) -> Self {
        Self { num: quarters, den: 1 }
    }

    /// Convert a tick position at the given pulses-per-quarter resolution
    pub fn from_ticks(ticks: u64, ppq: u16) -> Self {
        Self::new(ticks, ppq as u64)
    }

    /// Nearest tick at the given resolution (halves round down)
    pub fn to_ticks(self, ppq: u16) -> u64 {
        let scaled = self.num as u128 * ppq as u128;
        let den = self.den as u128;
        let (q, r) = (scaled / den, scaled % den);
        let ticks = if 2 * r > den { q + 1 } else { q };
        ticks as u64
    }

    pub fn is_zero(self) -> bool {
        self.num == 0
    }

    /// Whole seconds at a fixed tempo, expressed exactly in quarter notes
    pub fn from_seconds(seconds: u64, micros_per_quarter: u32) -> Self {
        Self::new(seconds * 1_000_000, micros_per_quarter as u64)
    }

    /// Snap to the nearest multiple of `1 / divisions` quarter notes.
    ///
    /// Exact halfway points go to the earlier boundary.
    pub fn snap(self, divisions: u64) -> Self {
        let scaled = self.num as u128 * divisions as u128;
        let den = self.den as u128;
        let (q, r) = (scaled / den, scaled % den);
        let steps = if 2 * r > den { q + 1 } else { q };
        Self::new(steps as u64, divisions)
    }

    /// Multiply by a whole number
    pub fn times(self, factor: u64) -> Time {
        Time::new(self.num * factor, self.den)
    }

    /// How many whole `unit`s fit into `self`
    pub fn div_floor(self, unit: Time) -> u64 {
        if unit.is_zero() {
            return 0;
        }
        let lhs = self.num as u128 * unit.den as u128;
        let rhs = unit.num as u128 * self.den as u128;
        (lhs / rhs) as u64
    }

    /// True when `self` is a whole multiple of `unit`
    pub fn is_multiple_of(self, unit: Time) -> bool {
        if unit.is_zero() {
            return self.is_zero();
        }
        let lhs = self.num as u128 * unit.den as u128;
        let rhs = unit.num as u128 * self.den as u128;
        lhs % rhs == 0
    }
}

impl Default for Time {
    fn default() -> Self {
        Time::ZERO
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as u128 * other.den as u128;
        let rhs = other.num as u128 * self.den as u128;
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        let g = gcd(self.den, rhs.den);
        let den = self.den / g * rhs.den;
        let num = self.num * (rhs.den / g) + rhs.num * (self.den / g);
        Time::new(num, den)
    }
}

impl Sub for Time {
    type Output = Time;

    /// Panics in debug builds if `rhs` is later than `self`
    fn sub(self, rhs: Time) -> Time {
        let g = gcd(self.den, rhs.den);
        let den = self.den / g * rhs.den;
        let num = self.num * (rhs.den / g) - rhs.num * (self.den / g);
        Time::new(num, den)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl From<Time> for (u64, u64) {
    fn from(t: Time) -> Self {
        (t.num, t.den)
    }
}

impl TryFrom<(u64, u64)> for Time {
    type Error = String;

    fn try_from((num, den): (u64, u64)) -> Result<Self, Self::Error> {
        if den == 0 {
            return Err("time denominator must not be zero".into());
        }
        Ok(Time::new(num, den))
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduces_and_compares() {
        assert_eq!(Time::new(240, 480), Time::new(1, 2));
        assert!(Time::new(1, 3) < Time::new(1, 2));
        assert_eq!(Time::new(1, 3) + Time::new(1, 6), Time::new(1, 2));
        assert_eq!(Time::new(3, 4) - Time::new(1, 4), Time::new(1, 2));
    }

    #[test]
    fn test_ticks_conversion() {
        let t = Time::from_ticks(720, 480);
        assert_eq!(t, Time::new(3, 2));
        assert_eq!(t.to_ticks(96), 144);
        // 1/3 quarter at 100 ppq is 33.33 ticks
        assert_eq!(Time::new(1, 3).to_ticks(100), 33);
    }

    #[test]
    fn test_snap_nearest_and_ties_earlier() {
        // Sixteenth grid (4 per quarter)
        assert_eq!(Time::new(3, 10).snap(4), Time::new(1, 4));
        assert_eq!(Time::new(2, 5).snap(4), Time::new(1, 2));
        // 3/8 sits exactly between 1/4 and 1/2
        assert_eq!(Time::new(3, 8).snap(4), Time::new(1, 4));
        // Triplet grid
        assert_eq!(Time::new(1, 2).snap(3), Time::new(1, 3));
        assert_eq!(Time::new(7, 12).snap(3), Time::new(2, 3));
    }

    #[test]
    fn test_multiples() {
        let bar = Time::from_quarters(3);
        assert_eq!(Time::from_quarters(12).div_floor(bar), 4);
        assert!(Time::from_quarters(12).is_multiple_of(bar));
        assert!(!Time::from_quarters(8).is_multiple_of(bar));
    }

    #[test]
    fn test_seconds() {
        // 120 bpm
        let t = Time::from_seconds(2, 500_000);
        assert_eq!(t, Time::from_quarters(4));
        // 60 bpm, a quarter lasts a second
        assert_eq!(Time::from_seconds(3, 1_000_000), Time::from_quarters(3));
    }
}
