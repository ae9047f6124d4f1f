/*!
    Time bases, timestamps and host tick conversion.
*/

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// Number of host ticks per second (one tick is 100ns).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Engine-wide time base for container durations and start times (microseconds).
pub const AV_TIME_BASE: i64 = 1_000_000;

/**
    A rational number, used for time bases, frame rates and aspect ratios.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /**
        Returns the value as a float, or 0.0 when the denominator is zero.
    */
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /**
        Returns true when both terms are usable as a divisor pair.
    */
    pub const fn is_valid(self) -> bool {
        self.num != 0 && self.den != 0
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/**
    A presentation timestamp in stream time base units.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pts(pub i64);

/**
    A host-facing time value in 100ns ticks.

    All conversions truncate toward zero.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticks(pub i64);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    /**
        Convert a value counted in `units_per_second` into ticks.

        `ticks = value * 10_000_000 / units_per_second`
    */
    pub fn from_units(value: i64, units_per_second: i64) -> Self {
        if units_per_second == 0 {
            return Self::ZERO;
        }
        let ticks = value as i128 * TICKS_PER_SECOND as i128 / units_per_second as i128;
        Self(clamp_i64(ticks))
    }

    /**
        Convert a timestamp expressed in `time_base` into ticks.
    */
    pub fn from_pts(pts: i64, time_base: Rational) -> Self {
        if time_base.den == 0 {
            return Self::ZERO;
        }
        let ticks = pts as i128 * time_base.num as i128 * TICKS_PER_SECOND as i128
            / time_base.den as i128;
        Self(clamp_i64(ticks))
    }

    /**
        Convert these ticks into a timestamp in `time_base`.
    */
    pub fn to_pts(self, time_base: Rational) -> i64 {
        if time_base.num == 0 {
            return 0;
        }
        let divisor = time_base.num as i128 * TICKS_PER_SECOND as i128;
        clamp_i64(self.0 as i128 * time_base.den as i128 / divisor)
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self(clamp_i64((duration.as_nanos() / 100) as i128))
    }

    /**
        Returns the equivalent `Duration`, saturating negative values to zero.
    */
    pub fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0.max(0) as u64 * 100)
    }
}

impl Add for Ticks {
    type Output = Ticks;

    fn add(self, rhs: Ticks) -> Ticks {
        Ticks(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Ticks {
    type Output = Ticks;

    fn sub(self, rhs: Ticks) -> Ticks {
        Ticks(self.0.saturating_sub(rhs.0))
    }
}

fn clamp_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
