use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::offering::OfferingType;

/// Percentage rate stored in hundredths of a percent, so fractional rates
/// like the 3.3% gateway fee stay exact under integer math.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeRate(u32);

impl FeeRate {
    pub const fn from_basis_points(bps: u32) -> Self {
        FeeRate(bps)
    }

    pub const fn from_percent(percent: u32) -> Self {
        FeeRate(percent * 100)
    }

    pub fn basis_points(&self) -> u32 {
        self.0
    }

    pub fn as_percent(&self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// floor(amount * rate / 100), on whole currency units.
    pub fn apply(&self, amount: i64) -> i64 {
        (i128::from(amount) * i128::from(self.0) / 10_000) as i64
    }
}

impl std::fmt::Display for FeeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.as_percent())
    }
}

/// Platform-wide fee settings, stored as explicit state and handed to the
/// resolver at call time rather than read from globals.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeeConfig {
    pub course_fee_rate: FeeRate,
    pub party_fee_rate: FeeRate,
    pub pg_fee_rate: FeeRate,
    pub updated_at: DateTime<Utc>,
}

impl FeeConfig {
    pub fn platform_rate(&self, offering_type: OfferingType) -> FeeRate {
        match offering_type {
            OfferingType::Course => self.course_fee_rate,
            OfferingType::Party => self.party_fee_rate,
        }
    }
}

/// Rates frozen into a settlement at calculation time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedFees {
    pub fee_rate: FeeRate,
    pub pg_fee_rate: FeeRate,
}
