use log::warn;

use crate::constants::{DEFAULT_PG_FEE_BPS, DEFAULT_PLATFORM_FEE_BPS};
use crate::core::models::{FeeConfig, FeeRate, Influencer, OfferingType, ResolvedFees};

/// Resolves the fee rates to freeze into a settlement: influencer override
/// for the offering type if present, else the platform default; the gateway
/// rate is always platform-wide. Pure read over the config handed in.
///
/// A missing config must never block a payout, so it falls back to the
/// hard-coded safety defaults and leaves a warning for the operators.
pub fn resolve_fees(
    config: Option<&FeeConfig>,
    influencer: &Influencer,
    offering_type: OfferingType,
) -> ResolvedFees {
    let (platform_default, pg_fee_rate) = match config {
        Some(cfg) => (cfg.platform_rate(offering_type), cfg.pg_fee_rate),
        None => {
            warn!(
                "fee config missing; using safety defaults for influencer {} ({})",
                influencer.id, offering_type
            );
            (
                FeeRate::from_basis_points(DEFAULT_PLATFORM_FEE_BPS),
                FeeRate::from_basis_points(DEFAULT_PG_FEE_BPS),
            )
        }
    };

    let fee_rate = influencer
        .fee_override(offering_type)
        .unwrap_or(platform_default);

    ResolvedFees {
        fee_rate,
        pg_fee_rate,
    }
}
