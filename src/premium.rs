// 3.0: premium pricing. a bonding curve over pool utilization: the emptier the pool,
// the cheaper the cover. pools call the model synchronously inside insure.

use crate::math::{self, MathError, WAD};
use crate::types::{Amount, PremiumRate, BASE, YEAR};
use serde::{Deserialize, Serialize};
use std::fmt;

/// curve rates are BASE scaled internally and reported on a 1e5 = 100% scale.
pub const DIGITS_ADJUSTER: u128 = 10;
// the closed-form integral carries this extra factor.
const INTEGRAL_SCALE: u128 = 1_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PremiumError {
    #[error("Total liquidity cannot be zero")]
    TotalLiquidityZero,

    #[error("Amount exceeds available liquidity")]
    AmountExceedsAvailable,

    #[error("Low risk fee {low_risk_b} exceeds base fee {b}")]
    LowRiskFeeExceedsBaseFee { low_risk_b: u128, b: u128 },

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

/// Prices cover for a pool. `total` and `locked` are the pool's total and
/// locked liquidity before the new cover is written.
pub trait PremiumModel: fmt::Debug {
    fn current_rate(&self, total: Amount, locked: Amount) -> Result<PremiumRate, PremiumError>;

    fn premium(
        &self,
        amount: Amount,
        span_secs: u64,
        total: Amount,
        locked: Amount,
    ) -> Result<Amount, PremiumError>;
}

// 3.1: curve parameters. a and k are tied through set_premium; b is the linear base fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveParams {
    pub k: u128,
    pub b: u128,
    pub a: u128,
    pub low_risk_b: u128,
    pub low_risk_liquidity: u128,
    pub low_risk_util: u128,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self {
            k: 300_100_000,
            b: 30_000,
            a: 300,
            // zeroed low risk fields disable the override
            low_risk_b: 0,
            low_risk_liquidity: 0,
            low_risk_util: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondingPremium {
    params: CurveParams,
}

impl BondingPremium {
    pub fn new(params: CurveParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CurveParams {
        &self.params
    }

    // 3.2: a = (BASE + sqrt(BASE^2 + 4k)) / 2 - BASE, so that a * (a + BASE) ~= k
    pub fn set_premium(&mut self, b: u128, k: u128) -> Result<(), PremiumError> {
        let disc = BASE
            .checked_mul(BASE)
            .and_then(|sq| k.checked_mul(4).and_then(|k4| sq.checked_add(k4)))
            .ok_or(MathError::Overflow)?;
        let a = ((BASE + math::sqrt(disc)) / 2).saturating_sub(BASE);
        self.params.b = b;
        self.params.k = k;
        self.params.a = a;
        Ok(())
    }

    pub fn set_premium2(
        &mut self,
        low_risk_liquidity: u128,
        low_risk_b: u128,
        low_risk_util: u128,
    ) -> Result<(), PremiumError> {
        if low_risk_b > self.params.b {
            return Err(PremiumError::LowRiskFeeExceedsBaseFee {
                low_risk_b,
                b: self.params.b,
            });
        }
        self.params.low_risk_liquidity = low_risk_liquidity;
        self.params.low_risk_b = low_risk_b;
        self.params.low_risk_util = low_risk_util;
        Ok(())
    }

    // deep, barely used pools pay the low risk base fee
    fn base_fee(&self, util: u128, total: Amount) -> u128 {
        let p = &self.params;
        if util < p.low_risk_util && total >= p.low_risk_liquidity {
            p.low_risk_b
        } else {
            p.b
        }
    }

    // 3.3: antiderivative of the rate in WAD: k*365*ln(u + a) + (b - 365a) * u
    fn integral(&self, u: u128, b: u128) -> Result<i128, PremiumError> {
        let p = &self.params;
        let ln = math::ln_wad(u + p.a)?;
        let log_term = p
            .k
            .checked_mul(365)
            .and_then(|k| k.checked_mul(ln))
            .ok_or(MathError::Overflow)?;
        let slope = b as i128 - (p.a as i128) * 365;
        let linear = slope
            .checked_mul(u as i128)
            .and_then(|v| v.checked_mul(WAD as i128))
            .ok_or(MathError::Overflow)?;
        let log_term = i128::try_from(log_term).map_err(|_| MathError::Overflow)?;
        log_term.checked_add(linear).ok_or(PremiumError::Math(MathError::Overflow))
    }
}

impl PremiumModel for BondingPremium {
    // rate(util) = (k*365 - Q*a*365 + Q*b) / Q with Q = BASE - util + a
    fn current_rate(&self, total: Amount, locked: Amount) -> Result<PremiumRate, PremiumError> {
        if total == 0 {
            return Err(PremiumError::TotalLiquidityZero);
        }
        if locked > total {
            return Err(PremiumError::AmountExceedsAvailable);
        }
        let p = &self.params;
        let util = math::mul_div(locked, BASE, total)?;
        let q = BASE - util + p.a;
        let b = self.base_fee(util, total);

        let qa = q
            .checked_mul(p.a)
            .and_then(|v| v.checked_mul(365))
            .ok_or(MathError::Overflow)?;
        let qb = q.checked_mul(b).ok_or(MathError::Overflow)?;
        let numerator = p
            .k
            .checked_mul(365)
            .ok_or(MathError::Overflow)?
            .checked_sub(qa)
            .ok_or(MathError::Underflow)?
            .checked_add(qb)
            .ok_or(MathError::Overflow)?;
        Ok(PremiumRate(numerator / q / DIGITS_ADJUSTER))
    }

    fn premium(
        &self,
        amount: Amount,
        span_secs: u64,
        total: Amount,
        locked: Amount,
    ) -> Result<Amount, PremiumError> {
        let locked_after = amount.checked_add(locked).ok_or(MathError::Overflow)?;
        if locked_after > total {
            return Err(PremiumError::AmountExceedsAvailable);
        }
        if total == 0 {
            return Err(PremiumError::TotalLiquidityZero);
        }
        if amount == 0 {
            return Ok(0);
        }

        let util_before = math::mul_div(locked, BASE, total)?;
        let util_after = math::mul_div(locked_after, BASE, total)?;
        // the regime is judged on utilization after this cover is written
        let b = self.base_fee(util_after, total);

        let upper = self.integral(BASE - util_before, b)?;
        let lower = self.integral(BASE - util_after, b)?;
        let area = upper.saturating_sub(lower).max(0) as u128;

        let denominator = (YEAR as u128) * INTEGRAL_SCALE * WAD;
        Ok(math::product_div(&[area, amount, span_secs as u128], denominator)?)
    }
}

/// Constant annual rate in BASE units. Keeps accounting tests independent of the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatPremium {
    pub annual_rate: u128,
}

impl PremiumModel for FlatPremium {
    fn current_rate(&self, total: Amount, _locked: Amount) -> Result<PremiumRate, PremiumError> {
        if total == 0 {
            return Err(PremiumError::TotalLiquidityZero);
        }
        Ok(PremiumRate(self.annual_rate / DIGITS_ADJUSTER))
    }

    fn premium(
        &self,
        amount: Amount,
        span_secs: u64,
        total: Amount,
        locked: Amount,
    ) -> Result<Amount, PremiumError> {
        if amount.saturating_add(locked) > total {
            return Err(PremiumError::AmountExceedsAvailable);
        }
        if total == 0 {
            return Err(PremiumError::TotalLiquidityZero);
        }
        Ok(math::product_div(
            &[amount, self.annual_rate, span_secs as u128],
            BASE * YEAR as u128,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const E18: u128 = 1_000_000_000_000_000_000;

    fn reference_premium(p: &CurveParams, b: u128, amount: u128, span: u64, total: u128, locked: u128) -> f64 {
        let base = BASE as f64;
        let u1 = base - (locked * BASE / total) as f64;
        let u2 = base - ((locked + amount) * BASE / total) as f64;
        let integral = |u: f64| {
            (p.k * 365) as f64 * (u + p.a as f64).ln() + (b as f64 - (p.a * 365) as f64) * u
        };
        (integral(u1) - integral(u2)) * amount as f64 * span as f64 / YEAR as f64 / 1e12
    }

    #[test]
    fn current_rate_at_high_utilization() {
        let curve = BondingPremium::default();
        let rate = curve.current_rate(1_000_000 * E18, 790_000 * E18).unwrap();
        assert_eq!(rate, PremiumRate(44_135));
    }

    #[test]
    fn current_rate_hits_forty_percent() {
        let curve = BondingPremium::default();
        let rate = curve.current_rate(1_000_000 * E18, 771_863 * E18).unwrap();
        assert_eq!(rate, PremiumRate(40_000));
    }

    #[test]
    fn low_risk_regime_uses_reduced_fee() {
        let mut curve = BondingPremium::default();
        curve.set_premium2(1_000_000_000_000, 5_000, 100_000).unwrap();
        let rate = curve.current_rate(1_000_000 * E18, 10_000 * E18).unwrap();
        assert_eq!(rate, PremiumRate(610));
    }

    #[test]
    fn premium_matches_closed_form() {
        let curve = BondingPremium::default();
        let (total, locked, amount) = (1_000_000 * E18, 0, 600_000 * E18);
        let got = curve.premium(amount, YEAR, total, locked).unwrap() as f64;
        let want = reference_premium(curve.params(), 30_000, amount, YEAR, total, locked);
        assert!((got - want).abs() <= want / 100_000.0, "got {} want {}", got, want);
    }

    #[test]
    fn premium_low_risk_matches_closed_form() {
        let mut curve = BondingPremium::default();
        curve.set_premium2(1_000_000_000_000, 5_000, 100_000).unwrap();
        let (total, locked, amount) = (1_000_000 * E18, 0, 10_000 * E18);
        let got = curve.premium(amount, YEAR, total, locked).unwrap() as f64;
        let want = reference_premium(curve.params(), 5_000, amount, YEAR, total, locked);
        assert!((got - want).abs() <= want / 100_000.0, "got {} want {}", got, want);
    }

    #[test]
    fn premium_zero_amount_is_free() {
        let curve = BondingPremium::default();
        assert_eq!(curve.premium(0, YEAR, 1_000_000 * E18, 0).unwrap(), 0);
    }

    #[test]
    fn premium_rejects_empty_and_overdrawn_pools() {
        let curve = BondingPremium::default();
        assert_eq!(curve.premium(0, YEAR, 0, 0), Err(PremiumError::TotalLiquidityZero));
        assert_eq!(
            curve.premium(0, YEAR, 10 * E18, 11 * E18),
            Err(PremiumError::AmountExceedsAvailable)
        );
    }

    #[test]
    fn set_premium_derives_a() {
        let mut curve = BondingPremium::default();
        let (b, k) = (500_012u128, 302_927_736_472u128);
        curve.set_premium(b, k).unwrap();
        let expected_a = (BASE + math::sqrt(BASE * BASE + 4 * k)) / 2 - BASE;
        assert_eq!(curve.params().a, expected_a);
        assert_eq!(curve.params().b, b);
        assert_eq!(curve.params().k, k);
    }

    #[test]
    fn current_rate_reports_overflow_for_extreme_curve() {
        let curve = BondingPremium::new(CurveParams {
            k: u128::MAX / 365,
            b: 30_000,
            a: u128::MAX / 1_000,
            ..CurveParams::default()
        });
        assert_eq!(
            curve.current_rate(1_000 * E18, 0),
            Err(PremiumError::Math(MathError::Overflow))
        );

        let curve = BondingPremium::new(CurveParams {
            k: 0,
            b: u128::MAX / 2,
            a: 0,
            ..CurveParams::default()
        });
        assert_eq!(
            curve.current_rate(1_000 * E18, 0),
            Err(PremiumError::Math(MathError::Overflow))
        );
    }

    #[test]
    fn set_premium2_rejects_low_risk_above_base() {
        let mut curve = BondingPremium::default();
        let err = curve.set_premium2(1_000_000_000_000, 4_000_030, 100_000).unwrap_err();
        assert!(matches!(err, PremiumError::LowRiskFeeExceedsBaseFee { .. }));
        assert_eq!(curve.params().low_risk_b, 0);
    }

    #[test]
    fn flat_premium_is_linear() {
        let flat = FlatPremium { annual_rate: 100_000 };
        assert_eq!(flat.premium(10_000, YEAR, 100_000, 0).unwrap(), 1_000);
        assert_eq!(flat.premium(10_000, YEAR / 2, 100_000, 0).unwrap(), 500);
    }
}
