// 7.0 config.rs: all protocol settings in one place. fees, timing windows, index leverage, curve.
// 7.1 every pool and index copies its params at creation, so the admin can override one market
// without touching the rest.

use serde::{Deserialize, Serialize};

use crate::lp::WithdrawalWindow;
use crate::math::{self, MathError};
use crate::premium::CurveParams;
use crate::types::{Amount, BASE, DAY, LEVERAGE_SCALE, WEEK, YEAR};

/// `amount * rate / BASE`, rounded down.
pub fn fee_on(amount: Amount, rate: u128) -> Result<Amount, MathError> {
    math::mul_div(amount, rate, BASE)
}

/** 7.2: per pool settings */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolParams {
    // Share of every premium routed to the treasury, BASE scaled (100_000 = 10%)
    pub fee_rate: u128,
    // Share of every premium routed to the reserve, BASE scaled
    pub reserve_rate: u128,
    // Cut of each LP deposit kept by the treasury, BASE scaled
    pub deposit_fee: u128,
    // Seconds between a withdrawal request and the opening of its window
    pub lockup_secs: u64,
    // Seconds the withdrawal window stays open
    pub withdrawable_secs: u64,
    // Seconds after cover expiry before the locked amount can be released
    pub grace_secs: u64,
    // Shortest cover that can be bought
    pub min_span_secs: u64,
    // Longest cover that can be bought
    pub max_span_secs: u64,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            fee_rate: 100_000, // 10%
            reserve_rate: 0,
            deposit_fee: 0,
            lockup_secs: WEEK,
            withdrawable_secs: 2 * WEEK,
            grace_secs: 3 * DAY,
            min_span_secs: WEEK,
            max_span_secs: YEAR,
        }
    }
}

impl PoolParams {
    pub fn withdrawal_window(&self) -> WithdrawalWindow {
        WithdrawalWindow {
            lockup: self.lockup_secs,
            window: self.withdrawable_secs,
        }
    }
}

/** 7.3: per index settings. leverage and slacks in LEVERAGE_SCALE units (1_000 = 1x) */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    pub target_leverage: u128,
    // Leverage may drift this far above target before a withdrawal forces a rebalance
    pub upper_slack: u128,
    // Leverage may drift this far below target before a deposit forces a rebalance
    pub lower_slack: u128,
    // Maximum number of pool slots
    pub max_list: usize,
    pub deposit_fee: u128,
    pub lockup_secs: u64,
    pub withdrawable_secs: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            target_leverage: 2_000, // 2x
            upper_slack: 500,
            lower_slack: 500,
            max_list: 10,
            deposit_fee: 0,
            lockup_secs: WEEK,
            withdrawable_secs: 2 * WEEK,
        }
    }
}

impl IndexParams {
    pub fn withdrawal_window(&self) -> WithdrawalWindow {
        WithdrawalWindow {
            lockup: self.lockup_secs,
            window: self.withdrawable_secs,
        }
    }
}

/** 7.4: reserve settings. the reserve backs indices that cannot pay their share of a claim */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveParams {
    pub deposit_fee: u128,
    pub lockup_secs: u64,
    pub withdrawable_secs: u64,
}

impl Default for ReserveParams {
    fn default() -> Self {
        Self {
            deposit_fee: 0,
            lockup_secs: WEEK,
            withdrawable_secs: 2 * WEEK,
        }
    }
}

impl ReserveParams {
    pub fn withdrawal_window(&self) -> WithdrawalWindow {
        WithdrawalWindow {
            lockup: self.lockup_secs,
            window: self.withdrawable_secs,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_deposit_fee(self.deposit_fee)?;
        if self.withdrawable_secs == 0 {
            return Err(ConfigError::InvalidWindow {
                reason: "Withdrawal window must be open for some time".to_string(),
            });
        }
        Ok(())
    }
}

// The complete protocol configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub pool: PoolParams,
    pub index: IndexParams,
    pub reserve: ReserveParams,
    pub curve: CurveParams,
}

impl ProtocolConfig {
    // Short windows for test deployments
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.pool.lockup_secs = 3_600;
        config.pool.withdrawable_secs = DAY;
        config.pool.grace_secs = 3_600;
        config.pool.min_span_secs = DAY;
        config.index.lockup_secs = 3_600;
        config.index.withdrawable_secs = DAY;
        config.reserve.lockup_secs = 3_600;
        config.reserve.withdrawable_secs = DAY;
        config
    }

    // Unlevered indices and a heavier treasury cut
    pub fn conservative() -> Self {
        let mut config = Self::default();
        config.pool.fee_rate = 150_000; // 15%
        config.pool.reserve_rate = 50_000; // 5%
        config.pool.lockup_secs = 2 * WEEK;
        config.index.target_leverage = LEVERAGE_SCALE;
        config.index.upper_slack = 100;
        config.index.lower_slack = 100;
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool.validate()?;
        self.index.validate()?;
        self.reserve.validate()?;

        let curve = &self.curve;
        if curve.a == 0 || curve.k == 0 {
            return Err(ConfigError::InvalidCurve {
                reason: "a and k must be positive".to_string(),
            });
        }
        // rate numerator k*365 - Q*a*365 stays non negative only while k >= a * (BASE + a)
        if curve.k < curve.a * (BASE + curve.a) {
            return Err(ConfigError::InvalidCurve {
                reason: "k must be at least a * (BASE + a)".to_string(),
            });
        }
        if curve.low_risk_b > curve.b {
            return Err(ConfigError::InvalidCurve {
                reason: "low risk fee exceeds base fee".to_string(),
            });
        }
        Ok(())
    }
}

impl PoolParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fee_rate > BASE {
            return Err(ConfigError::InvalidFees {
                reason: "Fee rate above 100%".to_string(),
            });
        }
        if self.fee_rate.saturating_add(self.reserve_rate) > BASE {
            return Err(ConfigError::InvalidFees {
                reason: "Treasury and reserve shares exceed the premium".to_string(),
            });
        }
        check_deposit_fee(self.deposit_fee)?;
        if self.withdrawable_secs == 0 {
            return Err(ConfigError::InvalidWindow {
                reason: "Withdrawal window must be open for some time".to_string(),
            });
        }
        if self.min_span_secs > self.max_span_secs || self.max_span_secs > YEAR {
            return Err(ConfigError::InvalidWindow {
                reason: "Cover span bounds must satisfy min <= max <= 365 days".to_string(),
            });
        }
        Ok(())
    }
}

impl IndexParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_leverage < LEVERAGE_SCALE {
            return Err(ConfigError::InvalidLeverage {
                reason: "Target leverage below 1x".to_string(),
            });
        }
        if self.lower_slack > self.target_leverage {
            return Err(ConfigError::InvalidLeverage {
                reason: "Lower slack exceeds target".to_string(),
            });
        }
        check_deposit_fee(self.deposit_fee)?;
        if self.max_list == 0 {
            return Err(ConfigError::InvalidIndex {
                reason: "Index needs at least one slot".to_string(),
            });
        }
        if self.withdrawable_secs == 0 {
            return Err(ConfigError::InvalidWindow {
                reason: "Withdrawal window must be open for some time".to_string(),
            });
        }
        Ok(())
    }
}

// a deposit must always mint something
fn check_deposit_fee(rate: u128) -> Result<(), ConfigError> {
    if rate >= BASE {
        return Err(ConfigError::InvalidFees {
            reason: "Deposit fee must stay below 100%".to_string(),
        });
    }
    Ok(())
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid fees: {reason}")]
    InvalidFees { reason: String },
    #[error("Invalid window: {reason}")]
    InvalidWindow { reason: String },
    #[error("Invalid leverage: {reason}")]
    InvalidLeverage { reason: String },
    #[error("Invalid index: {reason}")]
    InvalidIndex { reason: String },
    #[error("Invalid curve: {reason}")]
    InvalidCurve { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ProtocolConfig {
        match self {
            Environment::Development => ProtocolConfig::default(),
            Environment::Testnet => ProtocolConfig::testnet(),
            Environment::Mainnet => ProtocolConfig::conservative(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool.fee_rate, 100_000);
        assert_eq!(config.curve.k, 300_100_000);
    }

    #[test]
    fn test_presets_valid() {
        assert!(Environment::Development.config().validate().is_ok());
        assert!(Environment::Testnet.config().validate().is_ok());
        assert!(Environment::Mainnet.config().validate().is_ok());
        assert_eq!(ProtocolConfig::conservative().index.target_leverage, 1_000);
    }

    #[test]
    fn test_invalid_fee() {
        let mut config = ProtocolConfig::default();
        config.pool.fee_rate = BASE + 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFees { .. })));
    }

    #[test]
    fn test_reserve_and_treasury_shares_capped() {
        let mut config = ProtocolConfig::default();
        config.pool.reserve_rate = BASE - config.pool.fee_rate;
        assert!(config.validate().is_ok());
        config.pool.reserve_rate += 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFees { .. })));
    }

    #[test]
    fn test_full_deposit_fee_rejected() {
        let mut config = ProtocolConfig::default();
        config.index.deposit_fee = BASE;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFees { .. })));
        let mut config = ProtocolConfig::default();
        config.reserve.deposit_fee = BASE;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFees { .. })));
    }

    #[test]
    fn test_fee_on_rounds_down() {
        assert_eq!(fee_on(10_000, 1_000).unwrap(), 10);
        assert_eq!(fee_on(999, 1_000).unwrap(), 0);
    }

    #[test]
    fn test_invalid_span_bounds() {
        let mut config = ProtocolConfig::default();
        config.pool.min_span_secs = YEAR + 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWindow { .. })));
    }

    #[test]
    fn test_invalid_leverage() {
        let mut config = ProtocolConfig::default();
        config.index.target_leverage = 900;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLeverage { .. })));
    }

    #[test]
    fn test_low_risk_fee_rejected_at_configuration() {
        let mut config = ProtocolConfig::default();
        config.curve.low_risk_b = config.curve.b + 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCurve { .. })));
    }

    #[test]
    fn test_config_serialization() {
        let config = ProtocolConfig::testnet();
        let json = serde_json::to_string(&config).unwrap();
        let back: ProtocolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
