// 1.0: all the primitives live here. ids, amounts, ratios, timestamps.
// each is a newtype so the compiler catches a pool id passed where an index id belongs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 1e6 fixed point. fee rates, utilization, share splits.
pub const BASE: u128 = 1_000_000;
/// 1e3 fixed point for index leverage. 2_000 = 2x.
pub const LEVERAGE_SCALE: u128 = 1_000;
/// reward-per-credit accumulator scale.
pub const REWARD_SCALE: u128 = 1_000_000_000_000_000_000;
pub const DAY: u64 = 86_400;
pub const WEEK: u64 = 7 * DAY;
pub const YEAR: u64 = 365 * DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl AccountId {
    /// the null account. never a valid beneficiary.
    pub const NULL: AccountId = AccountId(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InsuranceId(pub u64);

// 1.1: who owns attribution or debt inside the vault ledger.
// keyed by stable identifiers so pools and indices can reference each other freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Holder {
    Account(AccountId),
    Pool(PoolId),
    Index(IndexId),
    Treasury,
    /// backstop market that covers index shortfalls.
    Reserve,
    /// shortfall nobody could cover during a claim.
    Unresolved,
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Account(id) => write!(f, "account:{}", id.0),
            Holder::Pool(id) => write!(f, "pool:{}", id.0),
            Holder::Index(id) => write!(f, "index:{}", id.0),
            Holder::Treasury => write!(f, "treasury"),
            Holder::Reserve => write!(f, "reserve"),
            Holder::Unresolved => write!(f, "unresolved"),
        }
    }
}

// saturates at Decimal::MAX. display only, never fed back into accounting.
fn scaled(value: u128, scale: u32) -> Decimal {
    i128::try_from(value)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, scale).ok())
        .map(|d| d.normalize())
        .unwrap_or(Decimal::MAX)
}

// 1.2: underlying token amount. smallest unit, so 1e18 per token for 18 decimal assets.
pub type Amount = u128;

// 1.3: vault ownership units. only meaningful relative to total attributions.
pub type Attribution = u128;

// 1.4: proportion in BASE (1e6) units. 100_000 = 10%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rate(pub u128);

impl Rate {
    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn as_fraction(&self) -> Decimal {
        scaled(self.0, 6)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_fraction() * Decimal::ONE_HUNDRED)
    }
}

// 1.5: index leverage in LEVERAGE_SCALE units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Leverage(pub u128);

impl Leverage {
    pub fn value(&self) -> u128 {
        self.0
    }

    // 2_000 → 2x
    pub fn as_multiple(&self) -> Decimal {
        scaled(self.0, 3)
    }
}

impl fmt::Display for Leverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.as_multiple())
    }
}

// 1.6: annual premium rate quoted by the curve. 100_000 = 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PremiumRate(pub u128);

impl PremiumRate {
    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn as_fraction(&self) -> Decimal {
        scaled(self.0, 5)
    }
}

impl fmt::Display for PremiumRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}% APR", self.as_fraction() * Decimal::ONE_HUNDRED)
    }
}

// 1.7: opaque 32 byte identifier. cover targets and merkle roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);
}

// 1.8: second resolution timestamp. everything in the protocol is measured in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp().max(0) as u64)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn plus(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp(self.0 as i64, 0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{}s", self.0),
        }
    }
}
