// 11.0: every committed state change produces an event. audit trail for depositors,
// underwriters and claimants. the EventPayload enum lists all event types.

use crate::types::{AccountId, Amount, Hash32, IndexId, InsuranceId, PoolId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

/// Where LP capital sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Pool(PoolId),
    Index(IndexId),
    Reserve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Registry events
    PoolCreated { pool: PoolId },
    IndexCreated { index: IndexId },

    // LP events
    Deposit(DepositEvent),
    WithdrawRequested(WithdrawRequestedEvent),
    Withdrawal(WithdrawalEvent),

    // Cover events
    Insured(InsuredEvent),
    Unlocked { pool: PoolId, insurance: InsuranceId, amount: Amount },

    // Claim events
    CoverApplied(CoverAppliedEvent),
    Redeemed(RedeemedEvent),
    PoolResumed(PoolResumedEvent),
    Compensated { index: IndexId, pool: PoolId, amount: Amount },
    ReserveCompensated { index: IndexId, pool: PoolId, amount: Amount },
    DebtRepaid { payer: AccountId, amount: Amount, repaid: Amount },

    // Allocation events
    PoolListed(PoolListedEvent),
    AllocationAdjusted(AllocationAdjustedEvent),
    LeverageSet { index: IndexId, target_leverage: u128 },
    SlackSet { index: IndexId, upper: u128, lower: u128 },

    // Admin events
    PoolPaused { pool: PoolId, paused: bool },
    ReservePaused { paused: bool },
    IndexPaused { index: IndexId, paused: bool },
    IndexResumed { index: IndexId },
    PremiumSet { k: u128, b: u128, a: u128 },
    LowRiskPremiumSet { liquidity: u128, b: u128, util: u128 },
    Utilized { amount: Amount },
    Unutilized { amount: Amount },
    YieldAccrued { amount: Amount },
    TreasuryWithdrawal { to: AccountId, amount: Amount },

    // Rejections
    OperationRejected(OperationRejectedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub market: Market,
    pub account: AccountId,
    pub amount: Amount,
    pub fee: Amount,
    pub shares: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequestedEvent {
    pub market: Market,
    pub account: AccountId,
    pub shares: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    pub market: Market,
    pub account: AccountId,
    pub shares: u128,
    pub paid: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuredEvent {
    pub pool: PoolId,
    pub insurance: InsuranceId,
    pub insured: AccountId,
    pub agent: AccountId,
    pub target: Hash32,
    pub amount: Amount,
    pub premium: Amount,
    pub protocol_fee: Amount,
    pub reserve_premium: Amount,
    pub end: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverAppliedEvent {
    pub pool: PoolId,
    pub payout_numerator: u128,
    pub payout_denominator: u128,
    pub incident_timestamp: Timestamp,
    pub pending_end: Timestamp,
    pub locked_indices: Vec<IndexId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemedEvent {
    pub pool: PoolId,
    pub insurance: InsuranceId,
    pub claimant: AccountId,
    pub payout: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolResumedEvent {
    pub pool: PoolId,
    pub debt: Amount,
    pub compensated: Amount,
    pub from_reserve: Amount,
    pub offset_by_pool: Amount,
    pub shortage: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolListedEvent {
    pub index: IndexId,
    pub slot: usize,
    pub pool: Option<PoolId>,
    pub weight: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationAdjustedEvent {
    pub index: IndexId,
    pub target_credit: Amount,
    pub total_allocated: Amount,
    pub idle: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRejectedEvent {
    pub operation: String,
    pub reason: String,
}
