// 12.0.2: result types and errors for protocol operations.

use crate::config::ConfigError;
use crate::custody::CustodyError;
use crate::index::IndexError;
use crate::ledger::LedgerError;
use crate::math::MathError;
use crate::pool::PoolError;
use crate::premium::PremiumError;
use crate::reserve::ReserveError;
use crate::types::{Amount, IndexId, PoolId};

/// How a finished claim's debt was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeReport {
    pub pool: PoolId,
    pub debt: Amount,
    pub compensations: Vec<(IndexId, Amount)>,
    /// index shortfalls the reserve paid, per index
    pub reserve_compensations: Vec<(IndexId, Amount)>,
    pub offset_by_pool: Amount,
    /// debt nobody could cover, now owed by `Holder::Unresolved`
    pub shortage: Amount,
    pub resumed_indices: Vec<IndexId>,
}

impl ResumeReport {
    pub fn compensated(&self) -> Amount {
        self.compensations.iter().map(|(_, amount)| amount).sum()
    }

    pub fn from_reserve(&self) -> Amount {
        self.reserve_compensations.iter().map(|(_, amount)| amount).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Caller is not the protocol owner")]
    Unauthorized,

    #[error("Zero address")]
    ZeroAddress,

    #[error("Pool {0:?} not found")]
    PoolNotFound(PoolId),

    #[error("Index {0:?} not found")]
    IndexNotFound(IndexId),

    #[error("Index {0:?} is locked by a pending claim")]
    IndexLocked(IndexId),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Premium error: {0}")]
    Premium(#[from] PremiumError),

    #[error("Reserve error: {0}")]
    Reserve(#[from] ReserveError),

    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}
