// 10.0 custody.rs: token movement at the edge of the protocol. the ledger only books value;
// this is where tokens actually change hands. operations queue transfers and the engine
// settles the whole queue after the internal state has committed.

use crate::types::{AccountId, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

/// Token holders outside the ledger's attribution model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Account(AccountId),
    /// the shared vault every pool and index books value against
    Vault,
    /// external strategy holding the vault's utilized value
    YieldController,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Account(id) => write!(f, "account:{}", id.0),
            Party::Vault => write!(f, "vault"),
            Party::YieldController => write!(f, "yield-controller"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: Party,
    pub to: Party,
    pub amount: Amount,
}

impl Transfer {
    pub fn into_vault(from: AccountId, amount: Amount) -> Self {
        Self {
            from: Party::Account(from),
            to: Party::Vault,
            amount,
        }
    }

    pub fn out_of_vault(to: AccountId, amount: Amount) -> Self {
        Self {
            from: Party::Vault,
            to: Party::Account(to),
            amount,
        }
    }
}

/// Settled transfer as recorded by a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub tx_id: TxId,
    pub transfer: Transfer,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CustodyError {
    #[error("{party} holds {available}, transfer needs {requested}")]
    InsufficientBalance {
        party: Party,
        available: Amount,
        requested: Amount,
    },

    #[error("Transfer to the null account")]
    NullRecipient,

    #[error("Token supply overflow")]
    SupplyOverflow,
}

/// ERC20-like capital movement. Implement this for a real token or chain adapter.
pub trait TokenGateway: fmt::Debug {
    fn balance_of(&self, party: Party) -> Amount;

    fn transfer(&mut self, transfer: &Transfer) -> Result<TxId, CustodyError>;

    /// Replays `batch` against current balances without moving anything.
    fn validate_batch(&self, batch: &[Transfer]) -> Result<(), CustodyError> {
        let mut pending: BTreeMap<Party, Amount> = BTreeMap::new();
        for transfer in batch {
            if transfer.to == Party::Account(AccountId::NULL) {
                return Err(CustodyError::NullRecipient);
            }
            let available = *pending
                .entry(transfer.from)
                .or_insert_with(|| self.balance_of(transfer.from));
            if available < transfer.amount {
                return Err(CustodyError::InsufficientBalance {
                    party: transfer.from,
                    available,
                    requested: transfer.amount,
                });
            }
            pending.insert(transfer.from, available - transfer.amount);
            let received = pending
                .entry(transfer.to)
                .or_insert_with(|| self.balance_of(transfer.to));
            *received = received.checked_add(transfer.amount).ok_or(CustodyError::SupplyOverflow)?;
        }
        Ok(())
    }
}

// 10.1: in-memory token. balances and a transfer history, nothing else.
#[derive(Debug, Clone, Default)]
pub struct InMemoryToken {
    balances: BTreeMap<Party, Amount>,
    total_supply: Amount,
    history: Vec<TransferRecord>,
    next_tx_id: u64,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates tokens out of thin air. Faucet for simulations and yield accrual.
    pub fn mint(&mut self, to: Party, amount: Amount) -> Result<(), CustodyError> {
        self.total_supply = self.total_supply.checked_add(amount).ok_or(CustodyError::SupplyOverflow)?;
        *self.balances.entry(to).or_insert(0) += amount;
        Ok(())
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn history(&self) -> &[TransferRecord] {
        &self.history
    }
}

impl TokenGateway for InMemoryToken {
    fn balance_of(&self, party: Party) -> Amount {
        self.balances.get(&party).copied().unwrap_or(0)
    }

    fn transfer(&mut self, transfer: &Transfer) -> Result<TxId, CustodyError> {
        self.validate_batch(std::slice::from_ref(transfer))?;
        if transfer.amount > 0 {
            if let Some(from) = self.balances.get_mut(&transfer.from) {
                *from -= transfer.amount;
            }
            *self.balances.entry(transfer.to).or_insert(0) += transfer.amount;
        }
        let tx_id = TxId(self.next_tx_id);
        self.next_tx_id += 1;
        self.history.push(TransferRecord {
            tx_id,
            transfer: *transfer,
        });
        Ok(tx_id)
    }
}
