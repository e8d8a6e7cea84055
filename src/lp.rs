// 5.0 lp.rs: LP share book shared by pools and indices. mint/burn, share pricing,
// and the request-then-withdraw queue that keeps capital from fleeing ahead of a claim.

use crate::math::{self, MathError};
use crate::types::{AccountId, Amount, Rate, Timestamp, BASE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LpError {
    #[error("Lockup since the withdrawal request has not elapsed")]
    WithdrawalQueueNotElapsed,

    #[error("No active withdrawal request")]
    NoActiveWithdrawalRequest,

    #[error("Withdrawal of {requested} exceeds requested {queued}")]
    WithdrawalExceedsRequest { requested: u128, queued: u128 },

    #[error("Withdrawal amount is zero")]
    WithdrawalZero,

    #[error("{account:?} holds {held} shares, needs {requested}")]
    InsufficientLpBalance {
        account: AccountId,
        requested: u128,
        held: u128,
    },

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub timestamp: Timestamp,
    pub amount: u128,
}

/// Withdrawals open `lockup` seconds after the request and stay open for `window` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalWindow {
    pub lockup: u64,
    pub window: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LpBook {
    total_supply: u128,
    balances: BTreeMap<AccountId, u128>,
    requests: BTreeMap<AccountId, WithdrawalRequest>,
}

impl LpBook {
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn balance_of(&self, account: AccountId) -> u128 {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    pub fn request_of(&self, account: AccountId) -> WithdrawalRequest {
        self.requests.get(&account).copied().unwrap_or_default()
    }

    // 5.1: shares for `value` entering a book currently worth `liquidity`.
    // an empty book prices 1:1; a book wiped to zero value prices every new unit against the old supply.
    pub fn worth(&self, value: Amount, liquidity: Amount) -> Result<u128, MathError> {
        match (self.total_supply, liquidity) {
            (0, _) => Ok(value),
            (supply, 0) => value.checked_mul(supply).ok_or(MathError::Overflow),
            (supply, liquidity) => math::mul_div(value, supply, liquidity),
        }
    }

    /// Value redeemable for `shares`, rounded down.
    pub fn value_of(&self, shares: u128, liquidity: Amount) -> Result<Amount, MathError> {
        math::mul_div_or_zero(shares, liquidity, self.total_supply)
    }

    /// Liquidity per share in BASE units. 0 for an empty book.
    pub fn rate(&self, liquidity: Amount) -> Rate {
        Rate(math::mul_div_or_zero(liquidity, BASE, self.total_supply).unwrap_or(u128::MAX))
    }

    pub fn mint(&mut self, to: AccountId, shares: u128) {
        if shares == 0 {
            return;
        }
        *self.balances.entry(to).or_insert(0) += shares;
        self.total_supply += shares;
    }

    pub fn burn(&mut self, from: AccountId, shares: u128) -> Result<(), LpError> {
        let held = self.balance_of(from);
        if held < shares {
            return Err(LpError::InsufficientLpBalance {
                account: from,
                requested: shares,
                held,
            });
        }
        if held == shares {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, held - shares);
        }
        self.total_supply -= shares;
        Ok(())
    }

    // 5.2: withdrawal queue. a new request replaces the old one and restarts the lockup.
    pub fn request_withdraw(&mut self, account: AccountId, shares: u128, now: Timestamp) -> Result<(), LpError> {
        if shares == 0 {
            return Err(LpError::WithdrawalZero);
        }
        let held = self.balance_of(account);
        if held < shares {
            return Err(LpError::InsufficientLpBalance {
                account,
                requested: shares,
                held,
            });
        }
        self.requests.insert(
            account,
            WithdrawalRequest {
                timestamp: now,
                amount: shares,
            },
        );
        Ok(())
    }

    pub fn check_withdrawal(
        &self,
        account: AccountId,
        shares: u128,
        now: Timestamp,
        window: WithdrawalWindow,
    ) -> Result<(), LpError> {
        let request = self.request_of(account);
        let opens = request.timestamp.plus(window.lockup);
        if opens >= now {
            return Err(LpError::WithdrawalQueueNotElapsed);
        }
        if now >= opens.plus(window.window) {
            return Err(LpError::NoActiveWithdrawalRequest);
        }
        if shares > request.amount {
            return Err(LpError::WithdrawalExceedsRequest {
                requested: shares,
                queued: request.amount,
            });
        }
        if shares == 0 {
            return Err(LpError::WithdrawalZero);
        }
        Ok(())
    }

    pub fn consume_request(&mut self, account: AccountId, shares: u128) {
        if let Some(request) = self.requests.get_mut(&account) {
            request.amount = request.amount.saturating_sub(shares);
            if request.amount == 0 {
                self.requests.remove(&account);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: AccountId = AccountId(1);
    const WINDOW: WithdrawalWindow = WithdrawalWindow {
        lockup: 100,
        window: 50,
    };

    #[test]
    fn worth_prices_against_liquidity() {
        let mut book = LpBook::default();
        assert_eq!(book.worth(1_000, 0).unwrap(), 1_000);
        book.mint(ALICE, 1_000);
        // liquidity doubled through premiums: half the shares per unit
        assert_eq!(book.worth(1_000, 2_000).unwrap(), 500);
        // liquidity wiped out by a claim
        assert_eq!(book.worth(3, 0).unwrap(), 3_000);
        assert_eq!(book.value_of(500, 2_000).unwrap(), 1_000);
        assert_eq!(book.rate(2_000), Rate(2 * BASE));
    }

    #[test]
    fn burn_more_than_held_fails() {
        let mut book = LpBook::default();
        book.mint(ALICE, 10);
        assert!(matches!(book.burn(ALICE, 11), Err(LpError::InsufficientLpBalance { .. })));
        book.burn(ALICE, 10).unwrap();
        assert_eq!(book.total_supply(), 0);
    }

    #[test]
    fn withdrawal_window_ordering() {
        let mut book = LpBook::default();
        book.mint(ALICE, 10);
        book.request_withdraw(ALICE, 6, Timestamp(1_000)).unwrap();

        let at = |t| book.check_withdrawal(ALICE, 6, Timestamp(t), WINDOW);
        assert_eq!(at(1_100), Err(LpError::WithdrawalQueueNotElapsed));
        assert_eq!(at(1_101), Ok(()));
        assert_eq!(at(1_149), Ok(()));
        assert_eq!(at(1_150), Err(LpError::NoActiveWithdrawalRequest));

        assert!(matches!(
            book.check_withdrawal(ALICE, 7, Timestamp(1_120), WINDOW),
            Err(LpError::WithdrawalExceedsRequest { .. })
        ));
        assert_eq!(
            book.check_withdrawal(ALICE, 0, Timestamp(1_120), WINDOW),
            Err(LpError::WithdrawalZero)
        );
    }

    #[test]
    fn request_needs_balance() {
        let mut book = LpBook::default();
        book.mint(ALICE, 5);
        assert!(book.request_withdraw(ALICE, 6, Timestamp(0)).is_err());
        book.request_withdraw(ALICE, 5, Timestamp(0)).unwrap();
        book.consume_request(ALICE, 2);
        assert_eq!(book.request_of(ALICE).amount, 3);
    }
}
