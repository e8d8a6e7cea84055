// 13.0 reserve.rs: the reserve market. LPs fund a backstop that earns a cut of every
// premium and pays the part of a claim an index could not cover from its own value.

use crate::config::{self, ReserveParams};
use crate::ledger::{LedgerError, VaultLedger};
use crate::lp::{LpBook, LpError};
use crate::math::MathError;
use crate::types::{AccountId, Amount, Holder, PoolId, Rate, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReserveError {
    #[error("Deposits are disabled")]
    DepositDisabled,

    #[error("Amount is zero")]
    ZeroAmount,

    #[error("Withdrawals are frozen while a claim is paid out")]
    WithdrawalPending,

    #[error("LP error: {0}")]
    Lp(#[from] LpError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

#[derive(Debug, Clone, Default)]
pub struct Reserve {
    pub paused: bool,
    pub params: ReserveParams,
    lp: LpBook,
}

impl Reserve {
    pub fn new(params: ReserveParams) -> Self {
        Self {
            paused: false,
            params,
            lp: LpBook::default(),
        }
    }

    pub fn holder(&self) -> Holder {
        Holder::Reserve
    }

    pub fn lp(&self) -> &LpBook {
        &self.lp
    }

    // 13.1: views. the reserve owns its whole attribution, premiums included.
    pub fn total_liquidity(&self, ledger: &VaultLedger) -> Amount {
        ledger.underlying_value(self.holder())
    }

    pub fn rate(&self, ledger: &VaultLedger) -> Rate {
        self.lp.rate(self.total_liquidity(ledger))
    }

    pub fn value_of_shares(&self, ledger: &VaultLedger, shares: u128) -> Result<Amount, MathError> {
        self.lp.value_of(shares, self.total_liquidity(ledger))
    }

    // 13.2: LP flows
    /// Mints shares for `amount` net of the deposit fee. Returns `(shares, fee)`.
    pub fn deposit(
        &mut self,
        ledger: &mut VaultLedger,
        account: AccountId,
        amount: Amount,
    ) -> Result<(u128, Amount), ReserveError> {
        if self.paused {
            return Err(ReserveError::DepositDisabled);
        }
        if amount == 0 {
            return Err(ReserveError::ZeroAmount);
        }
        let fee = config::fee_on(amount, self.params.deposit_fee)?;
        let net = amount - fee;
        let shares = self.lp.worth(net, self.total_liquidity(ledger))?;
        ledger.add_value(net, self.holder())?;
        if fee > 0 {
            ledger.add_value(fee, Holder::Treasury)?;
        }
        self.lp.mint(account, shares);
        Ok((shares, fee))
    }

    pub fn request_withdraw(&mut self, account: AccountId, shares: u128, now: Timestamp) -> Result<(), ReserveError> {
        Ok(self.lp.request_withdraw(account, shares, now)?)
    }

    /// Redeems queued shares. `claims_pending` is true while any pool pays out.
    pub fn withdraw(
        &mut self,
        ledger: &mut VaultLedger,
        account: AccountId,
        shares: u128,
        now: Timestamp,
        claims_pending: bool,
    ) -> Result<Amount, ReserveError> {
        if claims_pending {
            return Err(ReserveError::WithdrawalPending);
        }
        self.lp
            .check_withdrawal(account, shares, now, self.params.withdrawal_window())?;
        let value = self.value_of_shares(ledger, shares)?;
        self.lp.burn(account, shares)?;
        self.lp.consume_request(account, shares);
        if value == 0 {
            return Ok(0);
        }
        Ok(ledger.withdraw_value(value, self.holder())?.paid)
    }

    // 13.3: claims
    /// Covers up to `amount` of `pool`'s claim debt. Returns what was paid.
    pub fn compensate(&mut self, ledger: &mut VaultLedger, pool: PoolId, amount: Amount) -> Result<Amount, ReserveError> {
        let paid = amount.min(self.total_liquidity(ledger));
        if paid > 0 {
            ledger.offset_debt(paid, self.holder(), Holder::Pool(pool))?;
        }
        Ok(paid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DAY, WEEK};

    const LP: AccountId = AccountId(1);

    #[test]
    fn deposit_fee_goes_to_treasury() {
        let mut ledger = VaultLedger::new();
        let mut reserve = Reserve::new(ReserveParams {
            deposit_fee: 10_000, // 1%
            ..ReserveParams::default()
        });
        let (shares, fee) = reserve.deposit(&mut ledger, LP, 10_000).unwrap();
        assert_eq!(fee, 100);
        assert_eq!(shares, 9_900);
        assert_eq!(reserve.total_liquidity(&ledger), 9_900);
        assert_eq!(ledger.underlying_value(Holder::Treasury), 100);
    }

    #[test]
    fn compensate_is_capped_by_liquidity() {
        let mut ledger = VaultLedger::new();
        let mut reserve = Reserve::default();
        reserve.deposit(&mut ledger, LP, 1_000).unwrap();
        ledger.add_value(5_000, Holder::Pool(PoolId(1))).unwrap();
        ledger.borrow_value(3_000, Holder::Pool(PoolId(1))).unwrap();

        assert_eq!(reserve.compensate(&mut ledger, PoolId(1), 2_500).unwrap(), 1_000);
        assert_eq!(reserve.total_liquidity(&ledger), 0);
        assert_eq!(ledger.debt_of(Holder::Pool(PoolId(1))), 2_000);
        assert_eq!(reserve.compensate(&mut ledger, PoolId(1), 500).unwrap(), 0);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn withdraw_waits_for_lockup_and_claims() {
        let mut ledger = VaultLedger::new();
        let mut reserve = Reserve::default();
        reserve.deposit(&mut ledger, LP, 1_000).unwrap();
        reserve.request_withdraw(LP, 400, Timestamp(0)).unwrap();

        let err = reserve.withdraw(&mut ledger, LP, 400, Timestamp(DAY), false).unwrap_err();
        assert_eq!(err, ReserveError::Lp(LpError::WithdrawalQueueNotElapsed));
        let open = Timestamp(WEEK + 1);
        let err = reserve.withdraw(&mut ledger, LP, 400, open, true).unwrap_err();
        assert_eq!(err, ReserveError::WithdrawalPending);
        assert_eq!(reserve.withdraw(&mut ledger, LP, 400, open, false).unwrap(), 400);
        assert_eq!(reserve.total_liquidity(&ledger), 600);
    }

    #[test]
    fn paused_reserve_refuses_deposits() {
        let mut ledger = VaultLedger::new();
        let mut reserve = Reserve::default();
        reserve.paused = true;
        assert_eq!(
            reserve.deposit(&mut ledger, LP, 1).unwrap_err(),
            ReserveError::DepositDisabled
        );
    }
}
