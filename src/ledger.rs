// 4.0: shared vault ledger. one token balance, many holders. ownership is tracked in
// attribution units so a deposit, a premium or a loss reprices every holder in O(1).
// debt records value paid out (claims) before the backing holder has been charged.

use crate::math::{self, MathError};
use crate::types::{Amount, Attribution, Holder, BASE};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Beneficiary shares must sum to {}, got {0}", BASE)]
    IncorrectShares(u128),

    #[error("Batch has no beneficiaries")]
    NoBeneficiaries,

    #[error("{0} holds no attribution")]
    NoAttribution(Holder),

    #[error("{holder} holds {available} in value, requested {requested}")]
    InsufficientValue {
        holder: Holder,
        requested: Amount,
        available: Amount,
    },

    #[error("{holder} holds {held} attribution, requested {requested}")]
    InsufficientAttribution {
        holder: Holder,
        requested: Attribution,
        held: Attribution,
    },

    #[error("Vault liquidity {available} below requested {requested}")]
    InsufficientLiquidity { requested: Amount, available: Amount },

    #[error("{holder} owes {owed}, cannot clear {requested}")]
    DebtExceeded {
        holder: Holder,
        requested: Amount,
        owed: Amount,
    },

    #[error("Outstanding attributions are backed by no value")]
    WorthlessAttributions,

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

/// What a value withdrawal actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Withdrawal {
    pub burned: Attribution,
    /// tokens leaving the vault. exceeds the request only when the last
    /// holder leaves and rounding dust is swept out with them.
    pub paid: Amount,
}

// 4.1: ledger state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultLedger {
    balance: Amount,
    utilized: Amount,
    total_attributions: Attribution,
    attributions: BTreeMap<Holder, Attribution>,
    debts: BTreeMap<Holder, Amount>,
    total_debt: Amount,
}

impl VaultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn utilized(&self) -> Amount {
        self.utilized
    }

    /// Everything the holders collectively own: tokens on hand plus value parked with the yield controller.
    pub fn value_all(&self) -> Amount {
        self.balance + self.utilized
    }

    /// Tokens physically available for payouts.
    pub fn available(&self) -> Amount {
        self.balance.saturating_sub(self.total_debt)
    }

    pub fn total_attributions(&self) -> Attribution {
        self.total_attributions
    }

    pub fn total_debt(&self) -> Amount {
        self.total_debt
    }

    pub fn attributions_of(&self, holder: Holder) -> Attribution {
        self.attributions.get(&holder).copied().unwrap_or(0)
    }

    pub fn debt_of(&self, holder: Holder) -> Amount {
        self.debts.get(&holder).copied().unwrap_or(0)
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Holder, &Attribution)> {
        self.attributions.iter()
    }

    pub fn debtors(&self) -> impl Iterator<Item = (&Holder, &Amount)> {
        self.debts.iter()
    }

    // 4.2: views. floor division, 0 when nothing is attributed.
    pub fn underlying_value(&self, holder: Holder) -> Amount {
        self.attribution_value(self.attributions_of(holder))
    }

    pub fn attribution_value(&self, units: Attribution) -> Amount {
        // units <= total_attributions keeps the quotient under value_all
        math::mul_div_or_zero(self.value_all(), units, self.total_attributions).unwrap_or(Amount::MAX)
    }

    fn mint_for(&self, amount: Amount) -> Result<Attribution, LedgerError> {
        if self.total_attributions == 0 {
            return Ok(amount);
        }
        if self.value_all() == 0 {
            return Err(LedgerError::WorthlessAttributions);
        }
        Ok(math::mul_div(amount, self.total_attributions, self.value_all())?)
    }

    // attribution covering `amount` of value, rounded against the holder
    fn burn_for(&self, holder: Holder, amount: Amount) -> Result<Attribution, LedgerError> {
        let held = self.attributions_of(holder);
        if held == 0 {
            return Err(LedgerError::NoAttribution(holder));
        }
        let available = self.underlying_value(holder);
        if available < amount {
            return Err(LedgerError::InsufficientValue {
                holder,
                requested: amount,
                available,
            });
        }
        if amount == 0 {
            return Ok(0);
        }
        let units = math::mul_div_up(amount, self.total_attributions, self.value_all())?;
        Ok(units.min(held))
    }

    fn credit(&mut self, holder: Holder, units: Attribution) {
        if units > 0 {
            *self.attributions.entry(holder).or_insert(0) += units;
        }
    }

    fn debit(&mut self, holder: Holder, units: Attribution) {
        if let Some(held) = self.attributions.get_mut(&holder) {
            *held -= units;
            if *held == 0 {
                self.attributions.remove(&holder);
            }
        }
    }

    // tokens on hand must cover `amount`; pull back parked value when they do not
    fn ensure_liquid(&mut self, amount: Amount) -> Result<(), LedgerError> {
        let available = self.available();
        if available >= amount {
            return Ok(());
        }
        let shortfall = amount - available;
        if self.utilized < shortfall {
            return Err(LedgerError::InsufficientLiquidity {
                requested: amount,
                available: available + self.utilized,
            });
        }
        self.utilized -= shortfall;
        self.balance += shortfall;
        Ok(())
    }

    // 4.3: inflows
    pub fn add_value(&mut self, amount: Amount, beneficiary: Holder) -> Result<Attribution, LedgerError> {
        let minted = self.mint_for(amount)?;
        self.balance = self.balance.checked_add(amount).ok_or(MathError::Overflow)?;
        self.total_attributions += minted;
        self.credit(beneficiary, minted);
        Ok(minted)
    }

    /// Splits one inflow across beneficiaries by BASE scaled shares. The last
    /// beneficiary absorbs the rounding remainder.
    pub fn add_value_batch(
        &mut self,
        amount: Amount,
        beneficiaries: &[(Holder, u128)],
    ) -> Result<Vec<Attribution>, LedgerError> {
        if beneficiaries.is_empty() {
            return Err(LedgerError::NoBeneficiaries);
        }
        let share_sum = beneficiaries
            .iter()
            .try_fold(0u128, |acc, (_, share)| acc.checked_add(*share))
            .unwrap_or(u128::MAX);
        if share_sum != BASE {
            return Err(LedgerError::IncorrectShares(share_sum));
        }

        let minted = self.mint_for(amount)?;
        let mut allotted = Vec::with_capacity(beneficiaries.len());
        let mut running = 0;
        for (i, (_, share)) in beneficiaries.iter().enumerate() {
            let units = if i + 1 == beneficiaries.len() {
                minted - running
            } else {
                math::mul_div(minted, *share, BASE)?
            };
            running += units;
            allotted.push(units);
        }

        self.balance = self.balance.checked_add(amount).ok_or(MathError::Overflow)?;
        self.total_attributions += minted;
        for ((holder, _), units) in beneficiaries.iter().zip(&allotted) {
            self.credit(*holder, *units);
        }
        Ok(allotted)
    }

    // 4.4: outflows
    pub fn withdraw_value(&mut self, amount: Amount, from: Holder) -> Result<Withdrawal, LedgerError> {
        let burned = self.burn_for(from, amount)?;
        let mut paid = amount;
        if burned == self.total_attributions && self.total_debt == 0 && self.utilized == 0 {
            paid = self.balance;
        }
        self.ensure_liquid(paid)?;

        self.debit(from, burned);
        self.total_attributions -= burned;
        self.balance -= paid;
        Ok(Withdrawal { burned, paid })
    }

    pub fn transfer_value(&mut self, amount: Amount, from: Holder, to: Holder) -> Result<Attribution, LedgerError> {
        let units = self.burn_for(from, amount)?;
        self.debit(from, units);
        self.credit(to, units);
        Ok(units)
    }

    pub fn transfer_attribution(
        &mut self,
        units: Attribution,
        from: Holder,
        to: Holder,
    ) -> Result<(), LedgerError> {
        let held = self.attributions_of(from);
        if held < units {
            return Err(LedgerError::InsufficientAttribution {
                holder: from,
                requested: units,
                held,
            });
        }
        self.debit(from, units);
        self.credit(to, units);
        Ok(())
    }

    // 4.5: debt. tokens leave now, the borrower is charged later through offset_debt.
    pub fn borrow_value(&mut self, amount: Amount, borrower: Holder) -> Result<(), LedgerError> {
        self.ensure_liquid(amount)?;
        *self.debts.entry(borrower).or_insert(0) += amount;
        self.total_debt += amount;
        Ok(())
    }

    /// Burns `from`'s attribution worth `amount` against `target`'s debt.
    pub fn offset_debt(&mut self, amount: Amount, from: Holder, target: Holder) -> Result<Attribution, LedgerError> {
        self.check_debt(target, amount)?;
        let units = self.burn_for(from, amount)?;
        self.debit(from, units);
        self.total_attributions -= units;
        self.balance -= amount;
        self.reduce_debt(target, amount);
        Ok(units)
    }

    /// Moves debt nobody can cover to the protocol level shortfall account.
    pub fn transfer_debt(&mut self, amount: Amount, from: Holder) -> Result<(), LedgerError> {
        self.check_debt(from, amount)?;
        if amount == 0 {
            return Ok(());
        }
        self.reduce_debt(from, amount);
        *self.debts.entry(Holder::Unresolved).or_insert(0) += amount;
        self.total_debt += amount;
        Ok(())
    }

    /// Fresh tokens pay down `target`'s debt. Returns the part actually applied.
    pub fn repay_debt(&mut self, amount: Amount, target: Holder) -> Amount {
        let repaid = amount.min(self.debt_of(target));
        self.reduce_debt(target, repaid);
        repaid
    }

    fn check_debt(&self, holder: Holder, amount: Amount) -> Result<(), LedgerError> {
        let owed = self.debt_of(holder);
        if owed < amount {
            return Err(LedgerError::DebtExceeded {
                holder,
                requested: amount,
                owed,
            });
        }
        Ok(())
    }

    fn reduce_debt(&mut self, holder: Holder, amount: Amount) {
        if let Some(owed) = self.debts.get_mut(&holder) {
            *owed -= amount;
            if *owed == 0 {
                self.debts.remove(&holder);
            }
        }
        self.total_debt -= amount;
    }

    // 4.6: yield controller. parked value still belongs to the holders.
    pub fn utilize(&mut self, amount: Amount) -> Result<(), LedgerError> {
        let available = self.available();
        if available < amount {
            return Err(LedgerError::InsufficientLiquidity {
                requested: amount,
                available,
            });
        }
        self.balance -= amount;
        self.utilized += amount;
        Ok(())
    }

    /// Gains reported by the yield controller accrue to every holder pro rata.
    pub fn accrue_yield(&mut self, gain: Amount) {
        self.utilized = self.utilized.saturating_add(gain);
    }

    pub fn unutilize(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if self.utilized < amount {
            return Err(LedgerError::InsufficientLiquidity {
                requested: amount,
                available: self.utilized,
            });
        }
        self.utilized -= amount;
        self.balance += amount;
        Ok(())
    }

    /// Attribution and debt maps agree with their totals.
    pub fn is_consistent(&self) -> bool {
        let attributed: Attribution = self.attributions.values().sum();
        let owed: Amount = self.debts.values().sum();
        attributed == self.total_attributions && owed == self.total_debt
    }
}
