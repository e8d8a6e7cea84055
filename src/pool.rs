// 8.0 pool.rs: one underwriting market. direct LPs own the pool's ledger attribution,
// indices lend it credit. premiums flow to both: LPs through the share price,
// credit holders through the reward-per-credit accumulator.

use crate::config::{self, PoolParams};
use crate::cover::{self, ClaimVerifier, CoverReceipt, CoverRequest, Incident, Insurance};
use crate::ledger::{LedgerError, VaultLedger};
use crate::lp::{LpBook, LpError};
use crate::math::{self, MathError};
use crate::premium::{PremiumError, PremiumModel};
use crate::types::{
    AccountId, Amount, Attribution, Hash32, Holder, IndexId, InsuranceId, PoolId, Rate, Timestamp,
    BASE, REWARD_SCALE,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Deposits are disabled")]
    DepositDisabled,

    #[error("Amount is zero")]
    ZeroAmount,

    #[error("Withdrawals are frozen while a claim is paid out")]
    WithdrawalPending,

    #[error("Market is paused")]
    MarketPaused,

    #[error("Market has a pending claim")]
    MarketPendingClaim,

    #[error("Cover amount {requested} exceeds available {available}")]
    InsureExceedsAvailable { requested: Amount, available: Amount },

    #[error("Premium {premium} exceeds max cost {max_cost}")]
    InsureExceedsMaxCost { premium: Amount, max_cost: Amount },

    #[error("Cover span exceeds the maximum")]
    InsureExceedsMaxSpan,

    #[error("Cover span below the minimum")]
    InsureBelowMinSpan,

    #[error("Insurance cannot be unlocked yet")]
    UnlockBadConditions,

    #[error("Withdrawal {requested} exceeds available liquidity {available}")]
    WithdrawInsufficientLiquidity { requested: Amount, available: Amount },

    #[error("Credit cannot be withdrawn")]
    WithdrawCreditBadConditions,

    #[error("Insurance {0:?} is not active")]
    InsuranceNotActive(InsuranceId),

    #[error("Caller does not hold insurance {0:?}")]
    NotInsuranceHolder(InsuranceId),

    #[error("No incident is being paid out")]
    NoApplicableIncident,

    #[error("Insurance {0:?} does not cover the incident")]
    InsuranceNotApplicable(InsuranceId),

    #[error("Insurance {0:?} is exempted from the payout")]
    InsuranceExempted(InsuranceId),

    #[error("Incident payout ratio is invalid")]
    InvalidIncident,

    #[error("Claim period has not ended")]
    PendingNotElapsed,

    #[error("Locked amount {locked} cannot release {requested}")]
    LockedUnderflow { locked: Amount, requested: Amount },

    #[error("LP error: {0}")]
    Lp(#[from] LpError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Premium error: {0}")]
    Premium(#[from] PremiumError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Trading,
    PayingOut,
}

/// Credit an index has lent to this pool and the reward already accounted to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreditLine {
    pub credit: Amount,
    pub reward_debt: u128,
}

/// How the debt of a finished claim is split between credit holders and the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePlan {
    pub debt: Amount,
    pub from_indices: Amount,
    pub per_index: Vec<(IndexId, Amount)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeOutcome {
    pub compensated: Amount,
    pub offset_by_pool: Amount,
    pub shortage: Amount,
}

#[derive(Debug, Clone)]
pub struct Pool {
    pub id: PoolId,
    pub status: MarketStatus,
    pub paused: bool,
    pub params: PoolParams,
    lp: LpBook,
    locked_amount: Amount,
    total_credit: Amount,
    credit_lines: BTreeMap<IndexId, CreditLine>,
    reward_per_credit: u128,
    attribution_debt: Attribution,
    insurances: BTreeMap<InsuranceId, Insurance>,
    next_insurance_id: u64,
    incident: Option<Incident>,
    pending_end: Timestamp,
}

impl Pool {
    pub fn new(id: PoolId, params: PoolParams) -> Self {
        Self {
            id,
            status: MarketStatus::Trading,
            paused: false,
            params,
            lp: LpBook::default(),
            locked_amount: 0,
            total_credit: 0,
            credit_lines: BTreeMap::new(),
            reward_per_credit: 0,
            attribution_debt: 0,
            insurances: BTreeMap::new(),
            next_insurance_id: 0,
            incident: None,
            pending_end: Timestamp(0),
        }
    }

    pub fn holder(&self) -> Holder {
        Holder::Pool(self.id)
    }

    pub fn lp(&self) -> &LpBook {
        &self.lp
    }

    pub fn locked_amount(&self) -> Amount {
        self.locked_amount
    }

    pub fn total_credit(&self) -> Amount {
        self.total_credit
    }

    pub fn reward_per_credit(&self) -> u128 {
        self.reward_per_credit
    }

    pub fn attribution_debt(&self) -> Attribution {
        self.attribution_debt
    }

    pub fn credit_of(&self, index: IndexId) -> Amount {
        self.credit_lines.get(&index).map(|l| l.credit).unwrap_or(0)
    }

    pub fn credit_lines(&self) -> impl Iterator<Item = (&IndexId, &CreditLine)> {
        self.credit_lines.iter()
    }

    pub fn insurance(&self, id: InsuranceId) -> Option<&Insurance> {
        self.insurances.get(&id)
    }

    pub fn insurances(&self) -> impl Iterator<Item = &Insurance> {
        self.insurances.values()
    }

    pub fn incident(&self) -> Option<&Incident> {
        self.incident.as_ref()
    }

    pub fn pending_end(&self) -> Timestamp {
        self.pending_end
    }

    pub fn is_trading(&self) -> bool {
        self.status == MarketStatus::Trading
    }

    // 8.1: liquidity views

    /// Value owned by direct LPs: the pool's attribution minus what is owed to credit holders.
    pub fn original_liquidity(&self, ledger: &VaultLedger) -> Amount {
        ledger
            .underlying_value(self.holder())
            .saturating_sub(ledger.attribution_value(self.attribution_debt))
    }

    pub fn total_liquidity(&self, ledger: &VaultLedger) -> Amount {
        self.original_liquidity(ledger) + self.total_credit
    }

    pub fn available_balance(&self, ledger: &VaultLedger) -> Amount {
        self.total_liquidity(ledger).saturating_sub(self.locked_amount)
    }

    pub fn utilization_rate(&self, ledger: &VaultLedger) -> Rate {
        let total = self.total_liquidity(ledger);
        Rate(math::mul_div_or_zero(self.locked_amount, BASE, total).unwrap_or(BASE))
    }

    /// LP share price in BASE units.
    pub fn rate(&self, ledger: &VaultLedger) -> Rate {
        self.lp.rate(self.original_liquidity(ledger))
    }

    pub fn value_of_shares(&self, ledger: &VaultLedger, shares: u128) -> Result<Amount, MathError> {
        self.lp.value_of(shares, self.original_liquidity(ledger))
    }

    // 8.2: reward accrual
    pub fn pending_attribution(&self, index: IndexId) -> Result<Attribution, MathError> {
        let Some(line) = self.credit_lines.get(&index) else {
            return Ok(0);
        };
        let accrued = math::mul_div(line.credit, self.reward_per_credit, REWARD_SCALE)?;
        Ok(accrued.saturating_sub(line.reward_debt))
    }

    pub fn pending_premium(&self, ledger: &VaultLedger, index: IndexId) -> Result<Amount, MathError> {
        Ok(ledger.attribution_value(self.pending_attribution(index)?))
    }

    fn accrue(&mut self, new_attribution: Attribution, liquidity: Amount, credit: Amount) -> Result<(), MathError> {
        if credit == 0 || liquidity == 0 {
            return Ok(());
        }
        let for_indices = math::mul_div(new_attribution, credit, liquidity)?;
        self.attribution_debt += for_indices;
        self.reward_per_credit += math::mul_div(for_indices, REWARD_SCALE, credit)?;
        Ok(())
    }

    // move an index's unsettled reward from the pool's attribution to the index's
    fn settle(&mut self, ledger: &mut VaultLedger, index: IndexId) -> Result<Attribution, PoolError> {
        let pending = self
            .pending_attribution(index)?
            .min(ledger.attributions_of(self.holder()));
        if pending > 0 {
            ledger.transfer_attribution(pending, self.holder(), Holder::Index(index))?;
            self.attribution_debt = self.attribution_debt.saturating_sub(pending);
        }
        Ok(pending)
    }

    fn reset_reward_debt(&mut self, index: IndexId) -> Result<(), MathError> {
        let rpc = self.reward_per_credit;
        if let Some(line) = self.credit_lines.get_mut(&index) {
            if line.credit == 0 {
                self.credit_lines.remove(&index);
            } else {
                line.reward_debt = math::mul_div(line.credit, rpc, REWARD_SCALE)?;
            }
        }
        Ok(())
    }

    /// Lends `amount` of index capital to this pool. A zero amount only settles rewards.
    pub fn allocate_credit(
        &mut self,
        ledger: &mut VaultLedger,
        index: IndexId,
        amount: Amount,
    ) -> Result<Attribution, PoolError> {
        let settled = self.settle(ledger, index)?;
        if amount > 0 {
            self.credit_lines.entry(index).or_default().credit += amount;
            self.total_credit += amount;
        }
        self.reset_reward_debt(index)?;
        Ok(settled)
    }

    pub fn withdraw_credit(
        &mut self,
        ledger: &mut VaultLedger,
        index: IndexId,
        amount: Amount,
    ) -> Result<Attribution, PoolError> {
        if amount > self.credit_of(index) || amount > self.available_balance(ledger) || !self.is_trading() {
            return Err(PoolError::WithdrawCreditBadConditions);
        }
        let settled = self.settle(ledger, index)?;
        if let Some(line) = self.credit_lines.get_mut(&index) {
            line.credit -= amount;
        }
        self.total_credit -= amount;
        self.reset_reward_debt(index)?;
        Ok(settled)
    }

    // 8.3: direct LP flows
    /// Mints LP shares for `amount` net of the deposit fee. Returns `(shares, fee)`.
    pub fn deposit(
        &mut self,
        ledger: &mut VaultLedger,
        account: AccountId,
        amount: Amount,
    ) -> Result<(u128, Amount), PoolError> {
        if self.paused || !self.is_trading() {
            return Err(PoolError::DepositDisabled);
        }
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let fee = config::fee_on(amount, self.params.deposit_fee)?;
        let net = amount - fee;
        let shares = self.lp.worth(net, self.original_liquidity(ledger))?;
        ledger.add_value(net, self.holder())?;
        if fee > 0 {
            ledger.add_value(fee, Holder::Treasury)?;
        }
        self.lp.mint(account, shares);
        Ok((shares, fee))
    }

    pub fn request_withdraw(&mut self, account: AccountId, shares: u128, now: Timestamp) -> Result<(), PoolError> {
        Ok(self.lp.request_withdraw(account, shares, now)?)
    }

    /// Burns `shares` and releases their value from the ledger. Returns tokens owed to the account.
    pub fn withdraw(
        &mut self,
        ledger: &mut VaultLedger,
        account: AccountId,
        shares: u128,
        now: Timestamp,
    ) -> Result<Amount, PoolError> {
        if !self.is_trading() {
            return Err(PoolError::WithdrawalPending);
        }
        self.lp
            .check_withdrawal(account, shares, now, self.params.withdrawal_window())?;

        let value = self.value_of_shares(ledger, shares)?;
        let available = self.available_balance(ledger);
        if value > available {
            return Err(PoolError::WithdrawInsufficientLiquidity {
                requested: value,
                available,
            });
        }
        self.lp.burn(account, shares)?;
        self.lp.consume_request(account, shares);
        if value == 0 {
            return Ok(0);
        }
        Ok(ledger.withdraw_value(value, self.holder())?.paid)
    }

    // 8.4: writing cover
    pub fn insure(
        &mut self,
        ledger: &mut VaultLedger,
        model: &dyn PremiumModel,
        request: &CoverRequest,
        agent: AccountId,
        now: Timestamp,
    ) -> Result<CoverReceipt, PoolError> {
        if self.paused {
            return Err(PoolError::MarketPaused);
        }
        if !self.is_trading() {
            return Err(PoolError::MarketPendingClaim);
        }
        let available = self.available_balance(ledger);
        if request.amount > available {
            return Err(PoolError::InsureExceedsAvailable {
                requested: request.amount,
                available,
            });
        }
        let liquidity = self.total_liquidity(ledger);
        let premium = model.premium(request.amount, request.span_secs, liquidity, self.locked_amount)?;
        if premium > request.max_cost {
            return Err(PoolError::InsureExceedsMaxCost {
                premium,
                max_cost: request.max_cost,
            });
        }
        if request.span_secs > self.params.max_span_secs {
            return Err(PoolError::InsureExceedsMaxSpan);
        }
        if request.span_secs < self.params.min_span_secs {
            return Err(PoolError::InsureBelowMinSpan);
        }

        let credit = self.total_credit;
        let (fee_rate, reserve_rate) = (self.params.fee_rate, self.params.reserve_rate);
        let protocol_fee = config::fee_on(premium, fee_rate)?;
        let reserve_premium = config::fee_on(premium, reserve_rate)?;
        if premium > 0 {
            // treasury stays last and takes the rounding remainder
            let minted = ledger.add_value_batch(
                premium,
                &[
                    (self.holder(), BASE - fee_rate - reserve_rate),
                    (Holder::Reserve, reserve_rate),
                    (Holder::Treasury, fee_rate),
                ],
            )?;
            self.accrue(minted[0], liquidity, credit)?;
        }
        self.locked_amount += request.amount;

        let id = InsuranceId(self.next_insurance_id);
        self.next_insurance_id += 1;
        let insurance = Insurance {
            id,
            start: now,
            end: now.plus(request.span_secs),
            amount: request.amount,
            target: request.target,
            insured: request.insured,
            agent,
            active: true,
        };
        self.insurances.insert(id, insurance.clone());
        Ok(CoverReceipt {
            insurance,
            premium,
            protocol_fee,
            reserve_premium,
        })
    }

    fn release_locked(&mut self, amount: Amount) -> Result<(), PoolError> {
        self.locked_amount = self
            .locked_amount
            .checked_sub(amount)
            .ok_or(PoolError::LockedUnderflow {
                locked: self.locked_amount,
                requested: amount,
            })?;
        Ok(())
    }

    /// Releases expired cover once its grace period has passed.
    pub fn unlock(&mut self, id: InsuranceId, now: Timestamp) -> Result<Amount, PoolError> {
        let grace = self.params.grace_secs;
        let unlockable = match self.insurances.get(&id) {
            Some(ins) => ins.active && ins.end.plus(grace) < now,
            None => false,
        };
        if !unlockable || !self.is_trading() {
            return Err(PoolError::UnlockBadConditions);
        }
        let amount = self.insurances.get(&id).map(|i| i.amount).unwrap_or(0);
        self.release_locked(amount)?;
        if let Some(ins) = self.insurances.get_mut(&id) {
            ins.active = false;
        }
        Ok(amount)
    }

    // 8.5: claims
    /// Freezes the market for `pending_secs` while covered holders redeem. Returns the indices
    /// with credit in this pool, which must be locked alongside it.
    pub fn apply_cover(&mut self, incident: Incident, pending_secs: u64, now: Timestamp) -> Result<Vec<IndexId>, PoolError> {
        if incident.payout_denominator == 0 || incident.payout_numerator > incident.payout_denominator {
            return Err(PoolError::InvalidIncident);
        }
        if self.paused {
            return Err(PoolError::MarketPaused);
        }
        if !self.is_trading() {
            return Err(PoolError::MarketPendingClaim);
        }
        self.status = MarketStatus::PayingOut;
        self.pending_end = now.plus(pending_secs);
        self.incident = Some(incident);
        Ok(self.credit_lines.keys().copied().collect())
    }

    /// Pays a covered holder out of the ledger. The payout is booked as pool debt until resume.
    pub fn redeem(
        &mut self,
        ledger: &mut VaultLedger,
        id: InsuranceId,
        claimant: AccountId,
        proof: &[Hash32],
        verifier: &dyn ClaimVerifier,
    ) -> Result<Amount, PoolError> {
        let insurance = self
            .insurances
            .get(&id)
            .filter(|ins| ins.active)
            .cloned()
            .ok_or(PoolError::InsuranceNotActive(id))?;
        if insurance.insured != claimant {
            return Err(PoolError::NotInsuranceHolder(id));
        }
        let incident = match (&self.status, &self.incident) {
            (MarketStatus::PayingOut, Some(incident)) => incident.clone(),
            _ => return Err(PoolError::NoApplicableIncident),
        };
        if !insurance.covers(incident.incident_timestamp) {
            return Err(PoolError::InsuranceNotApplicable(id));
        }
        if !cover::claim_is_approved(verifier, proof, incident.merkle_root, insurance.target, claimant) {
            return Err(PoolError::InsuranceExempted(id));
        }

        self.release_locked(insurance.amount)?;
        let payout = math::mul_div(insurance.amount, incident.payout_numerator, incident.payout_denominator)?;
        if payout > 0 {
            ledger.borrow_value(payout, self.holder())?;
        }
        if let Some(ins) = self.insurances.get_mut(&id) {
            ins.active = false;
        }
        Ok(payout)
    }

    /// Splits the claim debt: credit holders carry `debt * total_credit / total_liquidity`,
    /// divided between indices by their credit.
    pub fn resume_plan(&self, ledger: &VaultLedger, now: Timestamp) -> Result<ResumePlan, PoolError> {
        if self.is_trading() {
            return Err(PoolError::NoApplicableIncident);
        }
        if self.pending_end > now {
            return Err(PoolError::PendingNotElapsed);
        }
        let debt = ledger.debt_of(self.holder());
        let liquidity = self.total_liquidity(ledger);
        let from_indices = if liquidity == 0 {
            0
        } else {
            math::mul_div(debt, self.total_credit, liquidity)?.min(debt)
        };

        let mut per_index = Vec::with_capacity(self.credit_lines.len());
        let mut remaining = from_indices;
        for (index, line) in &self.credit_lines {
            if line.credit == 0 || self.total_credit == 0 {
                continue;
            }
            let share = math::mul_div_up(from_indices, line.credit, self.total_credit)?.min(remaining);
            remaining -= share;
            per_index.push((*index, share));
        }
        Ok(ResumePlan {
            debt,
            from_indices,
            per_index,
        })
    }

    /// Charges the pool's own LPs for the rest of the debt and reopens the market.
    /// Whatever neither side could cover becomes unresolved protocol debt.
    pub fn finish_resume(
        &mut self,
        ledger: &mut VaultLedger,
        plan: &ResumePlan,
        compensated: Amount,
    ) -> Result<ResumeOutcome, PoolError> {
        let holder = self.holder();
        let from_pool = plan.debt - plan.from_indices;
        let offset_by_pool = from_pool.min(self.original_liquidity(ledger));
        if offset_by_pool > 0 {
            ledger.offset_debt(offset_by_pool, holder, holder)?;
        }
        let shortage = ledger.debt_of(holder);
        if shortage > 0 {
            ledger.transfer_debt(shortage, holder)?;
        }
        self.status = MarketStatus::Trading;
        self.incident = None;
        Ok(ResumeOutcome {
            compensated,
            offset_by_pool,
            shortage,
        })
    }
}
