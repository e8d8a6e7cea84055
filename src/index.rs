// 9.0 index.rs: an index spreads its depositors' capital over several pools as credit,
// levered up to a target. adjust_alloc keeps leverage inside the slack band.
// 9.1 two phases: screen out pools that cannot move, then split what is left by weight.

use crate::config::{self, IndexParams};
use crate::ledger::{LedgerError, VaultLedger};
use crate::lp::{LpBook, LpError};
use crate::math::{self, MathError};
use crate::pool::{Pool, PoolError};
use crate::types::{AccountId, Amount, Holder, IndexId, Leverage, PoolId, Rate, Timestamp, LEVERAGE_SCALE};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("Deposits are disabled")]
    DepositDisabled,

    #[error("Amount is zero")]
    ZeroAmount,

    #[error("Withdrawals are frozen while a member pool pays out a claim")]
    WithdrawalPending,

    #[error("Withdrawal {requested} exceeds withdrawable {available}")]
    WithdrawInsufficientLiquidity { requested: Amount, available: Amount },

    #[error("Slot {slot} is past the end of the list ({len})")]
    BadSlot { slot: usize, len: usize },

    #[error("Index already holds the maximum of {0} pools")]
    MaxListExceeded(usize),

    #[error("Pool {0:?} is already listed")]
    PoolAlreadyListed(PoolId),

    #[error("Pool {0:?} is not registered")]
    PoolMissing(PoolId),

    #[error("Pool {0:?} is still paying out a claim")]
    PoolIsPayingOut(PoolId),

    #[error("Target leverage {0} is below 1x")]
    LeverageTooLow(u128),

    #[error("LP error: {0}")]
    Lp(#[from] LpError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

/// One credit movement made by a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditMove {
    Allocated { pool: PoolId, amount: Amount },
    Withdrawn { pool: PoolId, amount: Amount },
    /// phase 1 exclusion: paused, or unable to release enough
    ForceWithdrawn { pool: PoolId, amount: Amount, stuck: Amount },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationReport {
    pub target_credit: Amount,
    pub moves: Vec<CreditMove>,
    /// credit the target called for but no pool could take
    pub idle: Amount,
}

impl AllocationReport {
    pub fn moved(&self) -> bool {
        self.moves.iter().any(|m| match m {
            CreditMove::Allocated { amount, .. }
            | CreditMove::Withdrawn { amount, .. }
            | CreditMove::ForceWithdrawn { amount, .. } => *amount > 0,
        })
    }
}

pub type PoolMap = BTreeMap<PoolId, Pool>;

#[derive(Debug, Clone)]
pub struct Index {
    pub id: IndexId,
    pub paused: bool,
    pub locked: bool,
    pub params: IndexParams,
    lp: LpBook,
    pool_list: Vec<Option<PoolId>>,
    alloc_points: BTreeMap<PoolId, u128>,
    total_alloc_point: u128,
    total_allocated_credit: Amount,
}

fn pool_mut(pools: &mut PoolMap, id: PoolId) -> Result<&mut Pool, IndexError> {
    pools.get_mut(&id).ok_or(IndexError::PoolMissing(id))
}

impl Index {
    pub fn new(id: IndexId, params: IndexParams) -> Self {
        Self {
            id,
            paused: false,
            locked: false,
            params,
            lp: LpBook::default(),
            pool_list: Vec::new(),
            alloc_points: BTreeMap::new(),
            total_alloc_point: 0,
            total_allocated_credit: 0,
        }
    }

    pub fn holder(&self) -> Holder {
        Holder::Index(self.id)
    }

    pub fn lp(&self) -> &LpBook {
        &self.lp
    }

    pub fn pool_list(&self) -> &[Option<PoolId>] {
        &self.pool_list
    }

    pub fn listed_pools(&self) -> impl Iterator<Item = PoolId> + '_ {
        self.pool_list.iter().flatten().copied()
    }

    pub fn alloc_point(&self, pool: PoolId) -> u128 {
        self.alloc_points.get(&pool).copied().unwrap_or(0)
    }

    pub fn total_alloc_point(&self) -> u128 {
        self.total_alloc_point
    }

    pub fn total_allocated_credit(&self) -> Amount {
        self.total_allocated_credit
    }

    pub fn target_leverage(&self) -> u128 {
        self.params.target_leverage
    }

    // 9.2: views

    /// Ledger value plus premiums still parked in member pools.
    pub fn total_liquidity(&self, ledger: &VaultLedger, pools: &PoolMap) -> Result<Amount, IndexError> {
        let mut liquidity = ledger.underlying_value(self.holder());
        for id in self.listed_pools() {
            if let Some(pool) = pools.get(&id) {
                liquidity += pool.pending_premium(ledger, self.id)?;
            }
        }
        Ok(liquidity)
    }

    pub fn leverage(&self, ledger: &VaultLedger, pools: &PoolMap) -> Result<Leverage, IndexError> {
        let liquidity = self.total_liquidity(ledger, pools)?;
        Ok(Leverage(self.leverage_at(liquidity)?))
    }

    fn leverage_at(&self, liquidity: Amount) -> Result<u128, MathError> {
        math::mul_div_or_zero(self.total_allocated_credit, LEVERAGE_SCALE, liquidity)
    }

    pub fn rate(&self, ledger: &VaultLedger, pools: &PoolMap) -> Result<Rate, IndexError> {
        Ok(self.lp.rate(self.total_liquidity(ledger, pools)?))
    }

    /// Liquidity that can leave without touching capital backing live cover.
    pub fn withdrawable(&self, ledger: &VaultLedger, pools: &PoolMap) -> Result<Amount, IndexError> {
        let liquidity = self.total_liquidity(ledger, pools)?;
        if self.leverage_at(liquidity)? > self.params.target_leverage + self.params.upper_slack {
            return Ok(0);
        }
        let mut committed: Amount = 0;
        for id in self.listed_pools() {
            let Some(pool) = pools.get(&id) else { continue };
            let credit = pool.credit_of(self.id);
            if credit == 0 {
                continue;
            }
            let pool_liquidity = pool.total_liquidity(ledger);
            committed += math::mul_div_or_zero(pool.locked_amount(), credit, pool_liquidity)?;
        }
        Ok(liquidity.saturating_sub(committed))
    }

    // 9.3: LP flows
    pub fn deposit(
        &mut self,
        ledger: &mut VaultLedger,
        pools: &mut PoolMap,
        account: AccountId,
        amount: Amount,
    ) -> Result<(u128, Amount), IndexError> {
        if self.locked || self.paused {
            return Err(IndexError::DepositDisabled);
        }
        if amount == 0 {
            return Err(IndexError::ZeroAmount);
        }
        let fee = config::fee_on(amount, self.params.deposit_fee)?;
        let net = amount - fee;
        let liquidity = self.total_liquidity(ledger, pools)?;
        let shares = self.lp.worth(net, liquidity)?;
        ledger.add_value(net, self.holder())?;
        if fee > 0 {
            ledger.add_value(fee, Holder::Treasury)?;
        }
        self.lp.mint(account, shares);

        let new_liquidity = liquidity + net;
        let floor = self.params.target_leverage.saturating_sub(self.params.lower_slack);
        if floor > self.leverage_at(new_liquidity)? {
            self.adjust_alloc(ledger, pools, new_liquidity)?;
        }
        Ok((shares, fee))
    }

    pub fn request_withdraw(&mut self, account: AccountId, shares: u128, now: Timestamp) -> Result<(), IndexError> {
        Ok(self.lp.request_withdraw(account, shares, now)?)
    }

    pub fn withdraw(
        &mut self,
        ledger: &mut VaultLedger,
        pools: &mut PoolMap,
        account: AccountId,
        shares: u128,
        now: Timestamp,
    ) -> Result<Amount, IndexError> {
        if self.locked {
            return Err(IndexError::WithdrawalPending);
        }
        self.lp
            .check_withdrawal(account, shares, now, self.params.withdrawal_window())?;

        let liquidity = self.total_liquidity(ledger, pools)?;
        let value = self.lp.value_of(shares, liquidity)?;
        let available = self.withdrawable(ledger, pools)?;
        if value > available {
            return Err(IndexError::WithdrawInsufficientLiquidity {
                requested: value,
                available,
            });
        }
        self.lp.burn(account, shares)?;
        self.lp.consume_request(account, shares);

        let remaining = liquidity - value;
        if remaining == 0 {
            self.adjust_alloc(ledger, pools, 0)?;
        } else if self.leverage_at(remaining)? > self.params.target_leverage + self.params.upper_slack {
            self.adjust_alloc(ledger, pools, remaining)?;
        }
        // premiums still parked in pools must be on the ledger before value leaves
        self.harvest(ledger, pools)?;
        if value == 0 {
            return Ok(0);
        }
        Ok(ledger.withdraw_value(value, self.holder())?.paid)
    }

    /// Settles every pending premium into the index's ledger attribution.
    pub fn harvest(&self, ledger: &mut VaultLedger, pools: &mut PoolMap) -> Result<(), IndexError> {
        for id in self.listed_pools() {
            let pool = pool_mut(pools, id)?;
            if pool.credit_of(self.id) > 0 {
                pool.allocate_credit(ledger, self.id, 0)?;
            }
        }
        Ok(())
    }

    // 9.4: admin
    /// Adds, replaces or clears the pool in `slot`. `slot == len` appends.
    pub fn set(
        &mut self,
        ledger: &mut VaultLedger,
        pools: &mut PoolMap,
        slot: usize,
        pool: Option<PoolId>,
        weight: u128,
    ) -> Result<AllocationReport, IndexError> {
        let len = self.pool_list.len();
        if slot > len {
            return Err(IndexError::BadSlot { slot, len });
        }
        if slot == len && slot >= self.params.max_list {
            return Err(IndexError::MaxListExceeded(self.params.max_list));
        }
        if let Some(id) = pool {
            if !pools.contains_key(&id) {
                return Err(IndexError::PoolMissing(id));
            }
            let listed_elsewhere = self
                .pool_list
                .iter()
                .enumerate()
                .any(|(i, p)| *p == Some(id) && i != slot);
            if listed_elsewhere {
                return Err(IndexError::PoolAlreadyListed(id));
            }
        }

        let current = if slot < len { self.pool_list[slot] } else { None };
        if let Some(old) = current.filter(|old| Some(*old) != pool) {
            self.release_pool(ledger, pools, old)?;
        }
        if let Some(id) = pool {
            let previous = self.alloc_points.insert(id, weight).unwrap_or(0);
            self.total_alloc_point = self.total_alloc_point - previous + weight;
        }
        if slot == len {
            self.pool_list.push(pool);
        } else {
            self.pool_list[slot] = pool;
        }

        let liquidity = self.total_liquidity(ledger, pools)?;
        self.adjust_alloc(ledger, pools, liquidity)
    }

    // pull every unit of credit out of a pool leaving the list
    fn release_pool(&mut self, ledger: &mut VaultLedger, pools: &mut PoolMap, id: PoolId) -> Result<(), IndexError> {
        let pool = pool_mut(pools, id)?;
        let credit = pool.credit_of(self.id);
        if credit > 0 {
            pool.withdraw_credit(ledger, self.id, credit)?;
            self.total_allocated_credit -= credit;
        }
        let weight = self.alloc_points.remove(&id).unwrap_or(0);
        self.total_alloc_point -= weight;
        Ok(())
    }

    pub fn set_leverage(
        &mut self,
        ledger: &mut VaultLedger,
        pools: &mut PoolMap,
        target: u128,
    ) -> Result<AllocationReport, IndexError> {
        if target < LEVERAGE_SCALE {
            return Err(IndexError::LeverageTooLow(target));
        }
        self.params.target_leverage = target;
        let liquidity = self.total_liquidity(ledger, pools)?;
        self.adjust_alloc(ledger, pools, liquidity)
    }

    pub fn set_slack(
        &mut self,
        ledger: &mut VaultLedger,
        pools: &mut PoolMap,
        upper: u128,
        lower: u128,
    ) -> Result<AllocationReport, IndexError> {
        self.params.upper_slack = upper;
        self.params.lower_slack = lower;
        let liquidity = self.total_liquidity(ledger, pools)?;
        self.adjust_alloc(ledger, pools, liquidity)
    }

    // 9.5: claims
    /// Covers up to `amount` of a pool's claim debt from the index's own value.
    pub fn compensate(&mut self, ledger: &mut VaultLedger, pool: PoolId, amount: Amount) -> Result<Amount, IndexError> {
        let paid = amount.min(ledger.underlying_value(self.holder()));
        if paid > 0 {
            ledger.offset_debt(paid, self.holder(), Holder::Pool(pool))?;
        }
        Ok(paid)
    }

    /// Lifts the claim lock once every member pool trades again.
    pub fn resume(&mut self, pools: &PoolMap) -> Result<(), IndexError> {
        for id in self.listed_pools() {
            let pool = pools.get(&id).ok_or(IndexError::PoolMissing(id))?;
            if !pool.is_trading() {
                return Err(IndexError::PoolIsPayingOut(id));
            }
        }
        self.locked = false;
        Ok(())
    }

    // 9.6: rebalancing

    /// Moves credit so the index holds `target_leverage * liquidity` spread by weight.
    pub fn adjust_alloc(
        &mut self,
        ledger: &mut VaultLedger,
        pools: &mut PoolMap,
        liquidity: Amount,
    ) -> Result<AllocationReport, IndexError> {
        let target_credit = math::mul_div(self.params.target_leverage, liquidity, LEVERAGE_SCALE)?;
        let mut report = AllocationReport {
            target_credit,
            ..Default::default()
        };
        let mut remaining_points = self.total_alloc_point;
        let mut allocatable = target_credit;
        let mut deferred = Vec::with_capacity(self.pool_list.len());

        // phase 1: pools that are paused or cannot give back enough credit keep what they must
        let listed: Vec<PoolId> = self.listed_pools().collect();
        for id in listed {
            let weight = self.alloc_point(id);
            let pool = pool_mut(pools, id)?;
            let current = pool.credit_of(self.id);
            let available = pool.available_balance(ledger);
            let target = math::mul_div_or_zero(target_credit, weight, remaining_points)?;

            let stuck_above_target = current > target && current - target > available;
            if pool.paused || stuck_above_target {
                let amount = current.min(available);
                if amount > 0 {
                    pool.withdraw_credit(ledger, self.id, amount)?;
                    self.total_allocated_credit -= amount;
                }
                let stuck = current - amount;
                if current > 0 {
                    warn!(index = self.id.0, pool = id.0, amount, stuck, "credit force withdrawn");
                }
                report.moves.push(CreditMove::ForceWithdrawn { pool: id, amount, stuck });
                remaining_points -= weight;
                allocatable = allocatable.saturating_sub(stuck);
            } else {
                deferred.push((id, weight));
            }
        }

        // phase 2: everything left splits by weight among the remaining pools
        let mut placed = 0;
        for (id, weight) in deferred {
            let pool = pool_mut(pools, id)?;
            let current = pool.credit_of(self.id);
            // no weight left: every remaining pool drains to zero
            let target = math::mul_div_or_zero(allocatable, weight, remaining_points)?;
            if current > target {
                let available = pool.available_balance(ledger);
                let amount = (current - target).min(available);
                if amount > 0 {
                    pool.withdraw_credit(ledger, self.id, amount)?;
                    self.total_allocated_credit -= amount;
                    report.moves.push(CreditMove::Withdrawn { pool: id, amount });
                } else {
                    pool.allocate_credit(ledger, self.id, 0)?;
                }
            } else if current < target {
                let amount = target - current;
                pool.allocate_credit(ledger, self.id, amount)?;
                self.total_allocated_credit += amount;
                report.moves.push(CreditMove::Allocated { pool: id, amount });
            } else {
                pool.allocate_credit(ledger, self.id, 0)?;
            }
            placed += pool.credit_of(self.id);
        }
        report.idle = allocatable.saturating_sub(placed);

        debug!(
            index = self.id.0,
            liquidity,
            target_credit,
            allocated = self.total_allocated_credit,
            idle = report.idle,
            "allocation adjusted"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolParams;

    const ALICE: AccountId = AccountId(1);

    fn setup(weights: &[u128]) -> (VaultLedger, PoolMap, Index) {
        let mut ledger = VaultLedger::new();
        let mut pools = PoolMap::new();
        for i in 0..weights.len() {
            let id = PoolId(i as u32 + 1);
            pools.insert(id, Pool::new(id, PoolParams::default()));
        }
        let mut index = Index::new(
            IndexId(1),
            IndexParams {
                lower_slack: 0,
                upper_slack: 0,
                ..IndexParams::default()
            },
        );
        for (i, w) in weights.iter().enumerate() {
            index
                .set(&mut ledger, &mut pools, i, Some(PoolId(i as u32 + 1)), *w)
                .unwrap();
        }
        (ledger, pools, index)
    }

    #[test]
    fn deposit_spreads_credit_by_weight() {
        let (mut ledger, mut pools, mut index) = setup(&[2_000, 3_000]);
        index.deposit(&mut ledger, &mut pools, ALICE, 10_000).unwrap();
        assert_eq!(index.total_allocated_credit(), 20_000);
        assert_eq!(pools[&PoolId(1)].credit_of(index.id), 8_000);
        assert_eq!(pools[&PoolId(2)].credit_of(index.id), 12_000);
        assert_eq!(index.leverage(&ledger, &pools).unwrap(), Leverage(2_000));
    }

    #[test]
    fn set_rejects_bad_slots() {
        let (mut ledger, mut pools, mut index) = setup(&[1_000]);
        let err = index.set(&mut ledger, &mut pools, 3, Some(PoolId(1)), 1).unwrap_err();
        assert_eq!(err, IndexError::BadSlot { slot: 3, len: 1 });
        let err = index.set(&mut ledger, &mut pools, 1, Some(PoolId(1)), 1).unwrap_err();
        assert_eq!(err, IndexError::PoolAlreadyListed(PoolId(1)));
        let err = index.set(&mut ledger, &mut pools, 1, Some(PoolId(9)), 1).unwrap_err();
        assert_eq!(err, IndexError::PoolMissing(PoolId(9)));
    }

    #[test]
    fn removing_a_pool_pulls_its_credit() {
        let (mut ledger, mut pools, mut index) = setup(&[1_000, 1_000]);
        index.deposit(&mut ledger, &mut pools, ALICE, 1_000).unwrap();
        index.set(&mut ledger, &mut pools, 0, None, 0).unwrap();
        assert_eq!(pools[&PoolId(1)].credit_of(index.id), 0);
        assert_eq!(pools[&PoolId(2)].credit_of(index.id), 2_000);
        assert_eq!(index.total_alloc_point(), 1_000);
    }

    #[test]
    fn zero_weights_drain_every_pool() {
        let (mut ledger, mut pools, mut index) = setup(&[1_000, 1_000]);
        index.deposit(&mut ledger, &mut pools, ALICE, 1_000).unwrap();
        index.set(&mut ledger, &mut pools, 0, Some(PoolId(1)), 0).unwrap();
        assert_eq!(pools[&PoolId(1)].credit_of(index.id), 0);
        assert_eq!(pools[&PoolId(2)].credit_of(index.id), 2_000);

        let report = index.set(&mut ledger, &mut pools, 1, Some(PoolId(2)), 0).unwrap();
        assert_eq!(index.total_alloc_point(), 0);
        assert_eq!(pools[&PoolId(2)].credit_of(index.id), 0);
        assert_eq!(index.total_allocated_credit(), 0);
        assert_eq!(report.idle, 2_000);
        assert_eq!(report.moves, vec![CreditMove::Withdrawn { pool: PoolId(2), amount: 2_000 }]);
        assert_eq!(index.withdrawable(&ledger, &pools).unwrap(), 1_000);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn second_adjust_moves_nothing() {
        let (mut ledger, mut pools, mut index) = setup(&[1_000, 2_000, 3_000]);
        index.deposit(&mut ledger, &mut pools, ALICE, 9_999).unwrap();
        let liquidity = index.total_liquidity(&ledger, &pools).unwrap();
        let report = index.adjust_alloc(&mut ledger, &mut pools, liquidity).unwrap();
        assert!(!report.moved());
    }

    #[test]
    fn all_pools_paused_leaves_capital_idle() {
        let (mut ledger, mut pools, mut index) = setup(&[1_000, 1_000]);
        index.deposit(&mut ledger, &mut pools, ALICE, 1_000).unwrap();
        for pool in pools.values_mut() {
            pool.paused = true;
        }
        let report = index.adjust_alloc(&mut ledger, &mut pools, 1_000).unwrap();
        assert_eq!(index.total_allocated_credit(), 0);
        assert_eq!(report.idle, 2_000);
        assert_eq!(index.withdrawable(&ledger, &pools).unwrap(), 1_000);
    }

    #[test]
    fn leverage_floor_rejected() {
        let (mut ledger, mut pools, mut index) = setup(&[1_000]);
        let err = index.set_leverage(&mut ledger, &mut pools, 999).unwrap_err();
        assert_eq!(err, IndexError::LeverageTooLow(999));
    }
}
