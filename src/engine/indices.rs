//! Index operations: LP flows, pool listing, leverage control and rebalancing.

use super::core::{AdminCap, Protocol, ProtocolState};
use super::results::ProtocolError;
use crate::custody::{TokenGateway, Transfer};
use crate::events::{
    AllocationAdjustedEvent, DepositEvent, EventPayload, Market, PoolListedEvent, WithdrawRequestedEvent,
    WithdrawalEvent,
};
use crate::index::{AllocationReport, IndexError};
use crate::premium::PremiumModel;
use crate::types::{AccountId, Amount, IndexId, Leverage, PoolId, Rate};

impl<M: PremiumModel, T: TokenGateway> Protocol<M, T> {
    pub fn index_deposit(&mut self, index: IndexId, account: AccountId, amount: Amount) -> Result<u128, ProtocolError> {
        self.atomic("index_deposit", |p| {
            if account.is_null() {
                return Err(ProtocolError::ZeroAddress);
            }
            let ProtocolState {
                ledger, pools, indices, ..
            } = &mut p.state;
            let target = indices.get_mut(&index).ok_or(ProtocolError::IndexNotFound(index))?;
            let (shares, fee) = target.deposit(ledger, pools, account, amount)?;
            p.state.outbox.push(Transfer::into_vault(account, amount));
            p.emit_event(EventPayload::Deposit(DepositEvent {
                market: Market::Index(index),
                account,
                amount,
                fee,
                shares,
            }));
            Ok(shares)
        })
    }

    pub fn index_request_withdraw(
        &mut self,
        index: IndexId,
        account: AccountId,
        shares: u128,
    ) -> Result<(), ProtocolError> {
        self.atomic("index_request_withdraw", |p| {
            let now = p.state.now;
            let target = p
                .state
                .indices
                .get_mut(&index)
                .ok_or(ProtocolError::IndexNotFound(index))?;
            target.request_withdraw(account, shares, now)?;
            p.emit_event(EventPayload::WithdrawRequested(WithdrawRequestedEvent {
                market: Market::Index(index),
                account,
                shares,
            }));
            Ok(())
        })
    }

    pub fn index_withdraw(&mut self, index: IndexId, account: AccountId, shares: u128) -> Result<Amount, ProtocolError> {
        self.atomic("index_withdraw", |p| {
            let now = p.state.now;
            let ProtocolState {
                ledger, pools, indices, ..
            } = &mut p.state;
            let target = indices.get_mut(&index).ok_or(ProtocolError::IndexNotFound(index))?;
            let paid = target.withdraw(ledger, pools, account, shares, now)?;
            p.state.outbox.push(Transfer::out_of_vault(account, paid));
            p.emit_event(EventPayload::Withdrawal(WithdrawalEvent {
                market: Market::Index(index),
                account,
                shares,
                paid,
            }));
            Ok(paid)
        })
    }

    /// Lists `pool` in `slot` with `weight`, or clears the slot with `None`.
    pub fn set(
        &mut self,
        cap: &AdminCap,
        index: IndexId,
        slot: usize,
        pool: Option<PoolId>,
        weight: u128,
    ) -> Result<AllocationReport, ProtocolError> {
        self.authorize(cap)?;
        self.atomic("set", |p| {
            if let Some(id) = pool {
                if !p.state.pool(id)?.is_trading() {
                    return Err(IndexError::PoolIsPayingOut(id).into());
                }
            }
            let ProtocolState {
                ledger, pools, indices, ..
            } = &mut p.state;
            let target = indices.get_mut(&index).ok_or(ProtocolError::IndexNotFound(index))?;
            if target.locked {
                return Err(ProtocolError::IndexLocked(index));
            }
            let report = target.set(ledger, pools, slot, pool, weight)?;
            p.emit_event(EventPayload::PoolListed(PoolListedEvent {
                index,
                slot,
                pool,
                weight,
            }));
            p.record_allocation(index, &report)?;
            Ok(report)
        })
    }

    pub fn set_leverage(&mut self, cap: &AdminCap, index: IndexId, target_leverage: u128) -> Result<AllocationReport, ProtocolError> {
        self.authorize(cap)?;
        self.atomic("set_leverage", |p| {
            let ProtocolState {
                ledger, pools, indices, ..
            } = &mut p.state;
            let target = indices.get_mut(&index).ok_or(ProtocolError::IndexNotFound(index))?;
            if target.locked {
                return Err(ProtocolError::IndexLocked(index));
            }
            let report = target.set_leverage(ledger, pools, target_leverage)?;
            p.emit_event(EventPayload::LeverageSet { index, target_leverage });
            p.record_allocation(index, &report)?;
            Ok(report)
        })
    }

    pub fn set_slack(&mut self, cap: &AdminCap, index: IndexId, upper: u128, lower: u128) -> Result<AllocationReport, ProtocolError> {
        self.authorize(cap)?;
        self.atomic("set_slack", |p| {
            let ProtocolState {
                ledger, pools, indices, ..
            } = &mut p.state;
            let target = indices.get_mut(&index).ok_or(ProtocolError::IndexNotFound(index))?;
            if target.locked {
                return Err(ProtocolError::IndexLocked(index));
            }
            let report = target.set_slack(ledger, pools, upper, lower)?;
            p.emit_event(EventPayload::SlackSet { index, upper, lower });
            p.record_allocation(index, &report)?;
            Ok(report)
        })
    }

    /// Rebalances an index at its current liquidity. Anyone may call it.
    pub fn adjust_alloc(&mut self, index: IndexId) -> Result<AllocationReport, ProtocolError> {
        self.atomic("adjust_alloc", |p| {
            let report = p.state.rebalance(index)?;
            p.record_allocation(index, &report)?;
            Ok(report)
        })
    }

    pub fn set_index_paused(&mut self, cap: &AdminCap, index: IndexId, paused: bool) -> Result<(), ProtocolError> {
        self.authorize(cap)?;
        let target = self
            .state
            .indices
            .get_mut(&index)
            .ok_or(ProtocolError::IndexNotFound(index))?;
        target.paused = paused;
        self.emit_event(EventPayload::IndexPaused { index, paused });
        Ok(())
    }

    /// Unlocks an index once every member pool trades again, then rebalances it.
    pub fn resume_index(&mut self, index: IndexId) -> Result<AllocationReport, ProtocolError> {
        self.atomic("resume_index", |p| {
            let ProtocolState { pools, indices, .. } = &mut p.state;
            let target = indices.get_mut(&index).ok_or(ProtocolError::IndexNotFound(index))?;
            target.resume(pools)?;
            p.emit_event(EventPayload::IndexResumed { index });
            let report = p.state.rebalance(index)?;
            p.record_allocation(index, &report)?;
            Ok(report)
        })
    }

    pub(super) fn record_allocation(&mut self, index: IndexId, report: &AllocationReport) -> Result<(), ProtocolError> {
        let total_allocated = self.state.index(index)?.total_allocated_credit();
        self.emit_event(EventPayload::AllocationAdjusted(AllocationAdjustedEvent {
            index,
            target_credit: report.target_credit,
            total_allocated,
            idle: report.idle,
        }));
        Ok(())
    }

    // views
    pub fn index_total_liquidity(&self, index: IndexId) -> Result<Amount, ProtocolError> {
        Ok(self
            .state
            .index(index)?
            .total_liquidity(&self.state.ledger, &self.state.pools)?)
    }

    pub fn index_leverage(&self, index: IndexId) -> Result<Leverage, ProtocolError> {
        Ok(self.state.index(index)?.leverage(&self.state.ledger, &self.state.pools)?)
    }

    pub fn index_withdrawable(&self, index: IndexId) -> Result<Amount, ProtocolError> {
        Ok(self
            .state
            .index(index)?
            .withdrawable(&self.state.ledger, &self.state.pools)?)
    }

    pub fn index_rate(&self, index: IndexId) -> Result<Rate, ProtocolError> {
        Ok(self.state.index(index)?.rate(&self.state.ledger, &self.state.pools)?)
    }
}
