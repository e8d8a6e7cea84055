//! Pool operations: direct LP flows, writing cover, admin switches.

use super::core::{AdminCap, Protocol};
use super::results::ProtocolError;
use crate::config::PoolParams;
use crate::cover::{CoverReceipt, CoverRequest};
use crate::custody::{TokenGateway, Transfer};
use crate::events::{DepositEvent, EventPayload, InsuredEvent, Market, WithdrawRequestedEvent, WithdrawalEvent};
use crate::premium::PremiumModel;
use crate::types::{AccountId, Amount, InsuranceId, PoolId, Rate};

impl<M: PremiumModel, T: TokenGateway> Protocol<M, T> {
    /// Deposits `amount` tokens from `account` into a pool. Returns the LP shares minted.
    pub fn deposit(&mut self, pool: PoolId, account: AccountId, amount: Amount) -> Result<u128, ProtocolError> {
        self.atomic("deposit", |p| {
            if account.is_null() {
                return Err(ProtocolError::ZeroAddress);
            }
            let target = p.state.pools.get_mut(&pool).ok_or(ProtocolError::PoolNotFound(pool))?;
            let (shares, fee) = target.deposit(&mut p.state.ledger, account, amount)?;
            p.state.outbox.push(Transfer::into_vault(account, amount));
            p.emit_event(EventPayload::Deposit(DepositEvent {
                market: Market::Pool(pool),
                account,
                amount,
                fee,
                shares,
            }));
            Ok(shares)
        })
    }

    pub fn request_withdraw(&mut self, pool: PoolId, account: AccountId, shares: u128) -> Result<(), ProtocolError> {
        self.atomic("request_withdraw", |p| {
            let now = p.state.now;
            let target = p.state.pools.get_mut(&pool).ok_or(ProtocolError::PoolNotFound(pool))?;
            target.request_withdraw(account, shares, now)?;
            p.emit_event(EventPayload::WithdrawRequested(WithdrawRequestedEvent {
                market: Market::Pool(pool),
                account,
                shares,
            }));
            Ok(())
        })
    }

    /// Redeems queued LP shares. Returns the tokens paid out.
    pub fn withdraw(&mut self, pool: PoolId, account: AccountId, shares: u128) -> Result<Amount, ProtocolError> {
        self.atomic("withdraw", |p| {
            let now = p.state.now;
            let target = p.state.pools.get_mut(&pool).ok_or(ProtocolError::PoolNotFound(pool))?;
            let paid = target.withdraw(&mut p.state.ledger, account, shares, now)?;
            p.state.outbox.push(Transfer::out_of_vault(account, paid));
            p.emit_event(EventPayload::Withdrawal(WithdrawalEvent {
                market: Market::Pool(pool),
                account,
                shares,
                paid,
            }));
            Ok(paid)
        })
    }

    /// Sells cover. `agent` pays the premium; `request.insured` may redeem.
    pub fn insure(
        &mut self,
        pool: PoolId,
        agent: AccountId,
        request: CoverRequest,
    ) -> Result<CoverReceipt, ProtocolError> {
        self.atomic("insure", |p| {
            if agent.is_null() || request.insured.is_null() {
                return Err(ProtocolError::ZeroAddress);
            }
            let now = p.state.now;
            let target = p.state.pools.get_mut(&pool).ok_or(ProtocolError::PoolNotFound(pool))?;
            let receipt = target.insure(&mut p.state.ledger, &p.model, &request, agent, now)?;
            p.state.outbox.push(Transfer::into_vault(agent, receipt.premium));
            p.emit_event(EventPayload::Insured(InsuredEvent {
                pool,
                insurance: receipt.insurance.id,
                insured: request.insured,
                agent,
                target: request.target,
                amount: request.amount,
                premium: receipt.premium,
                protocol_fee: receipt.protocol_fee,
                reserve_premium: receipt.reserve_premium,
                end: receipt.insurance.end,
            }));
            Ok(receipt)
        })
    }

    /// Releases expired cover. Anyone may call it.
    pub fn unlock(&mut self, pool: PoolId, insurance: InsuranceId) -> Result<Amount, ProtocolError> {
        self.atomic("unlock", |p| {
            let now = p.state.now;
            let target = p.state.pools.get_mut(&pool).ok_or(ProtocolError::PoolNotFound(pool))?;
            let amount = target.unlock(insurance, now)?;
            p.emit_event(EventPayload::Unlocked {
                pool,
                insurance,
                amount,
            });
            Ok(amount)
        })
    }

    /// Blocks new cover and deposits. Lifting the pause rebalances every unlocked index listing the pool.
    pub fn set_pool_paused(&mut self, cap: &AdminCap, pool: PoolId, paused: bool) -> Result<(), ProtocolError> {
        self.authorize(cap)?;
        self.atomic("set_pool_paused", |p| {
            let target = p.state.pools.get_mut(&pool).ok_or(ProtocolError::PoolNotFound(pool))?;
            let was_paused = target.paused;
            target.paused = paused;
            p.emit_event(EventPayload::PoolPaused { pool, paused });
            if was_paused && !paused {
                for index in p.state.indices_listing(pool) {
                    let report = p.state.rebalance(index)?;
                    p.record_allocation(index, &report)?;
                }
            }
            Ok(())
        })
    }

    pub fn set_pool_params(&mut self, cap: &AdminCap, pool: PoolId, params: PoolParams) -> Result<(), ProtocolError> {
        self.authorize(cap)?;
        params.validate()?;
        let target = self.state.pools.get_mut(&pool).ok_or(ProtocolError::PoolNotFound(pool))?;
        target.params = params;
        Ok(())
    }

    // views
    pub fn pool_total_liquidity(&self, pool: PoolId) -> Result<Amount, ProtocolError> {
        Ok(self.state.pool(pool)?.total_liquidity(&self.state.ledger))
    }

    pub fn pool_available_balance(&self, pool: PoolId) -> Result<Amount, ProtocolError> {
        Ok(self.state.pool(pool)?.available_balance(&self.state.ledger))
    }

    pub fn utilization_rate(&self, pool: PoolId) -> Result<Rate, ProtocolError> {
        Ok(self.state.pool(pool)?.utilization_rate(&self.state.ledger))
    }

    /// LP share price of a pool in BASE units.
    pub fn pool_rate(&self, pool: PoolId) -> Result<Rate, ProtocolError> {
        Ok(self.state.pool(pool)?.rate(&self.state.ledger))
    }

    pub fn value_of_shares(&self, pool: PoolId, shares: u128) -> Result<Amount, ProtocolError> {
        Ok(self.state.pool(pool)?.value_of_shares(&self.state.ledger, shares)?)
    }
}
