//! Reserve operations: LP flows into the backstop and its admin switches.

use super::core::{AdminCap, Protocol};
use super::results::ProtocolError;
use crate::config::{IndexParams, PoolParams, ReserveParams};
use crate::custody::{TokenGateway, Transfer};
use crate::events::{DepositEvent, EventPayload, Market, WithdrawRequestedEvent, WithdrawalEvent};
use crate::premium::PremiumModel;
use crate::types::{AccountId, Amount, Rate};

impl<M: PremiumModel, T: TokenGateway> Protocol<M, T> {
    pub fn reserve_deposit(&mut self, account: AccountId, amount: Amount) -> Result<u128, ProtocolError> {
        self.atomic("reserve_deposit", |p| {
            if account.is_null() {
                return Err(ProtocolError::ZeroAddress);
            }
            let (shares, fee) = p.state.reserve.deposit(&mut p.state.ledger, account, amount)?;
            p.state.outbox.push(Transfer::into_vault(account, amount));
            p.emit_event(EventPayload::Deposit(DepositEvent {
                market: Market::Reserve,
                account,
                amount,
                fee,
                shares,
            }));
            Ok(shares)
        })
    }

    pub fn reserve_request_withdraw(&mut self, account: AccountId, shares: u128) -> Result<(), ProtocolError> {
        self.atomic("reserve_request_withdraw", |p| {
            let now = p.state.now;
            p.state.reserve.request_withdraw(account, shares, now)?;
            p.emit_event(EventPayload::WithdrawRequested(WithdrawRequestedEvent {
                market: Market::Reserve,
                account,
                shares,
            }));
            Ok(())
        })
    }

    /// Redeems queued reserve shares. Frozen while any pool pays out a claim.
    pub fn reserve_withdraw(&mut self, account: AccountId, shares: u128) -> Result<Amount, ProtocolError> {
        self.atomic("reserve_withdraw", |p| {
            let now = p.state.now;
            let claims_pending = p.state.pools.values().any(|pool| !pool.is_trading());
            let paid = p
                .state
                .reserve
                .withdraw(&mut p.state.ledger, account, shares, now, claims_pending)?;
            p.state.outbox.push(Transfer::out_of_vault(account, paid));
            p.emit_event(EventPayload::Withdrawal(WithdrawalEvent {
                market: Market::Reserve,
                account,
                shares,
                paid,
            }));
            Ok(paid)
        })
    }

    pub fn set_reserve_paused(&mut self, cap: &AdminCap, paused: bool) -> Result<(), ProtocolError> {
        self.authorize(cap)?;
        self.state.reserve.paused = paused;
        self.emit_event(EventPayload::ReservePaused { paused });
        Ok(())
    }

    pub fn set_reserve_params(&mut self, cap: &AdminCap, params: ReserveParams) -> Result<(), ProtocolError> {
        self.authorize(cap)?;
        params.validate()?;
        self.state.reserve.params = params;
        Ok(())
    }

    /// Sets the deposit fee of one market, BASE scaled.
    pub fn set_deposit_fee(&mut self, cap: &AdminCap, market: Market, rate: u128) -> Result<(), ProtocolError> {
        self.authorize(cap)?;
        match market {
            Market::Pool(id) => {
                let pool = self.state.pools.get_mut(&id).ok_or(ProtocolError::PoolNotFound(id))?;
                let params = PoolParams {
                    deposit_fee: rate,
                    ..pool.params
                };
                params.validate()?;
                pool.params = params;
            }
            Market::Index(id) => {
                let index = self.state.indices.get_mut(&id).ok_or(ProtocolError::IndexNotFound(id))?;
                let params = IndexParams {
                    deposit_fee: rate,
                    ..index.params
                };
                params.validate()?;
                index.params = params;
            }
            Market::Reserve => {
                let params = ReserveParams {
                    deposit_fee: rate,
                    ..self.state.reserve.params
                };
                params.validate()?;
                self.state.reserve.params = params;
            }
        }
        Ok(())
    }

    // views
    pub fn reserve_total_liquidity(&self) -> Amount {
        self.state.reserve.total_liquidity(&self.state.ledger)
    }

    /// Reserve LP share price in BASE units.
    pub fn reserve_rate(&self) -> Rate {
        self.state.reserve.rate(&self.state.ledger)
    }
}
