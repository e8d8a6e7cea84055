//! Protocol fees and the yield controller.

use super::core::{AdminCap, Protocol};
use super::results::ProtocolError;
use crate::custody::{CustodyError, Party, TokenGateway, Transfer};
use crate::events::EventPayload;
use crate::premium::PremiumModel;
use crate::types::{AccountId, Amount, Holder};

impl<M: PremiumModel, T: TokenGateway> Protocol<M, T> {
    /// Parks idle vault tokens with the yield controller. Holders keep their value.
    pub fn utilize(&mut self, cap: &AdminCap, amount: Amount) -> Result<(), ProtocolError> {
        self.authorize(cap)?;
        self.atomic("utilize", |p| {
            p.state.ledger.utilize(amount)?;
            p.state.outbox.push(Transfer {
                from: Party::Vault,
                to: Party::YieldController,
                amount,
            });
            p.emit_event(EventPayload::Utilized { amount });
            Ok(())
        })
    }

    /// Pulls parked tokens back into the vault.
    pub fn unutilize(&mut self, cap: &AdminCap, amount: Amount) -> Result<(), ProtocolError> {
        self.authorize(cap)?;
        self.atomic("unutilize", |p| {
            p.state.ledger.unutilize(amount)?;
            p.emit_event(EventPayload::Unutilized { amount });
            Ok(())
        })
    }

    /// Books gains the yield controller already holds. Every holder is repriced pro rata.
    pub fn accrue_yield(&mut self, cap: &AdminCap, gain: Amount) -> Result<(), ProtocolError> {
        self.authorize(cap)?;
        self.atomic("accrue_yield", |p| {
            p.state.ledger.accrue_yield(gain);
            let held = p.token.balance_of(Party::YieldController);
            let utilized = p.state.ledger.utilized();
            if held < utilized {
                return Err(CustodyError::InsufficientBalance {
                    party: Party::YieldController,
                    available: held,
                    requested: utilized,
                }
                .into());
            }
            p.emit_event(EventPayload::YieldAccrued { amount: gain });
            Ok(())
        })
    }

    pub fn treasury_value(&self) -> Amount {
        self.state.ledger.underlying_value(Holder::Treasury)
    }

    /// Pays accumulated protocol fees out to `to`.
    pub fn withdraw_treasury(&mut self, cap: &AdminCap, to: AccountId, amount: Amount) -> Result<Amount, ProtocolError> {
        self.authorize(cap)?;
        self.atomic("withdraw_treasury", |p| {
            if to.is_null() {
                return Err(ProtocolError::ZeroAddress);
            }
            let paid = p.state.ledger.withdraw_value(amount, Holder::Treasury)?.paid;
            p.state.outbox.push(Transfer::out_of_vault(to, paid));
            p.emit_event(EventPayload::TreasuryWithdrawal { to, amount: paid });
            Ok(paid)
        })
    }
}
