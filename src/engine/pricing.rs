//! Premium quotes and curve administration.

use super::core::{AdminCap, Protocol};
use super::results::ProtocolError;
use crate::custody::TokenGateway;
use crate::events::EventPayload;
use crate::premium::{BondingPremium, PremiumModel};
use crate::types::{Amount, PoolId, PremiumRate};

impl<M: PremiumModel, T: TokenGateway> Protocol<M, T> {
    /// Annual rate a pool quotes at its current utilization.
    pub fn current_premium_rate(&self, pool: PoolId) -> Result<PremiumRate, ProtocolError> {
        let target = self.state.pool(pool)?;
        let total = target.total_liquidity(&self.state.ledger);
        Ok(self.model.current_rate(total, target.locked_amount())?)
    }

    /// Premium for `amount` of cover over `span_secs`, before the protocol fee split.
    pub fn get_premium(&self, pool: PoolId, amount: Amount, span_secs: u64) -> Result<Amount, ProtocolError> {
        let target = self.state.pool(pool)?;
        let total = target.total_liquidity(&self.state.ledger);
        Ok(self.model.premium(amount, span_secs, total, target.locked_amount())?)
    }
}

impl<T: TokenGateway> Protocol<BondingPremium, T> {
    /// Sets the base fee and curvature. `a` is derived from `k`.
    pub fn set_premium(&mut self, cap: &AdminCap, b: u128, k: u128) -> Result<(), ProtocolError> {
        self.authorize(cap)?;
        let mut model = self.model.clone();
        model.set_premium(b, k)?;
        let curve = *model.params();
        let mut params = self.params.clone();
        params.curve = curve;
        params.validate()?;

        self.model = model;
        self.params = params;
        self.emit_event(EventPayload::PremiumSet {
            k: curve.k,
            b: curve.b,
            a: curve.a,
        });
        Ok(())
    }

    /// Discounted base fee for deep pools below a utilization threshold.
    pub fn set_premium2(
        &mut self,
        cap: &AdminCap,
        low_risk_liquidity: u128,
        low_risk_b: u128,
        low_risk_util: u128,
    ) -> Result<(), ProtocolError> {
        self.authorize(cap)?;
        self.model
            .set_premium2(low_risk_liquidity, low_risk_b, low_risk_util)?;
        self.params.curve = *self.model.params();
        self.emit_event(EventPayload::LowRiskPremiumSet {
            liquidity: low_risk_liquidity,
            b: low_risk_b,
            util: low_risk_util,
        });
        Ok(())
    }
}
