//! Claims: applying an incident, redeeming cover, settling the debt and reopening the pool.

use super::core::{AdminCap, Protocol, ProtocolState};
use super::results::{ProtocolError, ResumeReport};
use crate::cover::Incident;
use crate::custody::{TokenGateway, Transfer};
use crate::events::{CoverAppliedEvent, EventPayload, PoolResumedEvent, RedeemedEvent};
use crate::index::AllocationReport;
use crate::premium::PremiumModel;
use crate::types::{AccountId, Amount, Hash32, Holder, IndexId, InsuranceId, PoolId};
use tracing::{info, warn};

impl<M: PremiumModel, T: TokenGateway> Protocol<M, T> {
    /// Starts a payout on `pool`. Every index listing the pool is locked until it resumes.
    pub fn apply_cover(
        &mut self,
        cap: &AdminCap,
        pool: PoolId,
        incident: Incident,
        pending_secs: u64,
    ) -> Result<Vec<IndexId>, ProtocolError> {
        self.authorize(cap)?;
        self.atomic("apply_cover", |p| {
            let now = p.state.now;
            let ProtocolState { pools, indices, .. } = &mut p.state;
            let target = pools.get_mut(&pool).ok_or(ProtocolError::PoolNotFound(pool))?;
            let credited = target.apply_cover(incident.clone(), pending_secs, now)?;
            let pending_end = target.pending_end();

            let mut locked_indices = Vec::new();
            for index in indices.values_mut() {
                if credited.contains(&index.id) || index.listed_pools().any(|id| id == pool) {
                    index.locked = true;
                    locked_indices.push(index.id);
                }
            }
            info!(pool = pool.0, locked = locked_indices.len(), "cover applied");
            p.emit_event(EventPayload::CoverApplied(CoverAppliedEvent {
                pool,
                payout_numerator: incident.payout_numerator,
                payout_denominator: incident.payout_denominator,
                incident_timestamp: incident.incident_timestamp,
                pending_end,
                locked_indices: locked_indices.clone(),
            }));
            Ok(locked_indices)
        })
    }

    /// Pays `claimant` for an insurance covered by the current incident.
    pub fn redeem(
        &mut self,
        pool: PoolId,
        insurance: InsuranceId,
        claimant: AccountId,
        proof: &[Hash32],
    ) -> Result<Amount, ProtocolError> {
        self.atomic("redeem", |p| {
            let target = p.state.pools.get_mut(&pool).ok_or(ProtocolError::PoolNotFound(pool))?;
            let payout = target.redeem(&mut p.state.ledger, insurance, claimant, proof, p.verifier.as_ref())?;
            p.state.outbox.push(Transfer::out_of_vault(claimant, payout));
            p.emit_event(EventPayload::Redeemed(RedeemedEvent {
                pool,
                insurance,
                claimant,
                payout,
            }));
            Ok(payout)
        })
    }

    /// Settles a finished payout and reopens the pool. Anyone may call it once the pending period ends.
    ///
    /// Indices carry the share of the debt their credit bore in the pool's liquidity, paid from
    /// their own value, and the reserve covers what an index falls short. The pool's LPs carry
    /// the rest. Whatever is still owed moves to the unresolved account. Indices whose pools all
    /// trade again are unlocked and rebalanced.
    pub fn resume_pool(&mut self, pool: PoolId) -> Result<ResumeReport, ProtocolError> {
        self.atomic("resume_pool", |p| {
            let now = p.state.now;
            let ProtocolState {
                ledger,
                pools,
                indices,
                reserve,
                ..
            } = &mut p.state;
            let target = pools.get_mut(&pool).ok_or(ProtocolError::PoolNotFound(pool))?;
            let plan = target.resume_plan(ledger, now)?;

            let mut compensations = Vec::with_capacity(plan.per_index.len());
            let mut reserve_compensations = Vec::new();
            let mut compensated = 0;
            for (index_id, share) in &plan.per_index {
                let owed = (*share).min(ledger.debt_of(Holder::Pool(pool)));
                let index = indices
                    .get_mut(index_id)
                    .ok_or(ProtocolError::IndexNotFound(*index_id))?;
                let paid = index.compensate(ledger, pool, owed)?;
                compensated += paid;
                compensations.push((*index_id, paid));
                if paid < owed {
                    let backed = reserve.compensate(ledger, pool, owed - paid)?;
                    if backed > 0 {
                        reserve_compensations.push((*index_id, backed));
                    }
                    if paid + backed < owed {
                        warn!(index = index_id.0, pool = pool.0, owed, paid, backed, "index share not fully covered");
                    }
                }
            }
            let from_reserve: Amount = reserve_compensations.iter().map(|(_, amount)| amount).sum();
            let outcome = target.finish_resume(ledger, &plan, compensated + from_reserve)?;

            let mut rebalanced: Vec<(IndexId, AllocationReport)> = Vec::new();
            for index in indices.values_mut() {
                let member = index.listed_pools().any(|id| id == pool);
                let ready = index
                    .listed_pools()
                    .all(|id| pools.get(&id).map_or(false, |listed| listed.is_trading()));
                if index.locked && member && ready {
                    index.resume(pools)?;
                    let liquidity = index.total_liquidity(ledger, pools)?;
                    let report = index.adjust_alloc(ledger, pools, liquidity)?;
                    rebalanced.push((index.id, report));
                }
            }

            if outcome.shortage > 0 {
                warn!(pool = pool.0, shortage = outcome.shortage, "claim debt left unresolved");
            }
            for (index, amount) in &compensations {
                p.emit_event(EventPayload::Compensated {
                    index: *index,
                    pool,
                    amount: *amount,
                });
            }
            for (index, amount) in &reserve_compensations {
                p.emit_event(EventPayload::ReserveCompensated {
                    index: *index,
                    pool,
                    amount: *amount,
                });
            }
            p.emit_event(EventPayload::PoolResumed(PoolResumedEvent {
                pool,
                debt: plan.debt,
                compensated,
                from_reserve,
                offset_by_pool: outcome.offset_by_pool,
                shortage: outcome.shortage,
            }));
            for (index, report) in &rebalanced {
                p.emit_event(EventPayload::IndexResumed { index: *index });
                p.record_allocation(*index, report)?;
            }

            Ok(ResumeReport {
                pool,
                debt: plan.debt,
                compensations,
                reserve_compensations,
                offset_by_pool: outcome.offset_by_pool,
                shortage: outcome.shortage,
                resumed_indices: rebalanced.into_iter().map(|(index, _)| index).collect(),
            })
        })
    }

    /// Fresh tokens from `payer` pay down `target`'s debt. Returns the amount applied.
    pub fn repay_debt(&mut self, payer: AccountId, amount: Amount, target: Holder) -> Result<Amount, ProtocolError> {
        self.atomic("repay_debt", |p| {
            if payer.is_null() {
                return Err(ProtocolError::ZeroAddress);
            }
            let repaid = p.state.ledger.repay_debt(amount, target);
            p.state.outbox.push(Transfer::into_vault(payer, repaid));
            p.emit_event(EventPayload::DebtRepaid { payer, amount, repaid });
            Ok(repaid)
        })
    }
}
