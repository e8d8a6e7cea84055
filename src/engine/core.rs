// 12.0 engine/core.rs: the protocol. owns the shared ledger, every pool and index,
// the audit log and the token gateway.
// 12.1 every public operation runs through `atomic`: state is snapshotted first and restored
// on any error, and queued token transfers settle only after the internal books commit.

use super::config::EngineConfig;
use super::results::ProtocolError;
use crate::config::ProtocolConfig;
use crate::cover::{ClaimVerifier, MerkleVerifier};
use crate::custody::{InMemoryToken, Party, TokenGateway, Transfer};
use crate::events::{Event, EventId, EventPayload, OperationRejectedEvent};
use crate::index::{AllocationReport, Index, PoolMap};
use crate::ledger::VaultLedger;
use crate::pool::Pool;
use crate::premium::{BondingPremium, PremiumModel};
use crate::reserve::Reserve;
use crate::types::{AccountId, Amount, IndexId, PoolId, Timestamp};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

static NEXT_PROTOCOL_ID: AtomicU64 = AtomicU64::new(1);

/// Owner capability. Only the cap minted with a protocol passes its admin checks.
#[derive(Debug)]
pub struct AdminCap {
    protocol_id: u64,
    holder: AccountId,
}

impl AdminCap {
    pub fn holder(&self) -> AccountId {
        self.holder
    }
}

/** 12.2: everything an operation may mutate. cloned as the rollback snapshot */
#[derive(Debug, Clone, Default)]
pub(super) struct ProtocolState {
    pub(super) ledger: VaultLedger,
    pub(super) pools: PoolMap,
    pub(super) indices: BTreeMap<IndexId, Index>,
    pub(super) reserve: Reserve,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) next_pool_id: u32,
    pub(super) next_index_id: u32,
    pub(super) now: Timestamp,
    pub(super) outbox: Vec<Transfer>,
}

impl ProtocolState {
    pub(super) fn pool(&self, id: PoolId) -> Result<&Pool, ProtocolError> {
        self.pools.get(&id).ok_or(ProtocolError::PoolNotFound(id))
    }

    pub(super) fn index(&self, id: IndexId) -> Result<&Index, ProtocolError> {
        self.indices.get(&id).ok_or(ProtocolError::IndexNotFound(id))
    }

    /// Unlocked indices that list `pool`.
    pub(super) fn indices_listing(&self, pool: PoolId) -> Vec<IndexId> {
        self.indices
            .values()
            .filter(|index| !index.locked && index.listed_pools().any(|p| p == pool))
            .map(|index| index.id)
            .collect()
    }

    /// Brings an index back to its target leverage at its current liquidity.
    pub(super) fn rebalance(&mut self, id: IndexId) -> Result<AllocationReport, ProtocolError> {
        let ProtocolState {
            ledger, pools, indices, ..
        } = self;
        let index = indices.get_mut(&id).ok_or(ProtocolError::IndexNotFound(id))?;
        if index.locked {
            return Err(ProtocolError::IndexLocked(id));
        }
        let liquidity = index.total_liquidity(ledger, pools)?;
        Ok(index.adjust_alloc(ledger, pools, liquidity)?)
    }
}

/** 12.3: main protocol struct */
#[derive(Debug)]
pub struct Protocol<M: PremiumModel = BondingPremium, T: TokenGateway = InMemoryToken> {
    pub(super) id: u64,
    pub(super) config: EngineConfig,
    pub(super) params: ProtocolConfig,
    pub(super) model: M,
    pub(super) token: T,
    pub(super) verifier: Box<dyn ClaimVerifier>,
    pub(super) state: ProtocolState,
}

impl Protocol<BondingPremium, InMemoryToken> {
    /// Bonding curve pricing from `params.curve`, in-memory token, merkle claim proofs.
    pub fn new(
        owner: AccountId,
        params: ProtocolConfig,
        config: EngineConfig,
    ) -> Result<(Self, AdminCap), ProtocolError> {
        let model = BondingPremium::new(params.curve);
        Self::with_parts(owner, params, config, model, InMemoryToken::new())
    }
}

impl<M: PremiumModel, T: TokenGateway> Protocol<M, T> {
    pub fn with_parts(
        owner: AccountId,
        params: ProtocolConfig,
        config: EngineConfig,
        model: M,
        token: T,
    ) -> Result<(Self, AdminCap), ProtocolError> {
        if owner.is_null() {
            return Err(ProtocolError::ZeroAddress);
        }
        params.validate()?;
        let id = NEXT_PROTOCOL_ID.fetch_add(1, Ordering::Relaxed);
        let reserve = Reserve::new(params.reserve);
        let protocol = Self {
            id,
            config,
            params,
            model,
            token,
            verifier: Box::new(MerkleVerifier),
            state: ProtocolState {
                next_event_id: 1,
                next_pool_id: 1,
                next_index_id: 1,
                reserve,
                ..ProtocolState::default()
            },
        };
        info!(protocol = id, owner = owner.0, "protocol created");
        Ok((
            protocol,
            AdminCap {
                protocol_id: id,
                holder: owner,
            },
        ))
    }

    pub fn with_verifier(mut self, verifier: impl ClaimVerifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    pub(super) fn authorize(&self, cap: &AdminCap) -> Result<(), ProtocolError> {
        if cap.protocol_id != self.id {
            return Err(ProtocolError::Unauthorized);
        }
        Ok(())
    }

    /// Runs `op` as one transaction. Any error restores the snapshot and drops queued transfers.
    pub(super) fn atomic<R>(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&mut Self) -> Result<R, ProtocolError>,
    ) -> Result<R, ProtocolError> {
        let snapshot = self.state.clone();
        let result = match op(self) {
            Ok(value) => self.settle_transfers(snapshot.ledger.utilized()).map(|_| value),
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            self.state = snapshot;
            warn!(operation, error = %err, "operation rolled back");
            if self.config.record_rejections {
                self.emit_event(EventPayload::OperationRejected(OperationRejectedEvent {
                    operation: operation.to_string(),
                    reason: err.to_string(),
                }));
            }
        }
        result
    }

    // value pulled back from the yield controller moves first so payouts can draw on it
    fn settle_transfers(&mut self, utilized_before: Amount) -> Result<(), ProtocolError> {
        let mut batch = std::mem::take(&mut self.state.outbox);
        let utilized = self.state.ledger.utilized();
        if utilized_before > utilized {
            batch.insert(
                0,
                Transfer {
                    from: Party::YieldController,
                    to: Party::Vault,
                    amount: utilized_before - utilized,
                },
            );
        }
        self.token.validate_batch(&batch)?;
        for transfer in batch.iter().filter(|t| t.amount > 0) {
            let tx_id = self.token.transfer(transfer)?;
            debug!(tx = tx_id.0, from = %transfer.from, to = %transfer.to, amount = transfer.amount, "transfer settled");
        }
        Ok(())
    }

    // 12.4: time control
    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.state.now = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.state.now
    }

    pub fn advance_time(&mut self, secs: u64) {
        self.state.now = self.state.now.plus(secs);
    }

    // 12.5: registry
    pub fn create_pool(&mut self, cap: &AdminCap) -> Result<PoolId, ProtocolError> {
        self.authorize(cap)?;
        let id = PoolId(self.state.next_pool_id);
        self.state.next_pool_id += 1;
        self.state.pools.insert(id, Pool::new(id, self.params.pool));
        self.emit_event(EventPayload::PoolCreated { pool: id });
        Ok(id)
    }

    pub fn create_index(&mut self, cap: &AdminCap) -> Result<IndexId, ProtocolError> {
        self.authorize(cap)?;
        let id = IndexId(self.state.next_index_id);
        self.state.next_index_id += 1;
        self.state.indices.insert(id, Index::new(id, self.params.index));
        self.emit_event(EventPayload::IndexCreated { index: id });
        Ok(id)
    }

    pub fn ledger(&self) -> &VaultLedger {
        &self.state.ledger
    }

    pub fn pool(&self, id: PoolId) -> Option<&Pool> {
        self.state.pools.get(&id)
    }

    pub fn index(&self, id: IndexId) -> Option<&Index> {
        self.state.indices.get(&id)
    }

    pub fn reserve(&self) -> &Reserve {
        &self.state.reserve
    }

    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.state.pools.values()
    }

    pub fn indices(&self) -> impl Iterator<Item = &Index> {
        self.state.indices.values()
    }

    pub fn params(&self) -> &ProtocolConfig {
        &self.params
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.state.events.len().saturating_sub(count);
        &self.state.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.state.events
    }

    /// Book-keeping invariants across the ledger, pools, indices and the vault's tokens.
    pub fn invariants_hold(&self) -> bool {
        let state = &self.state;
        let credit_sums = state.pools.values().all(|pool| {
            pool.credit_lines().map(|(_, line)| line.credit).sum::<Amount>() == pool.total_credit()
        });
        let allocations = state.indices.values().all(|index| {
            let allocated: Amount = index
                .listed_pools()
                .filter_map(|id| state.pools.get(&id))
                .map(|pool| pool.credit_of(index.id))
                .sum();
            allocated == index.total_allocated_credit()
        });
        let vault_backed = self.token.balance_of(Party::Vault) == state.ledger.available();
        state.ledger.is_consistent() && credit_sums && allocations && vault_backed
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.state.next_event_id), self.state.now, payload);
        self.state.next_event_id += 1;

        if self.config.verbose {
            info!(event = event.id.0, payload = ?event.payload, "event");
        } else {
            debug!(event = event.id.0, payload = ?event.payload, "event");
        }

        self.state.events.push(event);

        if self.state.events.len() > self.config.max_events {
            let drain_count = self.state.events.len() - self.config.max_events;
            self.state.events.drain(0..drain_count);
        }
    }
}
