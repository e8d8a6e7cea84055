// cover-core: mutualized coverage protocol.
// one shared vault ledger backs many underwriting pools; indices lever LP capital
// across pools as credit; a bonding curve prices cover by utilization.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, Holder, Rate, Leverage, Timestamp
//   2.x  math.rs: U256 mul_div, sqrt, fixed point ln
//   3.x  premium.rs: PremiumModel, bonding curve, flat rate
//   4.x  ledger.rs: attribution ledger, debt, yield controller
//   5.x  lp.rs: LP share book and withdrawal queue
//   6.x  cover.rs: insurances, incidents, merkle claim proofs
//   7.x  config.rs: pool/index params, curve, env presets
//   8.x  pool.rs: underwriting market, reward per credit accrual
//   9.x  index.rs: levered allocation across pools, adjust_alloc
//   10.x custody.rs: token gateway, in-memory token
//   11.x events.rs: state transition events for audit
//   12.x engine/: protocol: atomic operations, claims, admin
//   13.x reserve.rs: reserve market backing index shortfalls

// core accounting
pub mod index;
pub mod ledger;
pub mod lp;
pub mod math;
pub mod pool;
pub mod premium;
pub mod reserve;
pub mod types;

// protocol surface
pub mod config;
pub mod cover;
pub mod custody;
pub mod engine;
pub mod events;

// re exports for convenience
pub use config::*;
pub use cover::*;
pub use custody::*;
pub use engine::*;
pub use events::*;
pub use index::*;
pub use ledger::*;
pub use lp::*;
pub use pool::*;
pub use premium::*;
pub use reserve::*;
pub use types::*;
pub use math::MathError;
