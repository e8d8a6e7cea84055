// 12.0: protocol engine. coordinates the shared ledger, pools and indices,
// applies claims and settles token movements. deterministic and transactional.

mod claims;
mod config;
mod core;
mod indices;
mod pools;
mod pricing;
mod reserve;
mod results;
mod treasury;

pub use config::EngineConfig;
pub use core::{AdminCap, Protocol};
pub use results::{ProtocolError, ResumeReport};
