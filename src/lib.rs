//! Event-triggered settlement oracle for PNP Twitter markets.
//!
//! On a `PnpTwitterMarketCreated` log: resolve the market's question and
//! settler handle on-chain, gather the handle's recent posts, classify
//! YES/NO, and return a `settleTwitterMarket` payload for the host to
//! submit. See `pipeline` for the run order and failure policy.

pub mod classify;
pub mod config;
pub mod evidence;
pub mod market;
pub mod outcome;
pub mod pipeline;
pub mod trigger;
pub mod watch;
