//! Session Module
//!
//! Turns connect requests into live client sessions.
//!
//! ## Architecture
//! ```text
//!  registration channel
//!          │  connect messages
//!          ▼
//!   ┌─────────────┐  gate permit   ┌──────────────────┐
//!   │  listener   │───────────────►│ bounded queue    │
//!   └─────────────┘  (blocks when  └────────┬─────────┘
//!                     sessions full)        │
//!                          ┌────────────────┼────────────────┐
//!                          ▼                ▼                ▼
//!                   session worker   session worker   session worker
//! ```
//! - The gate caps simultaneously active sessions; a permit is held until
//!   the session fully disconnects.
//! - The queue absorbs bursts of connect attempts independently of the gate.

mod transport;
mod admission;
mod worker;

pub use transport::{ChannelReader, ChannelWriter, FifoTransport, Transport};
pub use admission::{PendingSession, SessionAdmission};
pub use worker::{Session, SessionState, SessionWorker};
