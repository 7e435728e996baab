//! Server side of the engine (spec §4.2–§4.6): connection state machine
//! plus the accept/readiness multiplexer.

pub mod connection;
pub mod multiplexer;

pub use connection::{ConnEvent, Connection};
pub use multiplexer::{ConnId, Server};
