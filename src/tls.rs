//! Re-exports the TLS collaborator seam (spec §6 "TLS integration"). The
//! crate ships no TLS implementation of its own — same stance the
//! original reference takes by accepting an already-constructed
//! `ssl_context` — callers bring their own [`TlsContext`] backed by
//! whichever TLS crate fits their deployment.

pub use crate::io::TlsContext;
