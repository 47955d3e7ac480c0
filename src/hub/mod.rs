//! Hub Entry Point (C10)
//!
//! The WebSocket upgrade endpoint and the per-connection read/write loop
//! that ties every other component together: credential verification,
//! connection registration, inbound dispatch, outbound draining, and the
//! shutdown sequence.

pub mod bridge;
pub mod server;
pub mod ws;

#[cfg(test)]
mod tests;

pub use server::HubState;
