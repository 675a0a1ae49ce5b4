//! Tether client — binds remote projects to a locally running client
//! process over its control channel.
//!
//! Public API surface:
//! - [`channel`] — [`ControlChannel`] seam and the Unix-socket implementation
//! - [`store`] — last-used credential persistence
//! - [`attach`] — per-project attachment state machine
//! - [`batch`] — sequential configuration retriever
//! - [`service`] — the [`AttachService`] orchestrator
//! - [`error`] — [`ChannelError`], [`StoreError`], [`ServiceError`]

pub mod attach;
pub mod batch;
pub mod channel;
pub mod error;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelRequest, ChannelResponse, ControlChannel, SocketChannel};
pub use error::{ChannelError, ServiceError, StoreError};
pub use service::AttachService;
pub use store::{JsonSettingsStore, SettingsStore};

/// Lock a mutex, recovering the data if a previous holder panicked. The
/// guarded structures stay consistent across every write in this crate, so
/// poisoning carries no information here.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
