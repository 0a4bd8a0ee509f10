//! Latest-value store
//!
//! A single slot holding the most recently written [`Integration`]. Writes
//! overwrite, reads never consume, and intermediate values that nobody read in
//! time are simply gone: consumers only care about freshness.
//!
//! The slot publishes whole `Arc<Integration>` values, so a reader sees either
//! the previous integration or the new one, never a mix of the two.

mod client;

pub use client::StoreClient;

use crate::socket::SocketError;
use crate::spectrum::{Integration, Timestamp};
use crate::transport::CodecError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("Invalid integration payload from store: {0}")]
    Codec(#[from] CodecError),
    #[error("Store returned an error: {0}")]
    Remote(String),
    #[error("Unexpected response from store: {0}")]
    UnexpectedResponse(String),
}

/// Read side of a latest-value store, local or remote
pub trait LatestValueStore {
    /// Timestamp of the current integration, without transferring the spectrum
    fn timestamp(&self) -> impl Future<Output = Result<Option<Timestamp>, StoreError>> + Send;

    /// Current integration; repeated reads without a write return the same value
    fn read(&self) -> impl Future<Output = Result<Option<Arc<Integration>>, StoreError>> + Send;
}

/// In-process single-slot store
#[derive(Debug, Default)]
pub struct LatestSlot {
    current: RwLock<Option<Arc<Integration>>>,
    writes: AtomicU64,
}

impl LatestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored integration unconditionally
    pub fn write(&self, integration: Integration) {
        let integration = Arc::new(integration);
        // The lock only guards the pointer swap; a poisoned lock still holds a
        // complete value.
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(integration);
        drop(current);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn latest(&self) -> Option<Arc<Integration>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current_timestamp(&self) -> Option<Timestamp> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|integration| integration.timestamp())
    }

    /// Number of writes since creation
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl LatestValueStore for LatestSlot {
    async fn timestamp(&self) -> Result<Option<Timestamp>, StoreError> {
        Ok(self.current_timestamp())
    }

    async fn read(&self) -> Result<Option<Arc<Integration>>, StoreError> {
        Ok(self.latest())
    }
}

impl<S: LatestValueStore + Send + Sync> LatestValueStore for Arc<S> {
    fn timestamp(&self) -> impl Future<Output = Result<Option<Timestamp>, StoreError>> + Send {
        S::timestamp(self)
    }

    fn read(&self) -> impl Future<Output = Result<Option<Arc<Integration>>, StoreError>> + Send {
        S::read(self)
    }
}
