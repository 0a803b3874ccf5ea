//! Persistence stage.
//!
//! Drained generations are reconciled with storage by a [`PersistenceFlusher`]
//! and written through a role's [`MetricsDao`] in a single batch.

pub mod dao;
pub mod flusher;
pub mod memory;

pub use dao::{BatchItem, MetricsDao};
pub use flusher::{FlushReport, FlushSnapshot, PersistenceFlusher};
pub use memory::InMemoryMetricsDao;
