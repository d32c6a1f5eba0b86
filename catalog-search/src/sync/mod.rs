//! Keeping the vector store in step with product mutations
//!
//! [`EmbeddingSyncOrchestrator`] applies product events to the vector store. Failures
//! land in the [`DeadLetterRegistry`] and feed the [`FailureRateMonitor`];
//! [`RetrySweeper`] replays due jobs later.

use crate::types::{Product, ProductId};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod dead_letter;
pub mod monitor;
pub mod orchestrator;
pub mod sweeper;

pub use dead_letter::{
    calculate_retry_time, DeadLetterRegistry, FailedSyncJob, InMemoryDeadLetterRegistry,
    JobStatus, MAX_SYNC_ATTEMPTS, RETRY_LEASE_SECONDS,
};
pub use monitor::{Alert, AlertNotifier, FailureRateMonitor, FailureWindowStats, LoggingAlertNotifier};
pub use orchestrator::{EmbeddingSyncOrchestrator, SyncOutcome, SyncReport};
pub use sweeper::{RetrySweeper, SweepReport};

/// Kind of product mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    /// Product created
    Create,
    /// Product changed
    Update,
    /// Product removed
    Delete,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
        })
    }
}

/// A product mutation to mirror into the vector store
///
/// Serialized with an internal `kind` tag; this is also the payload snapshot kept on
/// dead-letter jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductEvent {
    /// A new product
    Created {
        /// The product as created
        product: Product,
    },
    /// A changed product
    Updated {
        /// The product's new state
        product: Product,
    },
    /// A removed product
    Deleted {
        /// Identifier of the removed product
        product_id: ProductId,
    },
}

impl ProductEvent {
    /// Event for a newly created product
    pub fn created(product: Product) -> Self {
        ProductEvent::Created { product }
    }

    /// Event for a changed product
    pub fn updated(product: Product) -> Self {
        ProductEvent::Updated { product }
    }

    /// Event for a removed product
    pub fn deleted(product_id: impl Into<ProductId>) -> Self {
        ProductEvent::Deleted {
            product_id: product_id.into(),
        }
    }

    /// Mutation kind
    pub fn operation(&self) -> SyncOperation {
        match self {
            ProductEvent::Created { .. } => SyncOperation::Create,
            ProductEvent::Updated { .. } => SyncOperation::Update,
            ProductEvent::Deleted { .. } => SyncOperation::Delete,
        }
    }

    /// Product the event is about
    pub fn product_id(&self) -> &ProductId {
        match self {
            ProductEvent::Created { product } | ProductEvent::Updated { product } => &product.id,
            ProductEvent::Deleted { product_id } => product_id,
        }
    }
}
