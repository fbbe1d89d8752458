//! Synchronization engine.
//!
//! Components, leaves first: the conflict resolver, the operation queue, the
//! trigger scheduler and the status aggregator, wired together by
//! [`SyncService`].

mod conflict;
mod events;
mod facade;
mod operation;
mod queue;
mod scheduler;
mod status;

#[cfg(test)]
mod tests;

pub use conflict::{ConflictResolver, MergeStrategy, ResolutionOutcome};
pub use events::{EventBus, SubscriptionId, SyncEvent, SyncEventKind};
pub use facade::{SyncService, SyncServiceBuilder};
pub use operation::{OperationKey, OperationKind, SyncOperation};
pub use queue::{DrainReport, OperationOutcome, OperationQueue};
pub use scheduler::{SyncReport, TriggerScheduler};
pub use status::{
    DetailedStatus, LocalCounts, StatusAggregator, StatusSubscription, SyncHealth, SyncLevel,
    SyncStats,
};
