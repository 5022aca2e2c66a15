//! Optimistic mutations with rollback.
//!
//! Every toggle-style action (like, save, follow, mark-read) and every
//! delete goes through [`OptimisticMutationCoordinator::mutate`]:
//! - The cache changes immediately
//! - The confirming call runs in the background
//! - Authoritative values from the response replace the optimistic guess
//! - On failure the snapshot taken before the change is restored
//!
//! A second mutation of the same class on the same target while one is in
//! flight is ignored.

mod coordinator;
mod types;

pub use coordinator::OptimisticMutationCoordinator;
pub use types::{MutationOutcome, MutationRequest, MutationSnapshot, MutationTarget};
