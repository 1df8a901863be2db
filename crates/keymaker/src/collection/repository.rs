use std::fmt;

use serde::Serialize;

use super::domain::{Customer, CustomerId, Individual, IndividualId};

/// Storage abstraction for customers and the individuals they own.
///
/// Every change to an individual goes through [`CustomerRepository::modify_individual`],
/// which applies the mutation atomically with respect to other writers and bumps the
/// individual's `version`.
pub trait CustomerRepository: Send + Sync {
    fn insert(&self, customer: Customer) -> Result<Customer, RepositoryError>;
    fn list(&self) -> Result<Vec<Customer>, RepositoryError>;
    fn fetch(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError>;
    fn delete(&self, id: &CustomerId) -> Result<(), RepositoryError>;

    /// Read-modify-write a customer record. The mutation's error aborts the write.
    fn modify_customer<T, E, F>(&self, id: &CustomerId, mutation: F) -> Result<T, E>
    where
        F: FnOnce(&mut Customer) -> Result<T, E>,
        E: From<RepositoryError>;

    /// Read-modify-write one individual. When `expected_version` is given and no longer
    /// matches, nothing is written and [`RepositoryError::VersionConflict`] is returned.
    fn modify_individual<T, E, F>(
        &self,
        customer_id: &CustomerId,
        individual_id: &IndividualId,
        expected_version: Option<u64>,
        mutation: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&Customer, &mut Individual) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Kind of record a repository lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Customer,
    Individual,
    Communication,
    ScheduledAction,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::Customer => "customer",
            RecordKind::Individual => "individual",
            RecordKind::Communication => "communication",
            RecordKind::ScheduledAction => "scheduled action",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0} already exists")]
    Conflict(RecordKind),
    #[error("{0} not found")]
    NotFound(RecordKind),
    #[error("individual changed concurrently (expected version {expected}, found {found})")]
    VersionConflict { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
