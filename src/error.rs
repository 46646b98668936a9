// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the Castor operator.
//!
//! Two layers: [`StoreError`] classifies cluster state store failures into
//! the categories the reconciler cares about (not found, version conflict,
//! transient), and [`Error`] is the operator-level taxonomy that bubbles
//! from a reconcile pass to the work queue, which owns all retry policy.

use thiserror::Error;

/// Classified failure from the cluster state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist
    #[error("object not found")]
    NotFound,

    /// An update lost the resourceVersion compare-and-swap to a concurrent
    /// writer; re-diffing from a fresh read resolves it
    #[error("version conflict")]
    Conflict,

    /// Anything else: network failures, apiserver unavailability, throttling
    #[error("transient store error: {0}")]
    Transient(String),
}

impl StoreError {
    /// Classify a `kube::Error` by HTTP status code.
    ///
    /// 404 becomes [`StoreError::NotFound`], 409 becomes
    /// [`StoreError::Conflict`], everything else is treated as transient and
    /// left to the work queue's backoff.
    #[must_use]
    pub fn classify(err: &kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound,
            kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict,
            other => StoreError::Transient(other.to_string()),
        }
    }

    /// Returns true for version conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        StoreError::classify(&err)
    }
}

/// A single failed create/update within a reconcile pass.
///
/// Recorded by the Apply step without aborting the remaining operations, so
/// a pass always makes maximal forward progress.
#[derive(Debug)]
pub struct ApplyFailure {
    /// Kind of the dependent that failed (e.g., "StatefulSet")
    pub kind: &'static str,
    /// Name of the dependent that failed
    pub name: String,
    /// The classified store failure
    pub source: StoreError,
}

impl std::fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.name, self.source)
    }
}

/// Errors that can occur in the Castor operator.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading the primary resource failed (other than not-found, which is
    /// terminal success)
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The desired-state builder rejected the spec (e.g., no driver image
    /// resolvable)
    #[error("builder error: {0}")]
    Builder(String),

    /// One or more creates/updates in the Apply step failed; the rest of the
    /// pass still ran
    #[error("partial apply failure: {}", format_failures(.0))]
    PartialApply(Vec<ApplyFailure>),

    /// A watch stream ended or failed
    #[error("watch failed: {0}")]
    Watch(String),

    /// Invalid operator configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// True when every underlying failure is a version conflict.
    ///
    /// Conflict-only passes are re-enqueued immediately rather than with
    /// backoff: the next pass re-diffs from a fresh read, which is the whole
    /// conflict resolution strategy.
    #[must_use]
    pub fn is_conflict_only(&self) -> bool {
        match self {
            Error::Store(e) => e.is_conflict(),
            Error::PartialApply(failures) => failures.iter().all(|f| f.source.is_conflict()),
            _ => false,
        }
    }
}

fn format_failures(failures: &[ApplyFailure]) -> String {
    failures
        .iter()
        .map(ApplyFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
