// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`ClusterStore`] double used by the test suite.
//!
//! Behaves like the apiserver for the operations the reconciler performs:
//! objects get monotonically increasing resource versions on every write,
//! updates enforce resourceVersion compare-and-swap, and named writes can be
//! made to fail to exercise partial-failure isolation.

use crate::crd::{CSIDriverDeployment, CSIDriverDeploymentStatus};
use crate::error::StoreError;
use crate::store::{ClusterStore, Dependent, DependentKind, ReconcileKey};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

type ObjectKey = (DependentKind, String, String);

#[derive(Default)]
struct FakeState {
    primaries: HashMap<ReconcileKey, CSIDriverDeployment>,
    objects: HashMap<ObjectKey, Dependent>,
    statuses: HashMap<ReconcileKey, CSIDriverDeploymentStatus>,
    /// Writes (creates + updates) performed so far
    writes: u64,
    /// Status patches performed so far
    status_writes: u64,
    next_version: u64,
    /// Dependent names whose next write fails with a transient error
    fail_writes: HashSet<String>,
    /// Dependent names whose next write loses the version race, once
    conflict_once: HashSet<String>,
}

/// In-memory cluster state store for tests.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
}

impl FakeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a primary resource.
    pub fn put_primary(&self, key: ReconcileKey, primary: CSIDriverDeployment) {
        self.state.lock().unwrap().primaries.insert(key, primary);
    }

    /// Remove a primary resource, simulating external deletion.
    pub fn remove_primary(&self, key: &ReconcileKey) {
        self.state.lock().unwrap().primaries.remove(key);
    }

    /// Remove one dependent, simulating an external actor deleting it.
    pub fn remove_dependent(&self, kind: DependentKind, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .objects
            .remove(&object_key(kind, namespace, name));
    }

    /// All writes (creates and updates) performed so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.state.lock().unwrap().writes
    }

    /// Status patches performed so far.
    #[must_use]
    pub fn status_write_count(&self) -> u64 {
        self.state.lock().unwrap().status_writes
    }

    /// Number of dependents currently stored.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    /// Fetch one stored dependent.
    #[must_use]
    pub fn dependent(&self, kind: DependentKind, namespace: &str, name: &str) -> Option<Dependent> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&object_key(kind, namespace, name))
            .cloned()
    }

    /// All stored dependents.
    #[must_use]
    pub fn dependents(&self) -> Vec<Dependent> {
        self.state.lock().unwrap().objects.values().cloned().collect()
    }

    /// Make every write to the named dependent fail with a transient error
    /// until [`FakeStore::heal`] is called.
    pub fn fail_writes_to(&self, name: &str) {
        self.state.lock().unwrap().fail_writes.insert(name.to_string());
    }

    /// Make the next write to the named dependent lose the resourceVersion
    /// race with a simulated concurrent editor. One-shot: the write after
    /// the conflict succeeds.
    pub fn conflict_next_write_to(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .conflict_once
            .insert(name.to_string());
    }

    /// Clear all injected failures.
    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_writes.clear();
        state.conflict_once.clear();
    }

    /// The last status patched for a key, if any.
    #[must_use]
    pub fn status(&self, key: &ReconcileKey) -> Option<CSIDriverDeploymentStatus> {
        self.state.lock().unwrap().statuses.get(key).cloned()
    }
}

fn object_key(kind: DependentKind, namespace: &str, name: &str) -> ObjectKey {
    // Cluster-scoped kinds are stored under an empty namespace so lookups
    // are identical regardless of the caller's namespace argument.
    let ns = if kind.cluster_scoped() {
        String::new()
    } else {
        namespace.to_string()
    };
    (kind, ns, name.to_string())
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn get_primary(
        &self,
        key: &ReconcileKey,
    ) -> Result<Option<CSIDriverDeployment>, StoreError> {
        Ok(self.state.lock().unwrap().primaries.get(key).cloned())
    }

    async fn get(
        &self,
        kind: DependentKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Dependent>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .objects
            .get(&object_key(kind, namespace, name))
            .cloned())
    }

    async fn create(&self, namespace: &str, dep: &Dependent) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let name = dep.name();
        if state.fail_writes.contains(&name) {
            return Err(StoreError::Transient(format!("injected failure for {name}")));
        }
        if state.conflict_once.remove(&name) {
            return Err(StoreError::Conflict);
        }
        let key = object_key(dep.kind(), namespace, &name);
        if state.objects.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        state.next_version += 1;
        let mut stored = dep.clone();
        stored.set_resource_version(Some(state.next_version.to_string()));
        state.objects.insert(key, stored);
        state.writes += 1;
        Ok(())
    }

    async fn update(&self, namespace: &str, dep: &Dependent) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let name = dep.name();
        if state.fail_writes.contains(&name) {
            return Err(StoreError::Transient(format!("injected failure for {name}")));
        }
        if state.conflict_once.remove(&name) {
            return Err(StoreError::Conflict);
        }
        let key = object_key(dep.kind(), namespace, &name);
        let Some(existing) = state.objects.get(&key) else {
            return Err(StoreError::NotFound);
        };
        if existing.resource_version() != dep.resource_version() {
            return Err(StoreError::Conflict);
        }
        state.next_version += 1;
        let mut stored = dep.clone();
        stored.set_resource_version(Some(state.next_version.to_string()));
        state.objects.insert(key, stored);
        state.writes += 1;
        Ok(())
    }

    async fn delete(
        &self,
        kind: DependentKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes.contains(name) {
            return Err(StoreError::Transient(format!("injected failure for {name}")));
        }
        if state
            .objects
            .remove(&object_key(kind, namespace, name))
            .is_some()
        {
            state.writes += 1;
        }
        Ok(())
    }

    async fn patch_status(
        &self,
        key: &ReconcileKey,
        status: &CSIDriverDeploymentStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.primaries.get_mut(key) {
            Some(primary) => primary.status = Some(status.clone()),
            None => return Err(StoreError::NotFound),
        }
        state.statuses.insert(key.clone(), status.clone());
        state.status_writes += 1;
        Ok(())
    }
}
