//! # Dynamic-Secret Lease Registry
//!
//! Thread-safe collection of the dynamic-secret leases currently held by the
//! agent. A lease is identified by the 4-tuple
//! `(project_slug, environment, secret_path, slug)`; at most one lease exists
//! per identity. Leases are pruned 15 seconds before their server-side
//! expiry so renders happen before the service revokes them.
//!
//! All operations are short, purely in-memory, and serialised under a single
//! mutex; none of them can fail.

use std::collections::BTreeSet;
use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Map;

/// Margin subtracted from every lease expiry so consumers act before the
/// service revokes the lease.
pub const LEASE_EXPIRY_GRACE_SECONDS: i64 = 15;

fn expiry_grace() -> TimeDelta {
    TimeDelta::seconds(LEASE_EXPIRY_GRACE_SECONDS)
}

/// Identity key of a lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseKey {
    pub project_slug: String,
    pub environment: String,
    pub secret_path: String,
    pub slug: String,
}

impl LeaseKey {
    pub fn new(
        project_slug: impl Into<String>,
        environment: impl Into<String>,
        secret_path: impl Into<String>,
        slug: impl Into<String>,
    ) -> Self {
        Self {
            project_slug: project_slug.into(),
            environment: environment.into(),
            secret_path: secret_path.into(),
            slug: slug.into(),
        }
    }
}

/// An active dynamic-secret lease and the generated values bound to it.
#[derive(Debug, Clone)]
pub struct DynamicSecretLease {
    pub lease_id: String,
    pub expires_at: DateTime<Utc>,
    pub key: LeaseKey,
    /// Generated secret values, keyed by name
    pub data: Map<String, serde_json::Value>,
    /// Template workers currently consuming this lease
    pub template_ids: BTreeSet<usize>,
}

impl DynamicSecretLease {
    fn matches(&self, key: &LeaseKey) -> bool {
        self.key == *key
    }
}

/// Registry of active leases shared between template workers.
#[derive(Debug, Default)]
pub struct LeaseRegistry {
    leases: Mutex<Vec<DynamicSecretLease>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a lease, or merge its `template_ids` into an existing lease
    /// with the same identity key (the newer lease is discarded).
    pub fn append(&self, lease: DynamicSecretLease) {
        let mut leases = self.leases.lock().expect("lease registry poisoned");

        if let Some(existing) = leases.iter_mut().find(|l| l.matches(&lease.key)) {
            existing.template_ids.extend(lease.template_ids);
            return;
        }
        leases.push(lease);
    }

    /// Register a template as a consumer of the lease with the given
    /// identity key. No-op when no such lease exists.
    pub fn register_template(&self, key: &LeaseKey, template_id: usize) {
        let mut leases = self.leases.lock().expect("lease registry poisoned");

        if let Some(lease) = leases.iter_mut().find(|l| l.matches(key)) {
            lease.template_ids.insert(template_id);
        }
    }

    /// Look up a lease by identity key, returning a value copy.
    pub fn get(&self, key: &LeaseKey) -> Option<DynamicSecretLease> {
        let leases = self.leases.lock().expect("lease registry poisoned");
        leases.iter().find(|l| l.matches(key)).cloned()
    }

    /// The soonest grace-adjusted expiry across all leases, or `None` when
    /// the registry is empty.
    ///
    /// This deliberately scans every lease rather than only those consumed
    /// by `template_id`: any worker asking for its next deadline reacts to
    /// the soonest lease in the system, so all workers wake for it.
    pub fn earliest_expiry(&self, template_id: usize) -> Option<DateTime<Utc>> {
        let leases = self.leases.lock().expect("lease registry poisoned");
        let earliest = leases.iter().map(|l| l.expires_at - expiry_grace()).min();

        if let Some(at) = earliest {
            tracing::trace!(template_id, expiry = %at, "earliest lease expiry");
        }
        earliest
    }

    /// Drop every lease whose grace-adjusted expiry has passed.
    pub fn prune(&self) {
        let now = Utc::now();
        let mut leases = self.leases.lock().expect("lease registry poisoned");
        leases.retain(|l| now < l.expires_at - expiry_grace());
    }

    /// Number of live leases. Primarily for diagnostics and tests.
    pub fn len(&self) -> usize {
        self.leases.lock().expect("lease registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
