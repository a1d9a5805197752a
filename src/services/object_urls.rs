use crate::models::{LocalBlob, RemoteFile};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    /// Points at a remote file; never revoked.
    Borrowed,
    /// Minted for an in-memory blob; revoked exactly once.
    Owned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UrlStats {
    pub acquired: u64,
    pub revoked: u64,
    pub live: usize,
}

struct UrlRegistry {
    origin: String,
    entries: DashMap<Uuid, LocalBlob>,
    acquired: AtomicU64,
    revoked: AtomicU64,
}

impl UrlRegistry {
    fn revoke(&self, id: &Uuid) -> bool {
        if self.entries.remove(id).is_some() {
            self.revoked.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Revoked object URL {}", id);
            true
        } else {
            false
        }
    }
}

struct Lease {
    id: Uuid,
    registry: Weak<UrlRegistry>,
}

/// A URL a presentation component can render inline.
///
/// Owned handles are not `Clone`; whoever holds one is responsible for it,
/// and dropping it revokes the URL.
pub struct PreviewHandle {
    url: String,
    ownership: Ownership,
    lease: Option<Lease>,
}

impl PreviewHandle {
    pub fn borrowed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ownership: Ownership::Borrowed,
            lease: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn is_owned(&self) -> bool {
        self.ownership == Ownership::Owned
    }

    /// Whether the URL still resolves. Borrowed handles are always live.
    pub fn is_live(&self) -> bool {
        match self.ownership {
            Ownership::Borrowed => true,
            Ownership::Owned => self.lease.is_some(),
        }
    }

    pub fn object_id(&self) -> Option<Uuid> {
        self.lease.as_ref().map(|lease| lease.id)
    }

    fn revoke(&mut self) -> bool {
        match self.lease.take() {
            Some(lease) => lease
                .registry
                .upgrade()
                .is_some_and(|registry| registry.revoke(&lease.id)),
            None => false,
        }
    }
}

impl std::fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("url", &self.url)
            .field("ownership", &self.ownership)
            .field("live", &self.is_live())
            .finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.revoke();
    }
}

/// Registry of object URLs for in-memory blobs.
///
/// URLs have the form `<origin>/objects/<uuid>` and are served by the
/// preview router for as long as their handle is live.
#[derive(Clone)]
pub struct ObjectUrlCache {
    registry: Arc<UrlRegistry>,
}

impl ObjectUrlCache {
    pub fn new(origin: impl Into<String>) -> Self {
        let origin: String = origin.into();
        Self {
            registry: Arc::new(UrlRegistry {
                origin: origin.trim_end_matches('/').to_string(),
                entries: DashMap::new(),
                acquired: AtomicU64::new(0),
                revoked: AtomicU64::new(0),
            }),
        }
    }

    /// Mints a new URL for `blob`. Every call yields a distinct URL.
    pub fn acquire(&self, blob: &LocalBlob) -> PreviewHandle {
        let id = Uuid::new_v4();
        self.registry.entries.insert(id, blob.clone());
        self.registry.acquired.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Minted object URL {} for {}", id, blob.name);

        PreviewHandle {
            url: format!("{}/objects/{}", self.registry.origin, id),
            ownership: Ownership::Owned,
            lease: Some(Lease {
                id,
                registry: Arc::downgrade(&self.registry),
            }),
        }
    }

    pub fn borrowed(&self, remote: &RemoteFile) -> PreviewHandle {
        PreviewHandle::borrowed(remote.url.clone())
    }

    /// Revokes an owned handle. Returns false for borrowed handles and for
    /// handles that were already released.
    pub fn release(&self, handle: &mut PreviewHandle) -> bool {
        if !handle.is_owned() {
            return false;
        }
        if handle.lease.is_none() {
            tracing::debug!("Ignoring repeated release of {}", handle.url);
            return false;
        }
        handle.revoke()
    }

    pub fn resolve(&self, id: &Uuid) -> Option<LocalBlob> {
        self.registry.entries.get(id).map(|entry| entry.value().clone())
    }

    pub fn resolve_url(&self, url: &str) -> Option<LocalBlob> {
        let prefix = format!("{}/objects/", self.registry.origin);
        let id = url.strip_prefix(&prefix)?.parse::<Uuid>().ok()?;
        self.resolve(&id)
    }

    pub fn stats(&self) -> UrlStats {
        UrlStats {
            acquired: self.registry.acquired.load(Ordering::Relaxed),
            revoked: self.registry.revoked.load(Ordering::Relaxed),
            live: self.registry.entries.len(),
        }
    }
}
