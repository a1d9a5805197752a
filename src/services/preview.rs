use crate::models::{LocalBlob, RemoteFile};
use crate::services::object_urls::{ObjectUrlCache, PreviewHandle};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Link,
    Image,
    Video,
}

impl PreviewKind {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(mime) = content_type.and_then(|ct| ct.parse::<mime::Mime>().ok()) else {
            return PreviewKind::Link;
        };
        if mime.type_() == mime::IMAGE {
            PreviewKind::Image
        } else if mime.type_() == mime::VIDEO {
            PreviewKind::Video
        } else {
            PreviewKind::Link
        }
    }
}

pub struct PreviewPayload {
    pub kind: PreviewKind,
    pub title: Option<String>,
    pub handle: PreviewHandle,
}

impl PreviewPayload {
    pub fn remote(remote: &RemoteFile, title: Option<String>) -> Self {
        Self {
            kind: PreviewKind::from_content_type(remote.content_type.as_deref()),
            title,
            handle: PreviewHandle::borrowed(remote.url.clone()),
        }
    }

    pub fn link(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            kind: PreviewKind::Link,
            title,
            handle: PreviewHandle::borrowed(url),
        }
    }
}

/// What the modal is currently showing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewSnapshot {
    pub kind: PreviewKind,
    pub url: String,
    pub title: Option<String>,
    pub owned: bool,
}

impl From<&PreviewPayload> for PreviewSnapshot {
    fn from(payload: &PreviewPayload) -> Self {
        Self {
            kind: payload.kind,
            url: payload.handle.url().to_string(),
            title: payload.title.clone(),
            owned: payload.handle.is_owned(),
        }
    }
}

struct PreviewInner {
    current: Mutex<Option<PreviewPayload>>,
    urls: ObjectUrlCache,
    state: watch::Sender<Option<PreviewSnapshot>>,
}

/// Holds the single payload shown in the preview modal and owns any object
/// URL minted for it.
#[derive(Clone)]
pub struct PreviewCoordinator {
    inner: Arc<PreviewInner>,
}

impl PreviewCoordinator {
    pub fn new(urls: ObjectUrlCache) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(PreviewInner {
                current: Mutex::new(None),
                urls,
                state,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PreviewPayload>> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Shows `payload`, releasing whatever owned URL was shown before.
    pub fn open(&self, payload: PreviewPayload) {
        let mut current = self.lock();
        let snapshot = PreviewSnapshot::from(&payload);
        if let Some(mut previous) = current.replace(payload) {
            self.inner.urls.release(&mut previous.handle);
        }
        self.inner.state.send_replace(Some(snapshot));
    }

    /// Mints an object URL for a staged blob and shows it.
    pub fn open_local(&self, blob: &LocalBlob, title: Option<String>) {
        let handle = self.inner.urls.acquire(blob);
        self.open(PreviewPayload {
            kind: PreviewKind::from_content_type(blob.content_type.as_deref()),
            title: title.or_else(|| Some(blob.name.clone())),
            handle,
        });
    }

    pub fn open_remote(&self, remote: &RemoteFile, title: Option<String>) {
        self.open(PreviewPayload::remote(remote, title));
    }

    pub fn close(&self) {
        let mut current = self.lock();
        if let Some(mut previous) = current.take() {
            self.inner.urls.release(&mut previous.handle);
        }
        self.inner.state.send_replace(None);
    }

    pub fn current(&self) -> Option<PreviewSnapshot> {
        self.inner.state.borrow().clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PreviewSnapshot>> {
        self.inner.state.subscribe()
    }
}
