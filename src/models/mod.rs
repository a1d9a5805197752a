use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A file picked by the user and held in memory until the form is submitted.
///
/// Cloning is cheap: the payload is reference counted. Every pick produces a
/// new `id`, which is what "blob identity" means for preview bookkeeping.
#[derive(Clone)]
pub struct LocalBlob {
    pub id: Uuid,
    pub name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl LocalBlob {
    /// Wraps raw bytes, sniffing the content type from the magic number.
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let content_type = infer::get(&data).map(|kind| kind.mime_type().to_string());
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            content_type,
            data,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for LocalBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBlob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("size", &self.size())
            .finish()
    }
}

impl PartialEq for LocalBlob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// A file already persisted in remote storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub url: String,
    /// Canonical storage key, used later for deletion or replacement.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl RemoteFile {
    pub fn new(url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            content_type: None,
            uploaded_at: None,
        }
    }
}

/// Result of one successful transport call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedObject {
    pub url: String,
    pub path: String,
    pub size: usize,
    pub content_type: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<UploadedObject> for RemoteFile {
    fn from(object: UploadedObject) -> Self {
        Self {
            url: object.url,
            path: object.path,
            content_type: object.content_type,
            uploaded_at: Some(object.uploaded_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileKind {
    Empty,
    Local,
    Remote,
}

/// Value of a file-valued form field before submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StagedFile {
    #[default]
    Empty,
    Local(LocalBlob),
    Remote(RemoteFile),
}

impl StagedFile {
    pub fn kind(&self) -> FileKind {
        match self {
            StagedFile::Empty => FileKind::Empty,
            StagedFile::Local(_) => FileKind::Local,
            StagedFile::Remote(_) => FileKind::Remote,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, StagedFile::Empty)
    }

    pub fn blob(&self) -> Option<&LocalBlob> {
        match self {
            StagedFile::Local(blob) => Some(blob),
            _ => None,
        }
    }

    pub fn remote(&self) -> Option<&RemoteFile> {
        match self {
            StagedFile::Remote(remote) => Some(remote),
            _ => None,
        }
    }
}

/// Events emitted by a single upload, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Fraction of bytes accepted by storage so far, in `[0, 1]`.
    Progress(f64),
    Completed(UploadedObject),
}
