use crate::api::error::MediaError;
use crate::models::{LocalBlob, RemoteFile, StagedFile};
use crate::services::object_urls::{ObjectUrlCache, PreviewHandle};
use crate::services::upload_transport::UploadTransport;

/// One file-valued form field.
///
/// Picking a file only stages it: the blob is uploaded when the form is
/// submitted. While the value is `Local` the field owns exactly one object
/// URL for it.
pub struct FileField {
    name: String,
    required: bool,
    value: StagedFile,
    /// Remote value displaced by a pick, deleted when the new file is saved.
    replaced: Option<RemoteFile>,
    preview: Option<PreviewHandle>,
    urls: ObjectUrlCache,
}

impl FileField {
    pub fn new(name: impl Into<String>, urls: ObjectUrlCache) -> Self {
        Self {
            name: name.into(),
            required: false,
            value: StagedFile::Empty,
            replaced: None,
            preview: None,
            urls,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &StagedFile {
        &self.value
    }

    pub fn replaced(&self) -> Option<&RemoteFile> {
        self.replaced.as_ref()
    }

    pub fn preview(&self) -> Option<&PreviewHandle> {
        self.preview.as_ref()
    }

    /// Value as persisted in the form document.
    pub fn persisted(&self) -> Option<&RemoteFile> {
        self.value.remote()
    }

    pub fn pick(&mut self, blob: LocalBlob) {
        if let StagedFile::Remote(remote) = std::mem::take(&mut self.value) {
            self.replaced = Some(remote);
        }
        let preview = self.urls.acquire(&blob);
        self.swap_preview(Some(preview));
        self.value = StagedFile::Local(blob);
    }

    /// Loads a previously saved value.
    pub fn hydrate(&mut self, remote: RemoteFile) {
        self.swap_preview(Some(self.urls.borrowed(&remote)));
        self.value = StagedFile::Remote(remote);
        self.replaced = None;
    }

    pub fn clear(&mut self) {
        if let StagedFile::Remote(remote) = std::mem::take(&mut self.value) {
            self.replaced = Some(remote);
        }
        self.swap_preview(None);
    }

    pub fn is_satisfied(&self) -> bool {
        !self.value.is_empty()
    }

    pub fn validate(&self) -> Result<(), MediaError> {
        if self.required && !self.is_satisfied() {
            return Err(MediaError::MissingFile {
                field: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Persists a staged blob. A displaced remote file is replaced; on
    /// failure the value stays `Local` so the user can retry.
    pub async fn submit(
        &mut self,
        transport: &UploadTransport,
        prefix: &str,
    ) -> Result<Option<RemoteFile>, MediaError> {
        self.validate()?;

        let blob = match &self.value {
            StagedFile::Empty => return Ok(None),
            StagedFile::Remote(remote) => return Ok(Some(remote.clone())),
            StagedFile::Local(blob) => blob.clone(),
        };

        // One delete attempt per displaced file, even if the upload fails.
        if let Some(old) = self.replaced.take() {
            transport.discard(&old.path).await;
        }
        let uploaded = transport.upload(blob, prefix).await?;

        let remote = RemoteFile::from(uploaded);
        self.hydrate(remote.clone());
        Ok(Some(remote))
    }

    /// Releases the preview when the consuming view goes away.
    pub fn detach(&mut self) {
        self.swap_preview(None);
    }

    pub fn into_value(mut self) -> StagedFile {
        self.detach();
        std::mem::take(&mut self.value)
    }

    fn swap_preview(&mut self, next: Option<PreviewHandle>) {
        if let Some(mut previous) = self.preview.take() {
            self.urls.release(&mut previous);
        }
        self.preview = next;
    }
}

/// A reorderable list of file fields, e.g. a gallery of partner logos.
pub struct FileListField {
    name: String,
    min_items: usize,
    items: Vec<FileField>,
    urls: ObjectUrlCache,
}

impl FileListField {
    pub fn new(name: impl Into<String>, urls: ObjectUrlCache) -> Self {
        Self {
            name: name.into(),
            min_items: 0,
            items: Vec::new(),
            urls,
        }
    }

    pub fn with_min_items(mut self, min_items: usize) -> Self {
        self.min_items = min_items;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[FileField] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&FileField> {
        self.items.get(index)
    }

    fn item_name(&self, index: usize) -> String {
        format!("{}[{}]", self.name, index)
    }

    fn check_index(&self, index: usize) -> Result<(), MediaError> {
        if index >= self.items.len() {
            return Err(MediaError::NotFound(format!(
                "{} has no item {} (len {})",
                self.name,
                index,
                self.items.len()
            )));
        }
        Ok(())
    }

    pub fn append_empty(&mut self) -> usize {
        let field = FileField::new(self.item_name(self.items.len()), self.urls.clone()).required();
        self.items.push(field);
        self.items.len() - 1
    }

    pub fn append(&mut self, blob: LocalBlob) -> usize {
        let index = self.append_empty();
        self.items[index].pick(blob);
        index
    }

    pub fn append_remote(&mut self, remote: RemoteFile) -> usize {
        let index = self.append_empty();
        self.items[index].hydrate(remote);
        index
    }

    pub fn hydrate(&mut self, remotes: impl IntoIterator<Item = RemoteFile>) {
        self.items.clear();
        for remote in remotes {
            self.append_remote(remote);
        }
    }

    pub fn pick(&mut self, index: usize, blob: LocalBlob) -> Result<(), MediaError> {
        self.check_index(index)?;
        self.items[index].pick(blob);
        Ok(())
    }

    /// Drops the item and its preview. Nothing is uploaded or deleted.
    pub fn remove(&mut self, index: usize) -> Result<StagedFile, MediaError> {
        self.check_index(index)?;
        let field = self.items.remove(index);
        self.rename_items();
        Ok(field.into_value())
    }

    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), MediaError> {
        self.check_index(from)?;
        self.check_index(to)?;
        let field = self.items.remove(from);
        self.items.insert(to, field);
        self.rename_items();
        Ok(())
    }

    fn rename_items(&mut self) {
        for index in 0..self.items.len() {
            let name = self.item_name(index);
            self.items[index].name = name;
        }
    }

    /// Checks every item and the item count. A single problem is returned
    /// as is; several come back together as `MediaError::Validation`.
    pub fn validate(&self) -> Result<(), MediaError> {
        let mut problems: Vec<MediaError> = self
            .items
            .iter()
            .filter_map(|item| item.validate().err())
            .collect();
        if self.items.len() < self.min_items {
            problems.push(MediaError::TooFewFiles {
                field: self.name.clone(),
                min: self.min_items,
                actual: self.items.len(),
            });
        }

        match problems.len() {
            0 => Ok(()),
            1 => Err(problems.remove(0)),
            _ => Err(MediaError::Validation(problems)),
        }
    }

    /// Persisted values in list order; only `Remote` items appear.
    pub fn payload(&self) -> Vec<RemoteFile> {
        self.items
            .iter()
            .filter_map(|item| item.persisted().cloned())
            .collect()
    }

    /// Uploads every staged item in list order. Successful items become
    /// `Remote` even when others fail; failures are reported by index.
    pub async fn submit(
        &mut self,
        transport: &UploadTransport,
        prefix: &str,
    ) -> Result<Vec<RemoteFile>, MediaError> {
        self.validate()?;

        let pending: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.value.blob().is_some())
            .map(|(index, _)| index)
            .collect();

        if !pending.is_empty() {
            for &index in &pending {
                if let Some(old) = self.items[index].replaced.take() {
                    transport.discard(&old.path).await;
                }
            }

            let blobs = pending
                .iter()
                .filter_map(|&index| self.items[index].value.blob().cloned())
                .collect();
            let outcome = transport.upload_many(blobs, prefix).await;

            let mut failed = Vec::new();
            for (&index, result) in pending.iter().zip(outcome.into_results()) {
                match result {
                    Ok(object) => self.items[index].hydrate(object.into()),
                    Err(_) => failed.push(index),
                }
            }

            if !failed.is_empty() {
                return Err(MediaError::PartialUpload {
                    field: self.name.clone(),
                    failed,
                });
            }
        }

        Ok(self.payload())
    }
}
