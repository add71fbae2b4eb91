//! File storage seam.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};

use arche_types::FileId;
use thiserror::Error;

pub type DriveFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, DriveError>> + Send + 'a>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriveError {
    #[error("file {id} not found")]
    NotFound { id: FileId },
    #[error("drive I/O failure: {message}")]
    Io { message: String },
}

/// Handle to a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub id: FileId,
    pub name: String,
    pub folder_id: String,
}

/// Storage holding geometry, realization and project files.
pub trait Drive: Send + Sync {
    fn read_as_text<'a>(&'a self, file_id: &'a FileId) -> DriveFut<'a, String>;

    fn create_file<'a>(
        &'a self,
        folder_id: &'a str,
        name: &'a str,
        content: String,
    ) -> DriveFut<'a, File>;

    fn update_content<'a>(&'a self, file_id: &'a FileId, content: String) -> DriveFut<'a, ()>;
}

#[derive(Debug, Clone)]
struct StoredFile {
    file: File,
    content: String,
}

/// Drive kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryDrive {
    files: RwLock<HashMap<FileId, StoredFile>>,
}

impl MemoryDrive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content` synchronously, returning the new file.
    pub fn insert(&self, folder_id: &str, name: &str, content: impl Into<String>) -> File {
        let file = File {
            id: FileId::new(format!("file-{}", uuid::Uuid::new_v4())),
            name: name.to_string(),
            folder_id: folder_id.to_string(),
        };
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                file.id.clone(),
                StoredFile {
                    file: file.clone(),
                    content: content.into(),
                },
            );
        file
    }

    #[must_use]
    pub fn content(&self, file_id: &FileId) -> Option<String> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_id)
            .map(|stored| stored.content.clone())
    }

    /// Files stored under `folder_id`, sorted by name.
    #[must_use]
    pub fn list(&self, folder_id: &str) -> Vec<File> {
        let mut files: Vec<File> = self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|stored| stored.file.folder_id == folder_id)
            .map(|stored| stored.file.clone())
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        files
    }
}

impl Drive for MemoryDrive {
    fn read_as_text<'a>(&'a self, file_id: &'a FileId) -> DriveFut<'a, String> {
        Box::pin(async move {
            self.content(file_id).ok_or_else(|| DriveError::NotFound {
                id: file_id.clone(),
            })
        })
    }

    fn create_file<'a>(
        &'a self,
        folder_id: &'a str,
        name: &'a str,
        content: String,
    ) -> DriveFut<'a, File> {
        Box::pin(async move { Ok(self.insert(folder_id, name, content)) })
    }

    fn update_content<'a>(&'a self, file_id: &'a FileId, content: String) -> DriveFut<'a, ()> {
        Box::pin(async move {
            let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
            let stored = files.get_mut(file_id).ok_or_else(|| DriveError::NotFound {
                id: file_id.clone(),
            })?;
            stored.content = content;
            Ok(())
        })
    }
}
