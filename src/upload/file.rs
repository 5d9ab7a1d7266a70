use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

/// A photo picked by the visitor, held in memory until its slot is cleared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoFile {
    name: String,
    content_type: String,
    data: Arc<Vec<u8>>,
}

impl PhotoFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        let content_type = content_type_for(&name).to_string();
        Self {
            name,
            content_type,
            data: Arc::new(data),
        }
    }

    /// Read a photo from disk
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read photo {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lowercased extension without the dot
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
    }
}

fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_and_content_type() {
        let file = PhotoFile::new("Holiday.JPG", vec![1, 2, 3]);
        assert_eq!(file.extension().as_deref(), Some("jpg"));
        assert_eq!(file.content_type(), "image/jpeg");
        assert_eq!(file.len(), 3);

        let file = PhotoFile::new("noext", vec![]);
        assert_eq!(file.extension(), None);
        assert_eq!(file.content_type(), "application/octet-stream");
        assert!(file.is_empty());
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        let file = PhotoFile::from_path(&path).await.unwrap();
        assert_eq!(file.name(), "photo.png");
        assert_eq!(file.data(), b"png-bytes");
        assert_eq!(file.content_type(), "image/png");
    }
}
