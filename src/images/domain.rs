use std::fmt;

use serde::{Deserialize, Serialize};

use crate::db::models::UnknownVariant;

/// The entity an image is attached to. User avatars are not images; they
/// live in `users.avatar_path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Imageable {
    Restaurant(String),
    Review(String),
}

impl Imageable {
    pub fn kind(&self) -> &'static str {
        match self {
            Imageable::Restaurant(_) => "restaurant",
            Imageable::Review(_) => "review",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Imageable::Restaurant(id) | Imageable::Review(id) => id,
        }
    }

    pub fn from_parts(kind: &str, id: String) -> Result<Self, UnknownVariant> {
        match kind {
            "restaurant" => Ok(Imageable::Restaurant(id)),
            "review" => Ok(Imageable::Review(id)),
            other => Err(UnknownVariant {
                kind: "imageable kind",
                value: other.to_string(),
            }),
        }
    }

    /// Directory under the uploads root holding this owner kind's files.
    pub fn directory(&self) -> &'static str {
        match self {
            Imageable::Restaurant(_) => "restaurants",
            Imageable::Review(_) => "reviews",
        }
    }
}

impl fmt::Display for Imageable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/jpg",
    "image/gif",
    "image/webp",
];

/// A file received in a multipart upload, before it is stored.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Builds the record, taking the declared content type or guessing it from the name.
    pub fn new(original_name: Option<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        let original_name = original_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = content_type
            .filter(|c| !c.is_empty() && c != "application/octet-stream")
            .unwrap_or_else(|| {
                mime_guess::from_path(&original_name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            })
            .to_ascii_lowercase();
        Self {
            original_name,
            mime_type,
            bytes,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "jpg",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_bytes: usize,
}

impl UploadLimits {
    /// Why this file cannot be stored, if it cannot.
    pub fn check(&self, file: &UploadedFile) -> Result<(), String> {
        if file.bytes.is_empty() {
            return Err(format!("{} is empty", file.original_name));
        }
        if file.bytes.len() > self.max_file_bytes {
            return Err(format!(
                "{} is larger than {} KB",
                file.original_name,
                self.max_file_bytes / 1024
            ));
        }
        if !ALLOWED_MIME_TYPES.contains(&file.mime_type.as_str()) {
            return Err(format!(
                "{} must be a jpeg, png, jpg, gif or webp image",
                file.original_name
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> UploadLimits {
        UploadLimits {
            max_files: 10,
            max_file_bytes: 1024,
        }
    }

    #[test]
    fn imageable_serializes_as_tagged_union() {
        let owner = Imageable::Review("abc".into());
        let json = serde_json::to_value(&owner).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "review", "id": "abc" }));
        assert_eq!(
            Imageable::from_parts("restaurant", "r1".into()).unwrap(),
            Imageable::Restaurant("r1".into())
        );
        assert!(Imageable::from_parts("user", "u1".into()).is_err());
    }

    #[test]
    fn mime_type_is_guessed_when_missing() {
        let file = UploadedFile::new(Some("photo.PNG".into()), None, vec![1]);
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.extension(), "png");

        let named = UploadedFile::new(None, Some("image/webp".into()), vec![1]);
        assert_eq!(named.original_name, "upload");
        assert_eq!(named.extension(), "webp");
    }

    #[test]
    fn limits_reject_large_empty_and_foreign_files() {
        let ok = UploadedFile::new(Some("a.jpg".into()), Some("image/jpeg".into()), vec![0; 10]);
        assert!(limits().check(&ok).is_ok());

        let big = UploadedFile::new(Some("b.jpg".into()), Some("image/jpeg".into()), vec![0; 2048]);
        assert!(limits().check(&big).is_err());

        let empty = UploadedFile::new(Some("c.jpg".into()), Some("image/jpeg".into()), vec![]);
        assert!(limits().check(&empty).is_err());

        let pdf = UploadedFile::new(Some("d.pdf".into()), Some("application/pdf".into()), vec![1]);
        assert!(limits().check(&pdf).is_err());
    }
}
