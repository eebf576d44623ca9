pub mod domain;
pub mod repository;
pub mod storage;

use serde::Serialize;

use crate::db::models::Image;
use crate::error::{AppError, AppResult, FieldErrors};
use crate::state::DbPool;

use self::domain::{Imageable, UploadLimits, UploadedFile};
use self::storage::FileStore;

/// Outcome of a batch upload: what was stored and why the rest was not.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub images: Vec<Image>,
    pub errors: Vec<String>,
}

/// Store a batch of files for `owner`. Bad files are reported per file while
/// the good ones are kept; only a batch where nothing could be stored fails.
pub async fn upload(
    db: &DbPool,
    store: &FileStore,
    limits: UploadLimits,
    owner: &Imageable,
    files: Vec<UploadedFile>,
    primary_index: usize,
) -> AppResult<UploadReport> {
    if files.is_empty() {
        return Err(AppError::field("images", "Choose at least one image"));
    }
    if files.len() > limits.max_files {
        return Err(AppError::field(
            "images",
            format!("Upload at most {} images at a time", limits.max_files),
        ));
    }

    let mut errors = Vec::new();
    let mut stored = Vec::with_capacity(files.len());
    for (index, file) in files.into_iter().enumerate() {
        if let Err(reason) = limits.check(&file) {
            errors.push(reason);
            continue;
        }
        match store.save(owner.directory(), &file).await {
            Ok(saved) => stored.push((index, file, saved)),
            Err(e) => {
                tracing::warn!(%owner, "Failed to store {}: {}", file.original_name, e);
                errors.push(format!("{} could not be saved", file.original_name));
            }
        }
    }

    if stored.is_empty() {
        let mut fields = FieldErrors::new();
        fields.insert("images".into(), errors);
        return Err(AppError::Validation(fields));
    }

    let inserted = {
        let mut conn = db.get()?;
        repository::insert_batch(&mut conn, owner, &stored, primary_index)
    };
    let images = match inserted {
        Ok(images) => images,
        Err(e) => {
            let paths: Vec<String> = stored.into_iter().map(|(_, _, s)| s.path).collect();
            store.remove_all(&paths).await;
            return Err(e);
        }
    };

    tracing::info!(%owner, stored = images.len(), rejected = errors.len(), "Uploaded images");
    Ok(UploadReport { images, errors })
}
