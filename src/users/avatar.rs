use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::images::domain::{UploadLimits, UploadedFile};
use crate::images::storage::FileStore;
use crate::state::DbPool;
use crate::users::repository as users;

pub const AVATAR_DIR: &str = "avatars";

/// Replace the user's avatar with the first uploaded file. The previous file
/// is removed once the new path is saved; extra files are ignored.
pub async fn replace(
    db: &DbPool,
    store: &FileStore,
    limits: UploadLimits,
    user_id: &str,
    files: Vec<UploadedFile>,
) -> AppResult<User> {
    let mut files = files.into_iter();
    let file = files
        .next()
        .ok_or_else(|| AppError::field("avatar", "Choose an image to upload"))?;
    let ignored = files.count();
    if ignored > 0 {
        tracing::debug!(user_id, ignored, "Ignoring extra avatar files");
    }

    limits
        .check(&file)
        .map_err(|reason| AppError::field("avatar", reason))?;
    let stored = store.save(AVATAR_DIR, &file).await?;

    let saved = {
        let conn = db.get()?;
        users::set_avatar(&conn, user_id, &stored.path)
            .and_then(|previous| Ok((previous, users::find(&conn, user_id)?)))
    };
    match saved {
        Ok((previous, user)) => {
            if let Some(previous) = previous {
                store.remove(&previous).await;
            }
            tracing::info!(user_id, path = %stored.path, "Updated avatar");
            Ok(user)
        }
        Err(e) => {
            store.remove(&stored.path).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, testing};

    fn png(name: &str) -> UploadedFile {
        UploadedFile::new(Some(name.into()), Some("image/png".into()), vec![0x89, b'P', b'N', b'G'])
    }

    fn limits() -> UploadLimits {
        UploadLimits {
            max_files: 10,
            max_file_bytes: 1024,
        }
    }

    #[tokio::test]
    async fn replacing_removes_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&dir.path().join("test.db")).unwrap();
        run_migrations(&pool).unwrap();
        let store = FileStore::new(dir.path().join("uploads"));
        let user_id = testing::insert_user(&pool.get().unwrap(), "Ana", "user");

        let first = replace(&pool, &store, limits(), &user_id, vec![png("a.png")])
            .await
            .unwrap();
        let first_path = first.avatar_path.clone().unwrap();
        assert!(first_path.starts_with("avatars/"));
        assert!(store.root().join(&first_path).exists());

        let second = replace(
            &pool,
            &store,
            limits(),
            &user_id,
            vec![png("b.png"), png("ignored.png")],
        )
        .await
        .unwrap();
        let second_path = second.avatar_path.unwrap();
        assert_ne!(first_path, second_path);
        assert!(!store.root().join(&first_path).exists());
        assert!(store.root().join(&second_path).exists());
    }

    #[tokio::test]
    async fn rejects_non_images_and_empty_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&dir.path().join("test.db")).unwrap();
        run_migrations(&pool).unwrap();
        let store = FileStore::new(dir.path().join("uploads"));
        let user_id = testing::insert_user(&pool.get().unwrap(), "Ana", "user");

        let err = replace(&pool, &store, limits(), &user_id, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref f) if f.contains_key("avatar")));

        let text = UploadedFile::new(Some("notes.txt".into()), Some("text/plain".into()), b"hi".to_vec());
        let err = replace(&pool, &store, limits(), &user_id, vec![text])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(users::find(&pool.get().unwrap(), &user_id)
            .unwrap()
            .avatar_path
            .is_none());
    }
}
