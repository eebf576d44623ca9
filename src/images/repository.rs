use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{Image, User};
use crate::db::new_id;
use crate::error::{AppError, AppResult};
use crate::images::domain::{Imageable, UploadedFile};
use crate::images::storage::StoredFile;

pub fn find(conn: &Connection, id: &str) -> AppResult<Image> {
    conn.query_row(
        &format!("SELECT {} FROM images WHERE id = ?1", Image::COLUMNS),
        params![id],
        Image::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// Images of one owner in display order.
pub fn list(conn: &Connection, owner: &Imageable) -> AppResult<Vec<Image>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM images WHERE imageable_kind = ?1 AND imageable_id = ?2
         ORDER BY sort_order ASC, created_at ASC, id ASC",
        Image::COLUMNS
    ))?;
    let images = stmt
        .query_map(params![owner.kind(), owner.id()], Image::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(images)
}

/// Restaurant images belong to the restaurant's owner, review images to the
/// review's author. Admins manage both.
pub fn authorize(conn: &Connection, user: &User, owner: &Imageable) -> AppResult<()> {
    if user.is_admin() {
        return Ok(());
    }
    let (sql, message) = match owner {
        Imageable::Restaurant(_) => (
            "SELECT owner_id FROM restaurants WHERE id = ?1",
            "Only the restaurant owner can manage its images",
        ),
        Imageable::Review(_) => (
            "SELECT user_id FROM reviews WHERE id = ?1",
            "Only the review author can manage its images",
        ),
    };
    let holder: Option<String> = conn
        .query_row(sql, params![owner.id()], |row| row.get(0))
        .optional()?
        .ok_or(AppError::NotFound)?;
    if holder.as_deref() == Some(user.id.as_str()) {
        Ok(())
    } else {
        Err(AppError::forbidden(message))
    }
}

/// Record a batch of stored files. `stored` pairs each file with its index in
/// the upload; the file uploaded at `primary_index` becomes the primary, or
/// the first stored one when that upload failed.
pub fn insert_batch(
    conn: &mut Connection,
    owner: &Imageable,
    stored: &[(usize, UploadedFile, StoredFile)],
    primary_index: usize,
) -> AppResult<Vec<Image>> {
    let Some(first) = stored.first() else {
        return Ok(Vec::new());
    };
    let primary = stored
        .iter()
        .find(|(index, _, _)| *index == primary_index)
        .unwrap_or(first)
        .0;

    let tx = crate::db::write_tx(conn)?;
    tx.execute(
        "UPDATE images SET is_primary = 0 WHERE imageable_kind = ?1 AND imageable_id = ?2",
        params![owner.kind(), owner.id()],
    )?;

    let mut ids = Vec::with_capacity(stored.len());
    for (index, upload, file) in stored {
        let id = new_id();
        tx.execute(
            "INSERT INTO images (id, imageable_kind, imageable_id, filename, original_name,
                 mime_type, size, path, url, is_primary, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                owner.kind(),
                owner.id(),
                file.filename,
                upload.original_name,
                upload.mime_type,
                file.size,
                file.path,
                file.url,
                *index == primary,
                *index as i64,
            ],
        )?;
        ids.push(id);
    }
    tx.commit()?;

    ids.iter().map(|id| find(conn, id)).collect()
}

/// Make one image the only primary of its owner.
pub fn set_primary(conn: &mut Connection, image_id: &str) -> AppResult<Image> {
    let tx = crate::db::write_tx(conn)?;
    let image = find(&tx, image_id)?;
    // Clear first: the one-primary index is checked row by row.
    tx.execute(
        "UPDATE images SET is_primary = 0 WHERE imageable_kind = ?1 AND imageable_id = ?2",
        params![image.owner.kind(), image.owner.id()],
    )?;
    tx.execute("UPDATE images SET is_primary = 1 WHERE id = ?1", params![image_id])?;
    tx.commit()?;
    find(conn, image_id)
}

/// Assign `sort_order` by position in `ids`. The list must name every image
/// of `owner` exactly once.
pub fn reorder(conn: &mut Connection, owner: &Imageable, ids: &[String]) -> AppResult<Vec<Image>> {
    let unique: HashSet<&str> = ids.iter().map(String::as_str).collect();
    if unique.len() != ids.len() {
        return Err(AppError::field("ids", "Each image may appear only once"));
    }

    let tx = crate::db::write_tx(conn)?;
    let total: i64 = tx.query_row(
        "SELECT COUNT(*) FROM images WHERE imageable_kind = ?1 AND imageable_id = ?2",
        params![owner.kind(), owner.id()],
        |row| row.get(0),
    )?;
    if total != ids.len() as i64 {
        return Err(AppError::field(
            "ids",
            format!("Expected all {} images of this {}", total, owner.kind()),
        ));
    }

    for (position, id) in ids.iter().enumerate() {
        let changed = tx.execute(
            "UPDATE images SET sort_order = ?1 WHERE id = ?2 AND imageable_kind = ?3 AND imageable_id = ?4",
            params![position as i64, id, owner.kind(), owner.id()],
        )?;
        if changed == 0 {
            return Err(AppError::field(
                "ids",
                format!("Image {} does not belong to this {}", id, owner.kind()),
            ));
        }
    }
    tx.commit()?;
    list(conn, owner)
}

/// Remove an image row. When it was the primary, the next image in display
/// order takes over. Returns the removed image so its file can be deleted.
pub fn delete(conn: &mut Connection, image_id: &str) -> AppResult<Image> {
    let tx = crate::db::write_tx(conn)?;
    let image = find(&tx, image_id)?;
    tx.execute("DELETE FROM images WHERE id = ?1", params![image_id])?;

    if image.is_primary {
        let next: Option<String> = tx
            .query_row(
                "SELECT id FROM images WHERE imageable_kind = ?1 AND imageable_id = ?2
                 ORDER BY sort_order ASC, created_at ASC, id ASC LIMIT 1",
                params![image.owner.kind(), image.owner.id()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(next) = next {
            tx.execute("UPDATE images SET is_primary = 1 WHERE id = ?1", params![next])?;
        }
    }
    tx.commit()?;

    tracing::info!(image_id, owner = %image.owner, "Deleted image");
    Ok(image)
}

/// Drop every image row of an owner, returning their stored paths.
pub fn delete_all_for(conn: &Connection, owner: &Imageable) -> AppResult<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT path FROM images WHERE imageable_kind = ?1 AND imageable_id = ?2")?;
    let paths = stmt
        .query_map(params![owner.kind(), owner.id()], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    conn.execute(
        "DELETE FROM images WHERE imageable_kind = ?1 AND imageable_id = ?2",
        params![owner.kind(), owner.id()],
    )?;
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;
    use crate::users::repository as users;

    fn batch(n: usize) -> Vec<(usize, UploadedFile, StoredFile)> {
        (0..n)
            .map(|i| {
                let upload = UploadedFile::new(
                    Some(format!("photo{}.jpg", i)),
                    Some("image/jpeg".into()),
                    vec![0; 4],
                );
                let filename = format!("{}.jpg", new_id());
                let stored = StoredFile {
                    path: format!("restaurants/{}", filename),
                    url: format!("/uploads/restaurants/{}", filename),
                    filename,
                    size: 4,
                };
                (i, upload, stored)
            })
            .collect()
    }

    fn primaries(images: &[Image]) -> Vec<&str> {
        images
            .iter()
            .filter(|i| i.is_primary)
            .map(|i| i.original_name.as_str())
            .collect()
    }

    #[test]
    fn batch_marks_requested_primary() {
        let pool = testing::pool();
        let mut conn = pool.get().unwrap();
        let owner = Imageable::Restaurant(testing::insert_restaurant(&conn, "Tasca"));

        let images = insert_batch(&mut conn, &owner, &batch(3), 1).unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(primaries(&images), vec!["photo1.jpg"]);
        assert_eq!(
            images.iter().map(|i| i.sort_order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn failed_primary_falls_back_to_first_stored() {
        let pool = testing::pool();
        let mut conn = pool.get().unwrap();
        let owner = Imageable::Restaurant(testing::insert_restaurant(&conn, "Tasca"));

        let mut files = batch(3);
        files.remove(0);
        insert_batch(&mut conn, &owner, &files, 0).unwrap();
        assert_eq!(primaries(&list(&conn, &owner).unwrap()), vec!["photo1.jpg"]);
    }

    #[test]
    fn new_batch_takes_primary_from_old_images() {
        let pool = testing::pool();
        let mut conn = pool.get().unwrap();
        let owner = Imageable::Restaurant(testing::insert_restaurant(&conn, "Tasca"));

        insert_batch(&mut conn, &owner, &batch(2), 0).unwrap();
        insert_batch(&mut conn, &owner, &batch(1), 0).unwrap();
        let all = list(&conn, &owner).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.iter().filter(|i| i.is_primary).count(), 1);
    }

    #[test]
    fn set_primary_leaves_exactly_one() {
        let pool = testing::pool();
        let mut conn = pool.get().unwrap();
        let owner = Imageable::Restaurant(testing::insert_restaurant(&conn, "Tasca"));
        let images = insert_batch(&mut conn, &owner, &batch(3), 0).unwrap();

        set_primary(&mut conn, &images[2].id).unwrap();
        let all = list(&conn, &owner).unwrap();
        let primary: Vec<_> = all.iter().filter(|i| i.is_primary).collect();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].id, images[2].id);
    }

    #[test]
    fn reorder_rejects_foreign_ids() {
        let pool = testing::pool();
        let mut conn = pool.get().unwrap();
        let a = Imageable::Restaurant(testing::insert_restaurant(&conn, "A"));
        let b = Imageable::Restaurant(testing::insert_restaurant(&conn, "B"));
        let mine = insert_batch(&mut conn, &a, &batch(2), 0).unwrap();
        let theirs = insert_batch(&mut conn, &b, &batch(1), 0).unwrap();

        let reordered = reorder(&mut conn, &a, &[mine[1].id.clone(), mine[0].id.clone()]).unwrap();
        assert_eq!(reordered[0].id, mine[1].id);

        let bad = reorder(&mut conn, &a, &[theirs[0].id.clone(), mine[0].id.clone()]);
        assert!(matches!(bad, Err(AppError::Validation(_))));
        assert_eq!(list(&conn, &a).unwrap()[0].id, mine[1].id);
    }

    #[test]
    fn reorder_needs_every_image_exactly_once() {
        let pool = testing::pool();
        let mut conn = pool.get().unwrap();
        let owner = Imageable::Restaurant(testing::insert_restaurant(&conn, "Tasca"));
        let images = insert_batch(&mut conn, &owner, &batch(3), 0).unwrap();
        let (a, b, c) = (images[0].id.clone(), images[1].id.clone(), images[2].id.clone());

        let repeated = reorder(&mut conn, &owner, &[a.clone(), a.clone(), b.clone()]);
        assert!(matches!(repeated, Err(AppError::Validation(_))));
        let partial = reorder(&mut conn, &owner, &[c.clone(), a.clone()]);
        assert!(matches!(partial, Err(AppError::Validation(_))));
        let orders: Vec<i64> = list(&conn, &owner).unwrap().iter().map(|i| i.sort_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);

        let reordered = reorder(&mut conn, &owner, &[c.clone(), a.clone(), b.clone()]).unwrap();
        let ids: Vec<&str> = reordered.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![c.as_str(), a.as_str(), b.as_str()]);
    }

    #[test]
    fn deleting_primary_promotes_next() {
        let pool = testing::pool();
        let mut conn = pool.get().unwrap();
        let owner = Imageable::Restaurant(testing::insert_restaurant(&conn, "Tasca"));
        let images = insert_batch(&mut conn, &owner, &batch(3), 0).unwrap();

        let removed = delete(&mut conn, &images[0].id).unwrap();
        assert!(removed.is_primary);
        let rest = list(&conn, &owner).unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest[0].is_primary);
        assert_eq!(rest[0].id, images[1].id);
    }

    #[test]
    fn authorize_checks_restaurant_owner_and_review_author() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let r = testing::insert_restaurant(&conn, "Tasca");
        let owner = users::find(&conn, &testing::insert_user(&conn, "Olga", "restaurant_owner")).unwrap();
        let other = users::find(&conn, &testing::insert_user(&conn, "Otto", "user")).unwrap();
        let admin = users::find(&conn, &testing::insert_user(&conn, "Ada", "admin")).unwrap();
        conn.execute("UPDATE restaurants SET owner_id = ?1 WHERE id = ?2", params![owner.id, r])
            .unwrap();

        let target = Imageable::Restaurant(r);
        assert!(authorize(&conn, &owner, &target).is_ok());
        assert!(authorize(&conn, &admin, &target).is_ok());
        assert!(matches!(authorize(&conn, &other, &target), Err(AppError::Forbidden(_))));
        assert!(matches!(
            authorize(&conn, &other, &Imageable::Review("missing".into())),
            Err(AppError::NotFound)
        ));
    }
}
