//! Photo index rows and the photo/person membership links.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::Database;

/// One row per uploaded image. A photo must carry at least one membership
/// link; a photo whose last link is removed is deleted rather than orphaned.
#[derive(Debug, Clone)]
pub struct Photo {
    pub id: String,
    pub owner: String,
    pub filename: String,
    pub created_at: String,
}

fn row_to_photo(row: &Row) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get(0)?,
        owner: row.get(1)?,
        filename: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl Database {
    /// Record an upload. Happens before classification so every upload is
    /// durably recorded even when later steps fail.
    pub fn insert_photo(&self, owner: &str, filename: &str) -> Result<Photo> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO photos (id, owner, filename, created_at) VALUES (?, ?, ?, ?)",
            params![id, owner, filename, created_at],
        )?;

        Ok(Photo {
            id,
            owner: owner.to_string(),
            filename: filename.to_string(),
            created_at,
        })
    }

    pub fn find_photo(&self, owner: &str, photo_id: &str) -> Result<Option<Photo>> {
        let result = self.conn.query_row(
            "SELECT id, owner, filename, created_at FROM photos WHERE id = ? AND owner = ?",
            params![photo_id, owner],
            row_to_photo,
        );

        match result {
            Ok(photo) => Ok(Some(photo)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All photo rows for an owner with this stored filename. Filenames are
    /// only unique within a group's storage location, so this can return
    /// several rows.
    pub fn photos_by_filename(&self, owner: &str, filename: &str) -> Result<Vec<Photo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner, filename, created_at FROM photos \
             WHERE owner = ? AND filename = ? ORDER BY created_at, id",
        )?;

        let photos = stmt
            .query_map(params![owner, filename], row_to_photo)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(photos)
    }

    /// Create the membership link if it does not already exist.
    pub fn link_photo(&self, photo_id: &str, person_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO photo_persons (photo_id, person_id) VALUES (?, ?)",
            params![photo_id, person_id],
        )?;
        Ok(())
    }

    pub fn unlink_photo(&self, photo_id: &str, person_id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM photo_persons WHERE photo_id = ? AND person_id = ?",
            params![photo_id, person_id],
        )?;
        Ok(())
    }

    pub fn link_exists(&self, photo_id: &str, person_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM photo_persons WHERE photo_id = ? AND person_id = ?",
            params![photo_id, person_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn link_count(&self, photo_id: &str) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM photo_persons WHERE photo_id = ?",
            [photo_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete the photo row when no membership links remain. Returns true
    /// when the row was removed.
    pub fn delete_photo_if_orphaned(&self, photo_id: &str) -> Result<bool> {
        if self.link_count(photo_id)? > 0 {
            return Ok(false);
        }
        self.conn
            .execute("DELETE FROM photos WHERE id = ?", params![photo_id])?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_link_is_idempotent() {
        let db = test_db();
        let person = db.find_or_create_by_slug("u1", "beach").unwrap();
        let photo = db.insert_photo("u1", "a.jpg").unwrap();

        db.link_photo(&photo.id, &person.id).unwrap();
        db.link_photo(&photo.id, &person.id).unwrap();

        assert_eq!(db.link_count(&photo.id).unwrap(), 1);
        assert!(db.link_exists(&photo.id, &person.id).unwrap());
    }

    #[test]
    fn test_orphan_deletion_only_when_unlinked() {
        let db = test_db();
        let person = db.find_or_create_by_slug("u1", "beach").unwrap();
        let photo = db.insert_photo("u1", "a.jpg").unwrap();
        db.link_photo(&photo.id, &person.id).unwrap();

        assert!(!db.delete_photo_if_orphaned(&photo.id).unwrap());
        db.unlink_photo(&photo.id, &person.id).unwrap();
        assert!(db.delete_photo_if_orphaned(&photo.id).unwrap());
        assert!(db.find_photo("u1", &photo.id).unwrap().is_none());
    }

    #[test]
    fn test_photos_by_filename_scoped_to_owner() {
        let db = test_db();
        db.insert_photo("u1", "a.jpg").unwrap();
        db.insert_photo("u1", "a.jpg").unwrap();
        db.insert_photo("u2", "a.jpg").unwrap();

        assert_eq!(db.photos_by_filename("u1", "a.jpg").unwrap().len(), 2);
        assert_eq!(db.photos_by_filename("u2", "a.jpg").unwrap().len(), 1);
        assert!(db.photos_by_filename("u1", "b.jpg").unwrap().is_empty());
    }
}
