//! Identity index: face identities and scene folders ("persons").
//!
//! Every group carries a stable `folder_key` naming its storage location.
//! Renaming only ever touches the display name; the folder key is fixed at
//! creation because it is also the public locator path component.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::{bytes_to_embedding, embedding_to_bytes, Database};

/// A group of photos: a face identity, a scene folder, or a manual folder.
#[derive(Debug, Clone)]
pub struct Person {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub folder_key: String,
    /// Canonical face embedding. `None` for scene and manual folders.
    pub embedding: Option<Vec<f32>>,
    pub created_at: String,
}

fn row_to_person(row: &Row) -> rusqlite::Result<Person> {
    let embedding_bytes: Option<Vec<u8>> = row.get(4)?;
    Ok(Person {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        folder_key: row.get(3)?,
        embedding: embedding_bytes.map(|b| bytes_to_embedding(&b)),
        created_at: row.get(5)?,
    })
}

const PERSON_COLUMNS: &str = "id, owner, name, folder_key, embedding, created_at";

/// "beach_sunset" -> "Beach Sunset"
fn display_name_from_slug(slug: &str) -> String {
    slug.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

impl Database {
    fn insert_person(
        &self,
        owner: &str,
        name: &str,
        folder_key: &str,
        embedding: Option<&[f32]>,
    ) -> Result<Person> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();
        let embedding_bytes = embedding.map(embedding_to_bytes);
        let embedding_dim = embedding.map(|e| e.len() as i64);

        self.conn.execute(
            r#"
            INSERT INTO persons (id, owner, name, folder_key, embedding, embedding_dim, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![id, owner, name, folder_key, embedding_bytes, embedding_dim, created_at],
        )?;

        Ok(Person {
            id,
            owner: owner.to_string(),
            name: name.to_string(),
            folder_key: folder_key.to_string(),
            embedding: embedding.map(|e| e.to_vec()),
            created_at,
        })
    }

    /// Get a person by id, scoped to the owner
    pub fn find_person(&self, owner: &str, person_id: &str) -> Result<Option<Person>> {
        let result = self.conn.query_row(
            &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = ? AND owner = ?"),
            params![person_id, owner],
            row_to_person,
        );

        match result {
            Ok(person) => Ok(Some(person)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_person_by_slug(&self, owner: &str, slug: &str) -> Result<Option<Person>> {
        let result = self.conn.query_row(
            &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE owner = ? AND folder_key = ?"),
            params![owner, slug],
            row_to_person,
        );

        match result {
            Ok(person) => Ok(Some(person)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Find an existing group by folder key, or create a scene/manual group
    /// with a display name derived from the slug. Idempotent.
    pub fn find_or_create_by_slug(&self, owner: &str, slug: &str) -> Result<Person> {
        if let Some(person) = self.find_person_by_slug(owner, slug)? {
            return Ok(person);
        }
        self.insert_person(owner, &display_name_from_slug(slug), slug, None)
    }

    /// Pure similarity lookup: the existing group whose stored embedding has
    /// the highest cosine similarity to `embedding`, if that maximum clears
    /// the threshold. Groups without an embedding are never matched.
    pub fn resolve_by_embedding(
        &self,
        owner: &str,
        embedding: &[f32],
        threshold: f32,
    ) -> Result<Option<Person>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PERSON_COLUMNS} FROM persons \
             WHERE owner = ? AND embedding IS NOT NULL ORDER BY created_at, id"
        ))?;

        let candidates: Vec<Person> = stmt
            .query_map([owner], row_to_person)?
            .filter_map(|r| r.ok())
            .collect();

        let mut best: Option<Person> = None;
        let mut best_score = -1.0f32;

        for person in candidates {
            let score = match person.embedding.as_deref() {
                Some(stored) => cosine_similarity(embedding, stored),
                None => continue,
            };
            // Strictly greater keeps the earliest-created group on ties
            if score > best_score {
                best_score = score;
                best = Some(person);
            }
        }

        if best_score >= threshold {
            Ok(best)
        } else {
            Ok(None)
        }
    }

    /// Create a new face group for an embedding that matched nothing.
    pub fn create_with_embedding(&self, owner: &str, embedding: &[f32]) -> Result<Person> {
        let id = Uuid::new_v4().to_string();
        let folder_key = format!("person_{}", &id.as_str()[..8]);
        let created_at = Utc::now().to_rfc3339();
        let embedding_bytes = embedding_to_bytes(embedding);

        self.conn.execute(
            r#"
            INSERT INTO persons (id, owner, name, folder_key, embedding, embedding_dim, created_at)
            VALUES (?, ?, 'Unknown', ?, ?, ?, ?)
            "#,
            params![id, owner, folder_key, embedding_bytes, embedding.len() as i64, created_at],
        )?;

        Ok(Person {
            id,
            owner: owner.to_string(),
            name: "Unknown".to_string(),
            folder_key,
            embedding: Some(embedding.to_vec()),
            created_at,
        })
    }

    /// Create an empty manual folder. The folder key is slugified from the
    /// display name, with a random suffix on collision.
    pub fn create_folder(&self, owner: &str, display_name: &str) -> Result<Person> {
        let mut slug = crate::pipeline::slugify(display_name);
        if self.find_person_by_slug(owner, &slug)?.is_some() {
            let suffix = Uuid::new_v4().simple().to_string();
            slug = format!("{}_{}", slug, &suffix[..4]);
        }
        self.insert_person(owner, display_name, &slug, None)
    }

    /// Update the display name. Returns false if the group does not exist or
    /// does not belong to the owner. The folder key never changes.
    pub fn rename_person(&self, person_id: &str, owner: &str, new_name: &str) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE persons SET name = ? WHERE id = ? AND owner = ?",
            params![new_name, person_id, owner],
        )?;
        Ok(updated > 0)
    }

    /// Delete a group and everything hanging off it: membership links, any
    /// photo rows left without links, then the group row itself. Returns the
    /// folder key so the caller can remove the storage location, or `None`
    /// when the group is missing or not owned.
    pub fn delete_person_cascade(&self, person_id: &str, owner: &str) -> Result<Option<String>> {
        let person = match self.find_person(owner, person_id)? {
            Some(p) => p,
            None => return Ok(None),
        };

        let photo_ids: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT photo_id FROM photo_persons WHERE person_id = ?")?;
            let ids = stmt
                .query_map([person_id], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect();
            ids
        };

        // Links first, then orphaned photos, then the person row
        self.conn.execute(
            "DELETE FROM photo_persons WHERE person_id = ?",
            params![person_id],
        )?;

        for photo_id in &photo_ids {
            self.delete_photo_if_orphaned(photo_id)?;
        }

        self.conn.execute(
            "DELETE FROM persons WHERE id = ?",
            params![person_id],
        )?;

        tracing::info!(
            "Deleted group {} ({} linked photo record(s))",
            person.folder_key,
            photo_ids.len()
        );
        Ok(Some(person.folder_key))
    }

    /// All groups for an owner, oldest first
    pub fn all_persons(&self, owner: &str) -> Result<Vec<Person>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PERSON_COLUMNS} FROM persons WHERE owner = ? ORDER BY created_at, id"
        ))?;

        let persons = stmt
            .query_map([owner], row_to_person)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(persons)
    }

    /// Case-insensitive substring match on display name, used by the
    /// conversational resolver. Empty input never matches.
    pub fn find_person_by_name(&self, owner: &str, name: &str) -> Result<Option<Person>> {
        if name.trim().is_empty() {
            return Ok(None);
        }

        let pattern = format!("%{}%", name.trim().to_lowercase());
        let result = self.conn.query_row(
            &format!(
                "SELECT {PERSON_COLUMNS} FROM persons \
                 WHERE owner = ? AND LOWER(name) LIKE ? ORDER BY created_at, id LIMIT 1"
            ),
            params![owner, pattern],
            row_to_person,
        );

        match result {
            Ok(person) => Ok(Some(person)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count_persons(&self, owner: &str) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM persons WHERE owner = ?",
            [owner],
            |row| row.get(0),
        )?;
        Ok(count)
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
    fn test_cosine_similarity_known_angles() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.0001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) - (-1.0)).abs() < 0.0001);

        // Mismatched dimensions and zero norms are defined as 0.0
        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_display_name_from_slug() {
        assert_eq!(display_name_from_slug("beach_sunset"), "Beach Sunset");
        assert_eq!(display_name_from_slug("dog"), "Dog");
        assert_eq!(display_name_from_slug("a__b"), "A B");
    }

    #[test]
    fn test_find_or_create_by_slug_is_idempotent() {
        let db = test_db();
        let first = db.find_or_create_by_slug("u1", "beach_sunset").unwrap();
        let second = db.find_or_create_by_slug("u1", "beach_sunset").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "Beach Sunset");
        assert!(first.embedding.is_none());
        assert_eq!(db.count_persons("u1").unwrap(), 1);
    }

    #[test]
    fn test_slug_lookup_is_owner_scoped() {
        let db = test_db();
        let a = db.find_or_create_by_slug("u1", "beach").unwrap();
        let b = db.find_or_create_by_slug("u2", "beach").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_resolve_by_embedding_threshold() {
        let db = test_db();
        let identical = db.create_with_embedding("u1", &[1.0, 0.0, 0.0]).unwrap();
        db.find_or_create_by_slug("u1", "beach").unwrap(); // no embedding, never matched

        // Identical vector: similarity 1.0, matches
        let hit = db
            .resolve_by_embedding("u1", &[1.0, 0.0, 0.0], 0.60)
            .unwrap();
        assert_eq!(hit.unwrap().id, identical.id);

        // Orthogonal vector: similarity 0.0, no match at any reasonable threshold
        let miss = db
            .resolve_by_embedding("u1", &[0.0, 1.0, 0.0], 0.60)
            .unwrap();
        assert!(miss.is_none());

        // Other owner sees nothing
        let cross = db
            .resolve_by_embedding("u2", &[1.0, 0.0, 0.0], 0.60)
            .unwrap();
        assert!(cross.is_none());
    }

    #[test]
    fn test_resolve_picks_maximum_similarity() {
        let db = test_db();
        db.create_with_embedding("u1", &[1.0, 0.0]).unwrap();
        let closer = db.create_with_embedding("u1", &[0.8, 0.6]).unwrap();

        let hit = db
            .resolve_by_embedding("u1", &[0.8, 0.6], 0.60)
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, closer.id);
    }

    #[test]
    fn test_rename_requires_ownership() {
        let db = test_db();
        let person = db.find_or_create_by_slug("u1", "beach").unwrap();

        assert!(db.rename_person(&person.id, "u1", "Holidays").unwrap());
        assert!(!db.rename_person(&person.id, "intruder", "Mine").unwrap());

        let renamed = db.find_person("u1", &person.id).unwrap().unwrap();
        assert_eq!(renamed.name, "Holidays");
        assert_eq!(renamed.folder_key, "beach");
    }

    #[test]
    fn test_create_folder_slug_collision_gets_suffix() {
        let db = test_db();
        let a = db.create_folder("u1", "Summer Trip").unwrap();
        let b = db.create_folder("u1", "Summer Trip").unwrap();
        assert_eq!(a.folder_key, "summer_trip");
        assert!(b.folder_key.starts_with("summer_trip_"));
        assert_ne!(a.folder_key, b.folder_key);
    }

    #[test]
    fn test_delete_cascade_removes_orphans_keeps_shared() {
        let db = test_db();
        let doomed = db.create_with_embedding("u1", &[1.0, 0.0]).unwrap();
        let survivor = db.create_with_embedding("u1", &[0.0, 1.0]).unwrap();

        let only_doomed_a = db.insert_photo("u1", "a.jpg").unwrap();
        let only_doomed_b = db.insert_photo("u1", "b.jpg").unwrap();
        let shared = db.insert_photo("u1", "c.jpg").unwrap();

        db.link_photo(&only_doomed_a.id, &doomed.id).unwrap();
        db.link_photo(&only_doomed_b.id, &doomed.id).unwrap();
        db.link_photo(&shared.id, &doomed.id).unwrap();
        db.link_photo(&shared.id, &survivor.id).unwrap();

        let folder_key = db.delete_person_cascade(&doomed.id, "u1").unwrap();
        assert_eq!(folder_key.unwrap(), doomed.folder_key);

        // Sole-group photos are gone, the shared one survives with one link
        assert!(db.find_photo("u1", &only_doomed_a.id).unwrap().is_none());
        assert!(db.find_photo("u1", &only_doomed_b.id).unwrap().is_none());
        assert!(db.find_photo("u1", &shared.id).unwrap().is_some());
        assert_eq!(db.link_count(&shared.id).unwrap(), 1);
        assert!(db.find_person("u1", &doomed.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_cascade_wrong_owner_is_noop() {
        let db = test_db();
        let person = db.create_with_embedding("u1", &[1.0]).unwrap();
        assert!(db.delete_person_cascade(&person.id, "u2").unwrap().is_none());
        assert!(db.find_person("u1", &person.id).unwrap().is_some());
    }

    #[test]
    fn test_find_person_by_name_substring_ci() {
        let db = test_db();
        let person = db.create_folder("u1", "Aunt Maria").unwrap();
        assert_eq!(
            db.find_person_by_name("u1", "maria").unwrap().unwrap().id,
            person.id
        );
        assert!(db.find_person_by_name("u1", "").unwrap().is_none());
        assert!(db.find_person_by_name("u1", "nobody").unwrap().is_none());
        assert!(db.find_person_by_name("u2", "maria").unwrap().is_none());
    }
}
