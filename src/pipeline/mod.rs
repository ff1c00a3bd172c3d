//! Upload classification pipeline.
//!
//! One uploaded image at a time: record the photo row, ask the face embedder
//! for vectors, resolve each vector to an existing or new group by cosine
//! similarity, fall back to a vision scene label when no face was found,
//! then materialize every resolved group as a deduplicated file copy plus a
//! membership link. Capability failures degrade to the empty/fallback result
//! so a single bad image never aborts a multi-file batch.

use anyhow::Result;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{Database, Person};
use crate::embedder::FaceEmbedder;
use crate::labeler::SceneLabeler;
use crate::store::ImageStore;

/// Slug used when the scene labeler yields nothing usable
pub const FALLBACK_LABEL: &str = "uncategorised";

/// Slug used when a manual folder name normalizes to nothing
const FALLBACK_FOLDER: &str = "folder";

/// Maximum slug length in characters
const MAX_SLUG_LEN: usize = 40;

/// Which capability produced the grouping for an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Face,
    Scene,
}

/// A group the image was attached to
#[derive(Debug, Clone)]
pub struct GroupRef {
    pub id: String,
    pub name: String,
    pub folder_key: String,
}

impl From<&Person> for GroupRef {
    fn from(person: &Person) -> Self {
        Self {
            id: person.id.clone(),
            name: person.name.clone(),
            folder_key: person.folder_key.clone(),
        }
    }
}

/// Result of classifying one uploaded image
#[derive(Debug, Clone)]
pub struct ClassifyOutcome {
    pub photo_id: String,
    pub filename: String,
    /// Raw number of faces the embedder reported, for UI messaging only
    pub face_count: usize,
    pub method: Method,
    /// Distinct groups the image was attached to
    pub groups: Vec<GroupRef>,
}

/// Per-file failure classes, so batch reports can tell a full disk from a
/// broken index without parsing message strings.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("index failure: {0}")]
    Index(#[source] anyhow::Error),
}

/// Aggregate report for a multi-file upload batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<ClassifyOutcome>,
    /// (filename, reason) for files not attempted
    pub skipped: Vec<(String, String)>,
    /// (filename, error) for files that failed mid-pipeline
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn faces_detected(&self) -> usize {
        self.succeeded.iter().map(|o| o.face_count).sum()
    }
}

pub struct Classifier<'a> {
    db: &'a Database,
    store: &'a ImageStore,
    embedder: &'a dyn FaceEmbedder,
    labeler: &'a dyn SceneLabeler,
    similarity_threshold: f32,
}

impl<'a> Classifier<'a> {
    pub fn new(
        db: &'a Database,
        store: &'a ImageStore,
        embedder: &'a dyn FaceEmbedder,
        labeler: &'a dyn SceneLabeler,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            db,
            store,
            embedder,
            labeler,
            similarity_threshold,
        }
    }

    /// Classify one uploaded image and attach it to every resolved group.
    pub fn classify_and_store(
        &self,
        owner: &str,
        image: &[u8],
        filename: &str,
    ) -> Result<ClassifyOutcome, PipelineError> {
        // The photo row is written before anything can fail downstream, so
        // every upload is durably recorded exactly once.
        let photo = self
            .db
            .insert_photo(owner, filename)
            .map_err(PipelineError::Index)?;

        let faces = match self.embedder.embed(image) {
            Ok(faces) => faces,
            Err(e) => {
                // No face is the fallback trigger, not a hard failure
                warn!("Face embedder failed for {}: {}", filename, e);
                Vec::new()
            }
        };

        let face_count = faces.len();
        let mut groups: Vec<GroupRef> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let method;

        if !faces.is_empty() {
            method = Method::Face;
            for face in &faces {
                if face.vector.is_empty() {
                    continue;
                }
                let person = self
                    .resolve_face_group(owner, &face.vector)
                    .map_err(PipelineError::Index)?;

                // Two faces in one image can resolve to the same group;
                // attach once per distinct group
                if !seen.insert(person.id.clone()) {
                    continue;
                }
                self.attach(owner, &photo.id, &person, filename, image)?;
                groups.push(GroupRef::from(&person));
            }
        } else {
            method = Method::Scene;
            let slug = match self.labeler.label(image) {
                Ok(raw) => normalize_label(&raw),
                Err(e) => {
                    warn!("Scene labeler failed for {}: {}", filename, e);
                    FALLBACK_LABEL.to_string()
                }
            };

            let person = self
                .db
                .find_or_create_by_slug(owner, &slug)
                .map_err(PipelineError::Index)?;
            self.attach(owner, &photo.id, &person, filename, image)?;
            seen.insert(person.id.clone());
            groups.push(GroupRef::from(&person));
        }

        info!(
            "Classified {} for {}: {} face(s), {} group(s)",
            filename,
            owner,
            face_count,
            groups.len()
        );

        Ok(ClassifyOutcome {
            photo_id: photo.id,
            filename: filename.to_string(),
            face_count,
            method,
            groups,
        })
    }

    /// Classify a staged batch sequentially. One file failing never aborts
    /// the rest; the report carries per-file outcomes.
    pub fn process_batch(&self, owner: &str, files: &[PathBuf]) -> BatchReport {
        let mut report = BatchReport::default();

        for path in files {
            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => {
                    report
                        .skipped
                        .push((path.display().to_string(), "Unusable filename".to_string()));
                    continue;
                }
            };

            if !self.store.is_allowed(&filename) {
                report
                    .skipped
                    .push((filename, "Unsupported file type".to_string()));
                continue;
            }

            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    report.failed.push((filename, e.to_string()));
                    continue;
                }
            };

            match self.classify_and_store(owner, &bytes, &filename) {
                Ok(outcome) => report.succeeded.push(outcome),
                Err(e) => {
                    warn!("Classification failed for {}: {}", filename, e);
                    report.failed.push((filename, e.to_string()));
                }
            }
        }

        report
    }

    /// Resolve one embedding: reuse the most similar existing face group at
    /// or above the threshold, otherwise create a fresh group for it.
    fn resolve_face_group(&self, owner: &str, vector: &[f32]) -> Result<Person> {
        if let Some(person) =
            self.db
                .resolve_by_embedding(owner, vector, self.similarity_threshold)?
        {
            return Ok(person);
        }
        self.db.create_with_embedding(owner, vector)
    }

    /// Copy the image into the group's storage location (skipped when a
    /// same-named file is already there) and ensure the membership link.
    fn attach(
        &self,
        owner: &str,
        photo_id: &str,
        person: &Person,
        filename: &str,
        image: &[u8],
    ) -> Result<(), PipelineError> {
        self.store
            .put(owner, &person.folder_key, filename, image)
            .map_err(PipelineError::Storage)?;
        self.db
            .link_photo(photo_id, &person.id)
            .map_err(PipelineError::Index)?;
        Ok(())
    }
}

// ============================================================================
// Slug normalization
// ============================================================================

/// Normalize a free-text scene label to a storage-path-safe slug:
/// lowercase, non-word runs collapsed to a single underscore, truncated,
/// falling back to "uncategorised" when nothing survives.
pub fn normalize_label(raw: &str) -> String {
    let mut slug = String::new();
    let mut last_was_sep = false;

    for c in raw.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_was_sep = false;
        } else if !last_was_sep && !slug.is_empty() {
            slug.push('_');
            last_was_sep = true;
        }
    }

    let slug: String = slug.chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_matches('_');

    if slug.is_empty() {
        FALLBACK_LABEL.to_string()
    } else {
        slug.to_string()
    }
}

/// Slug for a user-named folder. Same shape as `normalize_label` but with
/// the manual-folder fallback.
pub fn slugify(text: &str) -> String {
    let slug = normalize_label(text);
    if slug == FALLBACK_LABEL {
        FALLBACK_FOLDER.to_string()
    } else {
        slug
    }
}
