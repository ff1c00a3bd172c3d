//! Group maintenance: the operations that keep the identity index and the
//! filesystem store consistent with each other. Every mutation here touches
//! both sides, and the index is treated as authoritative when they disagree.

use anyhow::Result;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{info, warn};

use crate::db::{Database, DeliveryRecord, Person};
use crate::store::ImageStore;

/// One group with its listing-derived display data
#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub person: Person,
    pub photo_count: usize,
    /// Locator of the first stored image, for thumbnail display
    pub preview: Option<String>,
}

/// One stored photo as shown in a group's detail view
#[derive(Debug, Clone)]
pub struct PhotoEntry {
    pub filename: String,
    pub locator: String,
}

/// Dashboard counters. Photo figures come from a disk scan so they reflect
/// what is actually stored, not what the index believes.
#[derive(Debug, Clone, Default)]
pub struct DashboardStats {
    pub group_count: i64,
    pub photo_count: usize,
    pub delivery_count: i64,
    /// Most recently modified stored images, newest first
    pub recent: Vec<PhotoEntry>,
}

const RECENT_LIMIT: usize = 8;

pub struct GroupManager<'a> {
    db: &'a Database,
    store: &'a ImageStore,
}

impl<'a> GroupManager<'a> {
    pub fn new(db: &'a Database, store: &'a ImageStore) -> Self {
        Self { db, store }
    }

    /// Create an empty manual folder and its storage location.
    pub fn create_folder(&self, owner: &str, display_name: &str) -> Result<Person> {
        let person = self.db.create_folder(owner, display_name)?;
        self.store.group_dir(owner, &person.folder_key)?;
        info!("Created folder {} for {}", person.folder_key, owner);
        Ok(person)
    }

    /// Rename a group's display name. The folder key and stored files do not
    /// move.
    pub fn rename(&self, owner: &str, person_id: &str, new_name: &str) -> Result<bool> {
        let renamed = self.db.rename_person(person_id, owner, new_name)?;
        if renamed {
            info!("Renamed group {} to {:?}", person_id, new_name);
        }
        Ok(renamed)
    }

    /// Delete a group: index cascade first, then the storage location.
    /// Returns false when the group is missing or not owned.
    pub fn delete_folder(&self, owner: &str, person_id: &str) -> Result<bool> {
        let folder_key = match self.db.delete_person_cascade(person_id, owner)? {
            Some(key) => key,
            None => return Ok(false),
        };
        self.store.delete_group(owner, &folder_key)?;
        Ok(true)
    }

    /// Remove one stored photo from a group: the disk file, the membership
    /// links for matching index rows, and any photo rows left orphaned.
    /// Returns false when neither side had anything to remove.
    pub fn delete_photo(&self, owner: &str, person_id: &str, filename: &str) -> Result<bool> {
        let person = match self.db.find_person(owner, person_id)? {
            Some(p) => p,
            None => return Ok(false),
        };

        let removed_file = self.store.delete(owner, &person.folder_key, filename)?;

        let mut removed_links = false;
        for photo in self.db.photos_by_filename(owner, filename)? {
            if !self.db.link_exists(&photo.id, &person.id)? {
                continue;
            }
            self.db.unlink_photo(&photo.id, &person.id)?;
            self.db.delete_photo_if_orphaned(&photo.id)?;
            removed_links = true;
        }

        if removed_file && !removed_links {
            warn!(
                "Deleted {} from {} with no matching index row",
                filename, person.folder_key
            );
        }

        Ok(removed_file || removed_links)
    }

    /// Move or copy one stored photo between two groups of the same owner.
    /// With `keep_in_source` the photo ends up in both groups. Returns false
    /// when either group or the source file is missing.
    pub fn move_photo(
        &self,
        owner: &str,
        src_id: &str,
        dest_id: &str,
        filename: &str,
        keep_in_source: bool,
    ) -> Result<bool> {
        let src = match self.db.find_person(owner, src_id)? {
            Some(p) => p,
            None => return Ok(false),
        };
        let dest = match self.db.find_person(owner, dest_id)? {
            Some(p) => p,
            None => return Ok(false),
        };

        if !self
            .store
            .file_path(owner, &src.folder_key, filename)
            .is_file()
        {
            return Ok(false);
        }

        // Copy first so a failure never loses the file
        self.store
            .copy_between(owner, &src.folder_key, &dest.folder_key, filename)?;

        for photo in self.db.photos_by_filename(owner, filename)? {
            if !self.db.link_exists(&photo.id, &src.id)? {
                continue;
            }
            self.db.link_photo(&photo.id, &dest.id)?;
            if !keep_in_source {
                self.db.unlink_photo(&photo.id, &src.id)?;
            }
        }

        if !keep_in_source {
            self.store.delete(owner, &src.folder_key, filename)?;
        }

        info!(
            "{} {} from {} to {}",
            if keep_in_source { "Copied" } else { "Moved" },
            filename,
            src.folder_key,
            dest.folder_key
        );
        Ok(true)
    }

    /// All of an owner's groups with disk-derived photo counts and previews,
    /// oldest group first.
    pub fn persons_overview(&self, owner: &str) -> Result<Vec<GroupSummary>> {
        let mut summaries = Vec::new();
        for person in self.db.all_persons(owner)? {
            let files = self.store.list(owner, &person.folder_key);
            let preview = files
                .first()
                .map(|f| self.store.locator(owner, &person.folder_key, f));
            summaries.push(GroupSummary {
                photo_count: files.len(),
                preview,
                person,
            });
        }
        Ok(summaries)
    }

    /// Stored photos of one group, sorted by filename. Missing or foreign
    /// groups yield `None`.
    pub fn person_photos(&self, owner: &str, person_id: &str) -> Result<Option<Vec<PhotoEntry>>> {
        let person = match self.db.find_person(owner, person_id)? {
            Some(p) => p,
            None => return Ok(None),
        };

        let entries = self
            .store
            .list(owner, &person.folder_key)
            .into_iter()
            .map(|filename| PhotoEntry {
                locator: self.store.locator(owner, &person.folder_key, &filename),
                filename,
            })
            .collect();
        Ok(Some(entries))
    }

    /// Absolute disk paths of a group's stored photos, for attaching to an
    /// outgoing mail.
    pub fn photos_for_delivery(&self, owner: &str, person_id: &str) -> Result<Option<Vec<PathBuf>>> {
        let person = match self.db.find_person(owner, person_id)? {
            Some(p) => p,
            None => return Ok(None),
        };

        let paths = self
            .store
            .list(owner, &person.folder_key)
            .into_iter()
            .map(|filename| self.store.file_path(owner, &person.folder_key, &filename))
            .collect();
        Ok(Some(paths))
    }

    pub fn delivery_history(&self, owner: &str) -> Result<Vec<DeliveryRecord>> {
        self.db.delivery_history(owner)
    }

    /// Dashboard counters. Photos are counted from disk with filename dedup,
    /// so a file copied into two groups counts once.
    pub fn dashboard_stats(&self, owner: &str) -> Result<DashboardStats> {
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut recent: Vec<(SystemTime, PhotoEntry)> = Vec::new();

        for person in self.db.all_persons(owner)? {
            for filename in self.store.list(owner, &person.folder_key) {
                if !seen.insert(filename.clone()) {
                    continue;
                }
                let modified = self.store.modified_at(owner, &person.folder_key, &filename);
                recent.push((
                    modified,
                    PhotoEntry {
                        locator: self.store.locator(owner, &person.folder_key, &filename),
                        filename,
                    },
                ));
            }
        }

        let photo_count = seen.len();
        recent.sort_by(|a, b| b.0.cmp(&a.0));
        recent.truncate(RECENT_LIMIT);

        Ok(DashboardStats {
            group_count: self.db.count_persons(owner)?,
            photo_count,
            delivery_count: self.db.count_deliveries(owner)?,
            recent: recent.into_iter().map(|(_, e)| e).collect(),
        })
    }
}
