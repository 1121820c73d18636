//! High-level store API: saved roadmaps and the student roster.

use crate::coursework::{Roster, StudentSkill};
use crate::id::generate_id;
use crate::storage::{Storage, StudentEntry};
use crate::types::{SavedRoadmap, TaskGraph};
use chrono::Utc;
use eyre::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Longest accepted roadmap title, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Roadmap or student not found.
    NotFound(String),
    /// Title is empty after trimming.
    EmptyTitle,
    /// Title longer than [`MAX_TITLE_LEN`].
    TitleTooLong(usize),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "not found: {}", id),
            StoreError::EmptyTitle => write!(f, "title cannot be empty"),
            StoreError::TitleTooLong(len) => {
                write!(f, "title is {} characters, at most {} allowed", len, MAX_TITLE_LEN)
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Trim a title and check its length.
pub fn validate_title(title: &str) -> Result<String, StoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::EmptyTitle);
    }
    let len = title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(StoreError::TitleTooLong(len));
    }
    Ok(title.to_string())
}

/// The roadmap store.
pub struct Store {
    storage: Storage,
}

impl Store {
    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let storage = Storage::init(root)?;
        Ok(Self { storage })
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        let storage = Storage::open(root)?;
        Ok(Self { storage })
    }

    /// Open the store, creating it on first use.
    pub fn open_or_init(root: &Path) -> Result<Self> {
        let storage = Storage::open_or_init(root)?;
        Ok(Self { storage })
    }

    pub fn root(&self) -> &Path {
        self.storage.root()
    }

    /// Save a graph under a title.
    pub fn save(&mut self, title: &str, graph: &TaskGraph) -> Result<SavedRoadmap> {
        let title = validate_title(title).map_err(|e| eyre::eyre!(e))?;
        let now = Utc::now();

        let roadmap = SavedRoadmap {
            id: generate_id(&title, now),
            title,
            graph: graph.clone(),
            created_at: now,
            updated_at: now,
            deleted: false,
        };

        self.storage
            .append_roadmap(&roadmap)
            .context("Failed to persist roadmap")?;
        log::info!("Saved roadmap {} ({} tasks)", roadmap.id, roadmap.graph.len());

        Ok(roadmap)
    }

    pub fn get(&self, id: &str) -> Result<Option<SavedRoadmap>> {
        self.storage.get_roadmap(id)
    }

    /// Saved roadmaps, newest first.
    pub fn list(&self) -> Result<Vec<SavedRoadmap>> {
        self.storage.list_roadmaps()
    }

    pub fn rename(&mut self, id: &str, title: &str) -> Result<SavedRoadmap> {
        let title = validate_title(title).map_err(|e| eyre::eyre!(e))?;
        let existing = self
            .storage
            .get_roadmap(id)?
            .ok_or_else(|| eyre::eyre!(StoreError::NotFound(id.to_string())))?;

        let updated = SavedRoadmap {
            title,
            updated_at: Utc::now(),
            ..existing
        };

        self.storage
            .append_roadmap(&updated)
            .context("Failed to persist rename")?;

        Ok(updated)
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        let existing = self
            .storage
            .get_roadmap(id)?
            .ok_or_else(|| eyre::eyre!(StoreError::NotFound(id.to_string())))?;

        let tombstone = SavedRoadmap {
            updated_at: Utc::now(),
            deleted: true,
            ..existing
        };

        self.storage
            .append_roadmap(&tombstone)
            .context("Failed to persist roadmap removal")?;
        log::info!("Deleted roadmap {}", id);

        Ok(())
    }

    /// Create or update a student by id.
    pub fn upsert_student(&mut self, student: &StudentSkill) -> Result<()> {
        let entry = StudentEntry {
            student: student.clone(),
            deleted: false,
        };
        self.storage
            .append_student(&entry)
            .context("Failed to persist student")
    }

    pub fn get_student(&self, student_id: &str) -> Result<Option<StudentSkill>> {
        self.storage.get_student(student_id)
    }

    pub fn list_students(&self) -> Result<Vec<StudentSkill>> {
        self.storage.list_students()
    }

    pub fn delete_student(&mut self, student_id: &str) -> Result<()> {
        let existing = self
            .storage
            .get_student(student_id)?
            .ok_or_else(|| eyre::eyre!(StoreError::NotFound(student_id.to_string())))?;

        self.storage
            .append_student(&StudentEntry {
                student: existing,
                deleted: true,
            })
            .context("Failed to persist student removal")
    }

    /// The stored roster, in id order.
    pub fn roster(&self) -> Result<Roster> {
        Ok(Roster::from_students(self.list_students()?))
    }

    /// Make the stored students match `roster` exactly.
    pub fn save_roster(&mut self, roster: &Roster) -> Result<()> {
        let keep: HashSet<&str> = roster.students().iter().map(|s| s.student_id.as_str()).collect();

        for stale in self.list_students()? {
            if !keep.contains(stale.student_id.as_str()) {
                self.delete_student(&stale.student_id)?;
            }
        }
        for student in roster.students() {
            if self.get_student(&student.student_id)?.as_ref() != Some(student) {
                self.upsert_student(student)?;
            }
        }

        Ok(())
    }
}
