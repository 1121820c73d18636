//! Storage layer: append-only JSONL logs as the source of truth, SQLite as a query cache.

use crate::coursework::{DEFAULT_HOURS, DEFAULT_LEVEL, Skills, StudentSkill};
use crate::types::{SavedRoadmap, TaskGraph};
use chrono::{DateTime, SecondsFormat, Utc};
use eyre::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Storage directory name.
const ROADMAP_DIR: &str = ".roadmap";

/// JSONL file for saved roadmaps.
const ROADMAPS_FILE: &str = "roadmaps.jsonl";

/// JSONL file for the student roster.
const STUDENTS_FILE: &str = "students.jsonl";

/// SQLite database file.
const DB_FILE: &str = "roadmap.db";

/// One line of `students.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentEntry {
    #[serde(flatten)]
    pub student: StudentSkill,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

/// Storage handle for reading/writing roadmap data.
pub struct Storage {
    root: PathBuf,
    db: Connection,
}

impl Storage {
    /// Initialize storage in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let dir = root.join(ROADMAP_DIR);
        fs::create_dir_all(&dir).context("Failed to create .roadmap directory")?;

        for name in [ROADMAPS_FILE, STUDENTS_FILE] {
            let path = dir.join(name);
            if !path.exists() {
                File::create(&path).with_context(|| format!("Failed to create {}", name))?;
            }
        }

        let db = Connection::open(dir.join(DB_FILE)).context("Failed to open SQLite database")?;
        let mut storage = Self {
            root: root.to_path_buf(),
            db,
        };

        storage.init_schema()?;
        storage.rebuild_from_jsonl()?;

        Ok(storage)
    }

    /// Open existing storage.
    pub fn open(root: &Path) -> Result<Self> {
        let dir = root.join(ROADMAP_DIR);
        if !dir.exists() {
            eyre::bail!("No .roadmap directory found in {}", root.display());
        }

        let db = Connection::open(dir.join(DB_FILE)).context("Failed to open SQLite database")?;
        let mut storage = Self {
            root: root.to_path_buf(),
            db,
        };

        storage.init_schema()?;
        if storage.needs_rebuild()? {
            log::info!("SQLite cache out of date, rebuilding from JSONL");
            storage.rebuild_from_jsonl()?;
        }

        Ok(storage)
    }

    /// Open storage, initializing it first if needed.
    pub fn open_or_init(root: &Path) -> Result<Self> {
        if root.join(ROADMAP_DIR).exists() {
            Self::open(root)
        } else {
            Self::init(root)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(ROADMAP_DIR).join(name)
    }

    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS roadmaps (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    tasks TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_roadmaps_created ON roadmaps(created_at);

                CREATE TABLE IF NOT EXISTS students (
                    student_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    cognitive_power REAL,
                    available_hours REAL,
                    programming REAL,
                    writing REAL,
                    analysis REAL,
                    testing REAL,
                    design REAL,
                    documentation REAL
                );

                CREATE TABLE IF NOT EXISTS meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
            "#,
            )
            .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Check if SQLite needs to be rebuilt from JSONL.
    fn needs_rebuild(&self) -> Result<bool> {
        let roadmap_lines = count_lines(&self.path(ROADMAPS_FILE))?;
        let student_lines = count_lines(&self.path(STUDENTS_FILE))?;

        Ok(roadmap_lines as i64 != self.meta_count("jsonl_roadmaps_lines")
            || student_lines as i64 != self.meta_count("jsonl_students_lines"))
    }

    fn meta_count(&self, key: &str) -> i64 {
        self.db
            .query_row(
                "SELECT CAST(COALESCE((SELECT value FROM meta WHERE key = ?), '0') AS INTEGER)",
                params![key],
                |row| row.get(0),
            )
            .unwrap_or(0)
    }

    /// Rebuild the SQLite cache from the JSONL files (last occurrence wins, tombstones delete).
    pub fn rebuild_from_jsonl(&mut self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                DELETE FROM roadmaps;
                DELETE FROM students;
            "#,
            )
            .context("Failed to clear tables")?;

        let (roadmaps, roadmap_lines) = read_jsonl::<SavedRoadmap>(&self.path(ROADMAPS_FILE))?;
        let mut latest: HashMap<String, SavedRoadmap> = HashMap::new();
        for roadmap in roadmaps {
            latest.insert(roadmap.id.clone(), roadmap);
        }
        for roadmap in latest.values().filter(|r| !r.deleted) {
            self.insert_roadmap_to_db(roadmap)?;
        }

        let (students, student_lines) = read_jsonl::<StudentEntry>(&self.path(STUDENTS_FILE))?;
        let mut latest: HashMap<String, StudentEntry> = HashMap::new();
        for entry in students {
            latest.insert(entry.student.student_id.clone(), entry);
        }
        for entry in latest.values().filter(|e| !e.deleted) {
            self.insert_student_to_db(&entry.student)?;
        }

        self.db.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('jsonl_roadmaps_lines', ?)",
            params![roadmap_lines.to_string()],
        )?;
        self.db.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('jsonl_students_lines', ?)",
            params![student_lines.to_string()],
        )?;

        Ok(())
    }

    fn insert_roadmap_to_db(&self, roadmap: &SavedRoadmap) -> Result<()> {
        let tasks = serde_json::to_string(&roadmap.graph).context("Failed to serialize tasks")?;
        self.db.execute(
            r#"
            INSERT OR REPLACE INTO roadmaps (id, title, tasks, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                roadmap.id,
                roadmap.title,
                tasks,
                timestamp(&roadmap.created_at),
                timestamp(&roadmap.updated_at),
            ],
        )?;
        Ok(())
    }

    fn insert_student_to_db(&self, student: &StudentSkill) -> Result<()> {
        let skills = &student.skills;
        self.db.execute(
            r#"
            INSERT OR REPLACE INTO students
                (student_id, name, cognitive_power, available_hours,
                 programming, writing, analysis, testing, design, documentation)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                student.student_id,
                student.name,
                student.cognitive_power,
                student.available_hours,
                skills.programming,
                skills.writing,
                skills.analysis,
                skills.testing,
                skills.design,
                skills.documentation,
            ],
        )?;
        Ok(())
    }

    /// Append a roadmap record (or tombstone) and update the cache.
    pub fn append_roadmap(&mut self, roadmap: &SavedRoadmap) -> Result<()> {
        append_jsonl(&self.path(ROADMAPS_FILE), roadmap)?;

        if roadmap.deleted {
            self.db
                .execute("DELETE FROM roadmaps WHERE id = ?", params![roadmap.id])?;
        } else {
            self.insert_roadmap_to_db(roadmap)?;
        }
        self.bump_line_count("jsonl_roadmaps_lines")
    }

    /// Append a student record (or tombstone) and update the cache.
    pub fn append_student(&mut self, entry: &StudentEntry) -> Result<()> {
        append_jsonl(&self.path(STUDENTS_FILE), entry)?;

        if entry.deleted {
            self.db.execute(
                "DELETE FROM students WHERE student_id = ?",
                params![entry.student.student_id],
            )?;
        } else {
            self.insert_student_to_db(&entry.student)?;
        }
        self.bump_line_count("jsonl_students_lines")
    }

    fn bump_line_count(&self, key: &str) -> Result<()> {
        self.db.execute(
            "UPDATE meta SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT) WHERE key = ?",
            params![key],
        )?;
        Ok(())
    }

    pub fn get_roadmap(&self, id: &str) -> Result<Option<SavedRoadmap>> {
        let mut stmt = self
            .db
            .prepare("SELECT id, title, tasks, created_at, updated_at FROM roadmaps WHERE id = ?")?;
        let row = stmt.query_row(params![id], row_to_roadmap_parts).optional()?;
        row.map(RoadmapRow::into_saved).transpose()
    }

    /// All saved roadmaps, newest first.
    pub fn list_roadmaps(&self) -> Result<Vec<SavedRoadmap>> {
        let mut stmt = self.db.prepare(
            "SELECT id, title, tasks, created_at, updated_at FROM roadmaps ORDER BY created_at DESC, id ASC",
        )?;
        let rows: Vec<RoadmapRow> = stmt
            .query_map([], row_to_roadmap_parts)?
            .filter_map(|r| r.ok())
            .collect();
        rows.into_iter().map(RoadmapRow::into_saved).collect()
    }

    pub fn get_student(&self, student_id: &str) -> Result<Option<StudentSkill>> {
        let mut stmt = self.db.prepare(
            r#"
            SELECT student_id, name, cognitive_power, available_hours,
                   programming, writing, analysis, testing, design, documentation
            FROM students WHERE student_id = ?
            "#,
        )?;
        Ok(stmt.query_row(params![student_id], row_to_student).optional()?)
    }

    /// All students ordered by their numeric suffix (S1, S2, ..., S10).
    pub fn list_students(&self) -> Result<Vec<StudentSkill>> {
        let mut stmt = self.db.prepare(
            r#"
            SELECT student_id, name, cognitive_power, available_hours,
                   programming, writing, analysis, testing, design, documentation
            FROM students
            ORDER BY CAST(SUBSTR(student_id, 2) AS INTEGER) ASC, student_id ASC
            "#,
        )?;
        let students = stmt
            .query_map([], row_to_student)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(students)
    }
}

struct RoadmapRow {
    id: String,
    title: String,
    tasks: String,
    created_at: String,
    updated_at: String,
}

impl RoadmapRow {
    fn into_saved(self) -> Result<SavedRoadmap> {
        let graph: TaskGraph = serde_json::from_str(&self.tasks)
            .with_context(|| format!("Stored tasks for roadmap {} are corrupt", self.id))?;
        Ok(SavedRoadmap {
            id: self.id,
            title: self.title,
            graph,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            deleted: false,
        })
    }
}

fn row_to_roadmap_parts(row: &rusqlite::Row) -> rusqlite::Result<RoadmapRow> {
    Ok(RoadmapRow {
        id: row.get(0)?,
        title: row.get(1)?,
        tasks: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Missing numeric columns read back as the roster defaults.
fn row_to_student(row: &rusqlite::Row) -> rusqlite::Result<StudentSkill> {
    let level = |index: usize| -> rusqlite::Result<f64> {
        Ok(row.get::<_, Option<f64>>(index)?.unwrap_or(DEFAULT_LEVEL))
    };

    Ok(StudentSkill {
        student_id: row.get(0)?,
        name: row.get(1)?,
        cognitive_power: level(2)?,
        available_hours: row.get::<_, Option<f64>>(3)?.unwrap_or(DEFAULT_HOURS),
        skills: Skills {
            programming: level(4)?,
            writing: level(5)?,
            analysis: level(6)?,
            testing: level(7)?,
            design: level(8)?,
            documentation: level(9)?,
        },
    })
}

/// Fixed-width RFC 3339 so stored timestamps sort as text.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Read every parseable record of a JSONL file. Returns the records and the raw line count.
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, usize)> {
    let mut records = Vec::new();
    let mut line_count = 0;

    if !path.exists() {
        return Ok((records, line_count));
    }

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    for line in BufReader::new(file).lines() {
        line_count += 1;
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::warn!("Failed to read line {} of {}: {}", line_count, path.display(), e);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Failed to parse line {} of {}: {}", line_count, path.display(), e),
        }
    }

    Ok((records, line_count))
}

fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for append", path.display()))?;

    let json = serde_json::to_string(record).context("Failed to serialize record")?;
    writeln!(file, "{}", json).with_context(|| format!("Failed to write to {}", path.display()))?;
    file.sync_all().with_context(|| format!("Failed to sync {}", path.display()))?;
    Ok(())
}

/// Count lines in a file.
fn count_lines(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let file = File::open(path).context("Failed to open file for line count")?;
    Ok(BufReader::new(file).lines().count())
}
