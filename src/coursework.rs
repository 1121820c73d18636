//! Coursework scheduling: the student roster and the request built from it.

use crate::protocol::RequestBody;
use serde::{Deserialize, Serialize};

/// Most students a roster may hold.
pub const MAX_STUDENTS: usize = 10;

/// Default cognitive power and per-skill level for a new student.
pub const DEFAULT_LEVEL: f64 = 0.7;

/// Default weekly hours for a new student.
pub const DEFAULT_HOURS: f64 = 20.0;

/// Instruction the scheduling service expects in every coursework request.
const RUN_MESSAGE: &str = "run the algorithm";

/// Skill levels in 0.0..=1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skills {
    pub programming: f64,
    pub writing: f64,
    pub analysis: f64,
    pub testing: f64,
    pub design: f64,
    pub documentation: f64,
}

impl Default for Skills {
    fn default() -> Self {
        Self {
            programming: DEFAULT_LEVEL,
            writing: DEFAULT_LEVEL,
            analysis: DEFAULT_LEVEL,
            testing: DEFAULT_LEVEL,
            design: DEFAULT_LEVEL,
            documentation: DEFAULT_LEVEL,
        }
    }
}

impl Skills {
    /// Set a skill by name. Returns false for an unknown name.
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        let slot = match name {
            "programming" => &mut self.programming,
            "writing" => &mut self.writing,
            "analysis" => &mut self.analysis,
            "testing" => &mut self.testing,
            "design" => &mut self.design,
            "documentation" => &mut self.documentation,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// One student as sent to the scheduling service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSkill {
    /// "S1", "S2", ... in roster order
    pub student_id: String,
    pub name: String,
    pub cognitive_power: f64,
    pub available_hours: f64,
    pub skills: Skills,
}

impl StudentSkill {
    /// A student with default levels.
    pub fn new(student_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            name: name.into(),
            cognitive_power: DEFAULT_LEVEL,
            available_hours: DEFAULT_HOURS,
            skills: Skills::default(),
        }
    }

    /// Set a numeric attribute: `cognitivePower`, `availableHours`, or a skill name.
    pub fn set(&mut self, attribute: &str, value: f64) -> bool {
        match attribute {
            "cognitivePower" | "cognitive_power" => self.cognitive_power = value,
            "availableHours" | "available_hours" => self.available_hours = value,
            skill => return self.skills.set(skill, value),
        }
        true
    }
}

/// Roster editing errors.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterError {
    EmptyName,
    Full,
    AtMinimum,
    NoSuchStudent(usize),
}

impl std::fmt::Display for RosterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterError::EmptyName => write!(f, "student name cannot be empty"),
            RosterError::Full => write!(f, "a roster holds at most {} students", MAX_STUDENTS),
            RosterError::AtMinimum => write!(f, "a roster needs at least one student"),
            RosterError::NoSuchStudent(index) => write!(f, "no student at position {}", index),
        }
    }
}

impl std::error::Error for RosterError {}

/// Ordered list of students; ids are kept contiguous (S1..Sn).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    students: Vec<StudentSkill>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from stored students, renumbering ids to match order.
    pub fn from_students(students: Vec<StudentSkill>) -> Self {
        let mut roster = Self { students };
        roster.students.truncate(MAX_STUDENTS);
        roster.renumber();
        roster
    }

    pub fn students(&self) -> &[StudentSkill] {
        &self.students
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    /// Append a student with default levels.
    pub fn add(&mut self, name: &str) -> Result<&StudentSkill, RosterError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RosterError::EmptyName);
        }
        if self.students.len() >= MAX_STUDENTS {
            return Err(RosterError::Full);
        }
        let id = format!("S{}", self.students.len() + 1);
        self.students.push(StudentSkill::new(id, name));
        Ok(&self.students[self.students.len() - 1])
    }

    /// Remove the student at `index`; later students are renumbered.
    pub fn remove(&mut self, index: usize) -> Result<StudentSkill, RosterError> {
        if index >= self.students.len() {
            return Err(RosterError::NoSuchStudent(index));
        }
        if self.students.len() <= 1 {
            return Err(RosterError::AtMinimum);
        }
        let removed = self.students.remove(index);
        self.renumber();
        Ok(removed)
    }

    pub fn get_mut(&mut self, student_id: &str) -> Option<&mut StudentSkill> {
        self.students.iter_mut().find(|s| s.student_id == student_id)
    }

    fn renumber(&mut self) {
        for (i, student) in self.students.iter_mut().enumerate() {
            student.student_id = format!("S{}", i + 1);
        }
    }

    /// Build the scheduling request for this roster.
    pub fn request(&self) -> CourseworkRequest {
        CourseworkRequest {
            message: RUN_MESSAGE.to_string(),
            number_of_students: self.students.len(),
            student_skills: self.students.clone(),
        }
    }
}

/// Body of a coursework scheduling request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseworkRequest {
    pub message: String,
    pub number_of_students: usize,
    pub student_skills: Vec<StudentSkill>,
}

impl CourseworkRequest {
    /// The service expects this body pre-serialized as a JSON string.
    pub fn into_body(self) -> Result<RequestBody, serde_json::Error> {
        Ok(RequestBody::Encoded(serde_json::to_string(&self)?))
    }
}
