//! CLI argument parsing for rmap.

use clap::{Parser, Subcommand, ValueEnum};
use roadmap::{Complexity, Direction, Experience, LearningPreferences, LearningStyle, Motivation};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rmap",
    about = "Turn goals into task roadmaps and lay them out as dependency graphs",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/roadmap/logs/roadmap.log"
)]
pub struct Cli {
    /// Path to the config file (default: ./.roadmap.yml, then ~/.config/roadmap/roadmap.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding saved roadmaps (default: from config, else current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    /// Layout direction (TB or LR), overriding the config
    #[arg(long, global = true)]
    pub direction: Option<Direction>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ask the service to break a goal into tasks
    Goal {
        /// Free-form goal
        text: String,

        #[arg(long, value_enum)]
        style: Option<StyleArg>,

        #[arg(long, value_enum)]
        complexity: Option<ComplexityArg>,

        #[arg(long, value_enum)]
        motivation: Option<MotivationArg>,

        #[arg(long, value_enum)]
        experience: Option<ExperienceArg>,

        /// Additional notes for the planner
        #[arg(long)]
        notes: Option<String>,

        /// Save the resulting roadmap under this title
        #[arg(short, long)]
        save: Option<String>,
    },

    /// Schedule coursework for the stored student roster
    Coursework {
        /// Save the resulting roadmap under this title
        #[arg(short, long)]
        save: Option<String>,
    },

    /// Manage the student roster
    Student {
        #[command(subcommand)]
        command: StudentCommand,
    },

    /// Manage saved roadmaps
    Saved {
        #[command(subcommand)]
        command: SavedCommand,
    },

    /// Normalize a stored service response and print its layout
    Render {
        /// JSON file holding a `result` object (or a whole `complete` frame)
        file: PathBuf,

        /// Task ids to show as completed
        #[arg(long, value_delimiter = ',')]
        done: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum StudentCommand {
    /// Add a student with default skill levels
    Add {
        name: String,
    },

    /// List the roster
    List,

    /// Remove a student (ids of later students shift down)
    Remove {
        /// Student id, e.g. S2
        id: String,
    },

    /// Set a numeric attribute: cognitivePower, availableHours or a skill name
    Set {
        /// Student id, e.g. S2
        id: String,

        attribute: String,

        value: f64,
    },
}

#[derive(Subcommand)]
pub enum SavedCommand {
    /// List saved roadmaps
    List,

    /// Show a saved roadmap and its layout
    Show {
        id: String,
    },

    /// Rename a saved roadmap
    Rename {
        id: String,

        title: String,
    },

    /// Delete a saved roadmap
    Delete {
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StyleArg {
    Practical,
    Theoretical,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ComplexityArg {
    Basic,
    Intermediate,
    Advanced,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MotivationArg {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExperienceArg {
    None,
    Beginner,
    Intermediate,
    Advanced,
}

/// Build learning preferences if any preference flag was given.
pub fn preferences(
    style: Option<StyleArg>,
    complexity: Option<ComplexityArg>,
    motivation: Option<MotivationArg>,
    experience: Option<ExperienceArg>,
    notes: Option<String>,
) -> Option<LearningPreferences> {
    if style.is_none() && complexity.is_none() && motivation.is_none() && experience.is_none() && notes.is_none() {
        return None;
    }

    let mut prefs = LearningPreferences::default();
    if let Some(style) = style {
        prefs.learning_style = match style {
            StyleArg::Practical => LearningStyle::Practical,
            StyleArg::Theoretical => LearningStyle::Theoretical,
        };
    }
    if let Some(complexity) = complexity {
        prefs.preferred_complexity = match complexity {
            ComplexityArg::Basic => Complexity::Basic,
            ComplexityArg::Intermediate => Complexity::Intermediate,
            ComplexityArg::Advanced => Complexity::Advanced,
        };
    }
    if let Some(motivation) = motivation {
        prefs.motivation = match motivation {
            MotivationArg::Low => Motivation::Low,
            MotivationArg::Medium => Motivation::Medium,
            MotivationArg::High => Motivation::High,
        };
    }
    if let Some(experience) = experience {
        prefs.prior_experience = match experience {
            ExperienceArg::None => Experience::None,
            ExperienceArg::Beginner => Experience::Beginner,
            ExperienceArg::Intermediate => Experience::Intermediate,
            ExperienceArg::Advanced => Experience::Advanced,
        };
    }
    prefs.additional_notes = notes.unwrap_or_default();
    Some(prefs)
}
