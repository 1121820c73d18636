//! rmap CLI - turn goals into task roadmaps laid out as dependency graphs.

use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use log::info;
use roadmap::{
    Answer, Config, ErrorKind, Frame, GoalRequest, GraphSurface, LayoutedGraph, Outcome, RequestBody, RoadmapView,
    Session, Store, StudentAssignments, SurfaceEvent, TaskGraph, normalize_answer,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod cli;

use cli::{Cli, Command, SavedCommand, StudentCommand};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("roadmap")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("roadmap.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_store_dir(cli: &Cli, config: &Config) -> PathBuf {
    cli.dir
        .clone()
        .or_else(|| config.storage.dir.clone())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Prints a layout rank by rank.
struct TextSurface;

impl GraphSurface for TextSurface {
    fn draw(&mut self, layout: &LayoutedGraph, graph: &TaskGraph) {
        println!(
            "{} {} tasks, {} edges, {} ranks ({})",
            "→".blue(),
            layout.nodes.len(),
            layout.edges.len(),
            layout.rank_count(),
            layout.direction
        );

        for (rank, nodes) in layout.ranks().into_iter().enumerate() {
            println!("{}", format!("Rank {}", rank).bold());
            for node in nodes {
                let Some(task) = graph.get(&node.id) else {
                    continue;
                };
                let mark = if node.completed { "✓".green() } else { "○".dimmed() };
                let after: Vec<String> = layout
                    .edges
                    .iter()
                    .filter(|e| e.to_id == node.id)
                    .map(|e| e.from_id.clone())
                    .collect();
                let after = if after.is_empty() {
                    String::new()
                } else {
                    format!(" after {}", after.join(", "))
                };
                println!(
                    "  {} {} {} {}{}",
                    mark,
                    node.id.cyan(),
                    task.name,
                    format!("({} min)", task.estimated_duration).dimmed(),
                    after.dimmed()
                );
            }
        }

        println!("{}: {} min", "Total".bold(), graph.total_duration());
    }
}

fn print_assignments(table: &StudentAssignments) {
    if table.is_empty() {
        println!("{}", "No assignments returned".dimmed());
        return;
    }
    for (student, tasks) in table {
        println!("{}", student.cyan().bold());
        for (slot, task) in tasks {
            println!("  {}: {}", slot.dimmed(), task);
        }
    }
}

fn print_error(error: &ErrorKind) {
    match error {
        ErrorKind::ServerRefused(text) => eprintln!("{} {}", "Refused:".red().bold(), text),
        other => eprintln!("{} {}", "✗".red(), other),
    }
}

/// Run one request against the configured service.
fn request(config: &Config, body: RequestBody) -> Result<Outcome> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")?;

    runtime.block_on(async {
        let session = Session::from_config(config);
        let connect_timeout = Duration::from_millis(config.connection.connect_timeout_ms);
        session
            .wait_open(connect_timeout)
            .await
            .with_context(|| format!("Failed to connect to {}", config.endpoint))?;

        println!("{} Waiting for the service...", "→".blue());
        let outcome = session.request(body).await;
        session.close();
        outcome
    })
}

/// Show an outcome and optionally save the resulting roadmap.
fn present(view: &mut RoadmapView, store_dir: &Path, outcome: Outcome, save: Option<String>) -> Result<()> {
    let answer = outcome.clone();
    view.apply(outcome);

    match answer {
        Ok(Answer::Roadmap(graph)) => {
            view.render(&mut TextSurface);
            if let Some(title) = save {
                let mut store = Store::open_or_init(store_dir).context("Failed to open store")?;
                let saved = store.save(&title, &graph).context("Failed to save roadmap")?;
                println!("{} Saved: {} {}", "✓".green(), saved.id.cyan(), saved.title);
            }
        }
        Ok(Answer::Assignments(table)) => print_assignments(&table),
        Err(e) => {
            print_error(&e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_ref()).context("Failed to load config")?;
    config.validate()?;

    let store_dir = get_store_dir(&cli, &config);
    let mut view = RoadmapView::new(cli.direction.unwrap_or(config.view.direction), config.view.completion_policy);

    match cli.command {
        Command::Goal {
            text,
            style,
            complexity,
            motivation,
            experience,
            notes,
            save,
        } => {
            if text.trim().is_empty() {
                bail!("Goal cannot be empty");
            }
            let mut goal = GoalRequest::new(text.trim());
            if let Some(prefs) = cli::preferences(style, complexity, motivation, experience, notes) {
                goal = goal.with_preferences(prefs);
            }

            let outcome = request(&config, goal.into_body())?;
            present(&mut view, &store_dir, outcome, save)?;
        }

        Command::Coursework { save } => {
            let store = Store::open_or_init(&store_dir).context("Failed to open store")?;
            let roster = store.roster().context("Failed to load roster")?;
            if roster.is_empty() {
                bail!("The roster is empty. Add students with 'rmap student add <NAME>'");
            }

            let body = roster.request().into_body().context("Failed to encode coursework request")?;
            let outcome = request(&config, body)?;
            present(&mut view, &store_dir, outcome, save)?;
        }

        Command::Student { command } => {
            let mut store = Store::open_or_init(&store_dir).context("Failed to open store")?;
            let mut roster = store.roster().context("Failed to load roster")?;

            match command {
                StudentCommand::Add { name } => {
                    let student = roster.add(&name).map_err(|e| eyre::eyre!(e))?.clone();
                    store.save_roster(&roster).context("Failed to save roster")?;
                    println!("{} Added: {} {}", "✓".green(), student.student_id.cyan(), student.name);
                }

                StudentCommand::List => {
                    if roster.is_empty() {
                        println!("{}", "No students".dimmed());
                    }
                    for student in roster.students() {
                        let s = &student.skills;
                        println!(
                            "{} {} power {:.2}, {}h/week",
                            student.student_id.cyan(),
                            student.name,
                            student.cognitive_power,
                            student.available_hours
                        );
                        println!(
                            "    {}",
                            format!(
                                "programming {:.2} writing {:.2} analysis {:.2} testing {:.2} design {:.2} documentation {:.2}",
                                s.programming, s.writing, s.analysis, s.testing, s.design, s.documentation
                            )
                            .dimmed()
                        );
                    }
                }

                StudentCommand::Remove { id } => {
                    let index = roster
                        .students()
                        .iter()
                        .position(|s| s.student_id == id)
                        .ok_or_else(|| eyre::eyre!("No student with id {}", id))?;
                    let removed = roster.remove(index).map_err(|e| eyre::eyre!(e))?;
                    store.save_roster(&roster).context("Failed to save roster")?;
                    println!("{} Removed: {}", "✓".green(), removed.name);
                }

                StudentCommand::Set { id, attribute, value } => {
                    if !value.is_finite() || value < 0.0 {
                        bail!("Value must be a non-negative number");
                    }
                    let student = roster
                        .get_mut(&id)
                        .ok_or_else(|| eyre::eyre!("No student with id {}", id))?;
                    if !student.set(&attribute, value) {
                        bail!("Unknown attribute '{}'", attribute);
                    }
                    store.save_roster(&roster).context("Failed to save roster")?;
                    println!("{} {} {} = {}", "✓".green(), id.cyan(), attribute, value);
                }
            }
        }

        Command::Saved { command } => {
            let mut store = Store::open_or_init(&store_dir).context("Failed to open store")?;

            match command {
                SavedCommand::List => {
                    let saved = store.list().context("Failed to list roadmaps")?;
                    if saved.is_empty() {
                        println!("{}", "No saved roadmaps".dimmed());
                    }
                    for roadmap in saved {
                        println!(
                            "{} {} {}",
                            roadmap.id.cyan(),
                            roadmap.title,
                            format!("({} tasks, {})", roadmap.graph.len(), roadmap.created_at.format("%Y-%m-%d %H:%M"))
                                .dimmed()
                        );
                    }
                }

                SavedCommand::Show { id } => match store.get(&id).context("Failed to get roadmap")? {
                    Some(roadmap) => {
                        println!("{}: {}", "ID".bold(), roadmap.id.cyan());
                        println!("{}: {}", "Title".bold(), roadmap.title);
                        println!("{}: {}", "Created".bold(), roadmap.created_at);
                        view.replace(roadmap.graph);
                        view.render(&mut TextSurface);
                    }
                    None => {
                        eprintln!("{} Roadmap not found: {}", "✗".red(), id);
                        std::process::exit(1);
                    }
                },

                SavedCommand::Rename { id, title } => {
                    let renamed = store.rename(&id, &title).context("Failed to rename roadmap")?;
                    println!("{} Renamed: {} {}", "✓".green(), renamed.id.cyan(), renamed.title);
                }

                SavedCommand::Delete { id } => {
                    store.delete(&id).context("Failed to delete roadmap")?;
                    println!("{} Deleted: {}", "✓".green(), id.cyan());
                }
            }
        }

        Command::Render { file, done } => {
            let content =
                fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let value: serde_json::Value =
                serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", file.display()))?;

            let result = match Frame::classify(&value) {
                Frame::Complete { result } => result,
                _ => Some(value),
            };

            let outcome = normalize_answer(result.as_ref());
            view.apply(outcome.clone());
            if let Err(e) = &outcome {
                print_error(e);
                std::process::exit(1);
            }
            for id in done {
                view.handle_event(SurfaceEvent::MarkCompleteClicked(id));
            }
            if !view.render(&mut TextSurface)
                && let Ok(Answer::Assignments(table)) = &outcome
            {
                print_assignments(table);
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
