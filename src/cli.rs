/// CLI argument parsing and command handling.
use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::ledger::{Ledger, ProjectSummary};
use crate::types::{
    NewProject, NewTask, ProjectId, ProjectPatch, ProjectStatus, SessionEdit, Task, TaskId,
    TaskPatch, User,
};

#[derive(Parser)]
#[command(
    name = "duotrack",
    version,
    about = "duotrack - A two-person time tracker"
)]
pub struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Show running timers (default)
    Status,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    Add {
        name: String,
        #[arg(long)]
        client: Option<String>,
        /// Deadline as YYYY-MM-DD
        #[arg(long)]
        deadline: Option<NaiveDate>,
        #[arg(long)]
        budget: Option<f64>,
    },
    List,
    Edit {
        project: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        deadline: Option<NaiveDate>,
        #[arg(long)]
        budget: Option<f64>,
        #[arg(long)]
        status: Option<ProjectStatus>,
    },
    Delete {
        project: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    Add {
        project: String,
        name: String,
        #[arg(short = 'u', long = "user")]
        user: User,
        /// Start the timer right away
        #[arg(short = 's', long = "start")]
        start: bool,
    },
    List {
        #[arg(short = 'u', long = "user")]
        user: Option<User>,
    },
    Start {
        task: String,
    },
    Pause {
        task: String,
    },
    Stop {
        task: String,
    },
    Recover {
        task: String,
    },
    Edit {
        task: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        user: Option<User>,
    },
    Delete {
        task: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    List {
        task: String,
    },
    Add {
        task: String,
        #[arg(short = 's', long = "start")]
        start: String,
        #[arg(short = 'e', long = "end")]
        end: String,
    },
    Edit {
        task: String,
        index: usize,
        #[arg(short = 's', long = "start")]
        start: Option<String>,
        #[arg(short = 'e', long = "end")]
        end: Option<String>,
    },
    Delete {
        task: String,
        index: usize,
    },
}

/// Execute a CLI command against the ledger.
pub fn run(command: Command, ledger: &mut Ledger) -> Result<()> {
    match command {
        Command::Project { command } => run_project(command, ledger),
        Command::Task { command } => run_task(command, ledger),
        Command::Session { command } => run_session(command, ledger),
        Command::Status => print_status(ledger),
    }
}

fn run_project(command: ProjectCommand, ledger: &mut Ledger) -> Result<()> {
    match command {
        ProjectCommand::Add {
            name,
            client,
            deadline,
            budget,
        } => {
            let id = ledger.add_project(NewProject {
                name,
                client,
                deadline,
                budget_hours: budget,
                ..NewProject::default()
            })?;
            println!("Created project {}", short_id(id));
        }
        ProjectCommand::List => print_projects(ledger)?,
        ProjectCommand::Edit {
            project,
            name,
            client,
            deadline,
            budget,
            status,
        } => {
            let id = resolve_project(ledger, &project)?;
            ledger.update_project(
                id,
                ProjectPatch {
                    name,
                    client: client.map(Some),
                    deadline: deadline.map(Some),
                    budget_hours: budget.map(Some),
                    status,
                },
            )?;
            println!("Updated project '{project}'");
        }
        ProjectCommand::Delete { project } => {
            let id = resolve_project(ledger, &project)?;
            ledger.delete_project(id)?;
            println!("Deleted project '{project}' and its tasks");
        }
    }
    Ok(())
}

fn run_task(command: TaskCommand, ledger: &mut Ledger) -> Result<()> {
    match command {
        TaskCommand::Add {
            project,
            name,
            user,
            start,
        } => {
            let project_id = resolve_project(ledger, &project)?;
            let id = ledger.add_task(NewTask {
                name,
                project_id,
                user,
            })?;
            if start {
                ledger.start_timer(id)?;
            }
            println!("Created task {}", short_id(id));
        }
        TaskCommand::List { user } => print_tasks(ledger, user)?,
        TaskCommand::Start { task } => {
            let id = resolve_task(ledger, &task)?;
            let user = task_by_id(ledger, id)?.user;
            let previous = ledger.running_task(user).map(|t| t.name.clone());
            ledger.start_timer(id)?;
            if let Some(previous) = previous {
                let started = &task_by_id(ledger, id)?.name;
                if &previous != started {
                    println!("Paused '{previous}'");
                }
            }
            println!("Started '{}'", task_by_id(ledger, id)?.name);
        }
        TaskCommand::Pause { task } => {
            let id = resolve_task(ledger, &task)?;
            ledger.pause_timer(id)?;
            let task = task_by_id(ledger, id)?;
            println!(
                "Paused '{}' at {}",
                task.name,
                format_duration(task.accumulated_time)
            );
        }
        TaskCommand::Stop { task } => {
            let id = resolve_task(ledger, &task)?;
            ledger.stop_task(id)?;
            let task = task_by_id(ledger, id)?;
            println!(
                "Completed '{}' with {}",
                task.name,
                format_duration(task.accumulated_time)
            );
        }
        TaskCommand::Recover { task } => {
            let id = resolve_task(ledger, &task)?;
            ledger.recover_task(id)?;
            println!("Recovered '{}'", task_by_id(ledger, id)?.name);
        }
        TaskCommand::Edit {
            task,
            name,
            project,
            user,
        } => {
            let id = resolve_task(ledger, &task)?;
            let project_id = project
                .map(|reference| resolve_project(ledger, &reference))
                .transpose()?;
            ledger.update_task(
                id,
                TaskPatch {
                    name,
                    project_id,
                    user,
                },
            )?;
            println!("Updated task {}", short_id(id));
        }
        TaskCommand::Delete { task } => {
            let id = resolve_task(ledger, &task)?;
            let name = task_by_id(ledger, id)?.name.clone();
            ledger.delete_task(id)?;
            println!("Deleted '{name}'");
        }
    }
    Ok(())
}

fn run_session(command: SessionCommand, ledger: &mut Ledger) -> Result<()> {
    match command {
        SessionCommand::List { task } => {
            let id = resolve_task(ledger, &task)?;
            print_sessions(task_by_id(ledger, id)?);
        }
        SessionCommand::Add { task, start, end } => {
            let id = resolve_task(ledger, &task)?;
            ledger.add_manual_session(id, parse_datetime(&start)?, parse_datetime(&end)?)?;
            println!("Added session to '{}'", task_by_id(ledger, id)?.name);
        }
        SessionCommand::Edit {
            task,
            index,
            start,
            end,
        } => {
            let id = resolve_task(ledger, &task)?;
            let edit = SessionEdit {
                start: start.as_deref().map(parse_datetime).transpose()?,
                end: end.as_deref().map(parse_datetime).transpose()?,
            };
            ledger.update_task_session(id, index, edit)?;
            println!("Updated session {index}");
        }
        SessionCommand::Delete { task, index } => {
            let id = resolve_task(ledger, &task)?;
            ledger.delete_task_session(id, index)?;
            println!("Deleted session {index}");
        }
    }
    Ok(())
}

fn print_status(ledger: &Ledger) -> Result<()> {
    for user in User::ALL {
        match ledger.running_task(user) {
            Some(task) => println!(
                "{user}: {} [{}] {}",
                task.name,
                short_id(task.id),
                format_duration(ledger.live_elapsed(task.id)?)
            ),
            None => println!("{user}: idle"),
        }
    }
    Ok(())
}

fn print_projects(ledger: &Ledger) -> Result<()> {
    for project in ledger.projects() {
        let summary: ProjectSummary = ledger.project_summary(project.id)?;
        let mut line = format!(
            "{}  {:<24} {:<9} {}  tasks {}/{}",
            short_id(project.id),
            project.name,
            project.status.as_str(),
            format_duration(summary.total_seconds),
            summary.active_tasks,
            summary.active_tasks + summary.completed_tasks,
        );
        if let (Some(budget), Some(percent)) = (project.budget_hours, summary.budget_percent) {
            line.push_str(&format!("  budget {budget}h ({percent:.0}%)"));
            if summary.over_budget {
                line.push_str(" OVER");
            }
        }
        if let Some(deadline) = project.deadline {
            line.push_str(&format!("  due {deadline}"));
            if summary.overdue {
                line.push_str(" OVERDUE");
            }
        }
        println!("{line}");
    }
    Ok(())
}

fn print_tasks(ledger: &Ledger, user: Option<User>) -> Result<()> {
    let snapshot = ledger.snapshot();
    let tasks: Vec<&Task> = match user {
        Some(user) => ledger.tasks_for(user).collect(),
        None => snapshot.tasks.iter().collect(),
    };
    for task in tasks {
        let project = snapshot
            .projects
            .iter()
            .find(|p| p.id == task.project_id)
            .map(|p| p.name.as_str())
            .unwrap_or("?");
        let marker = if task.is_running { "*" } else { " " };
        println!(
            "{marker} {}  {}  {:<24} {:<16} {:<9} {}",
            short_id(task.id),
            task.user,
            task.name,
            project,
            task.status.as_str(),
            format_duration(ledger.live_elapsed(task.id)?),
        );
    }
    Ok(())
}

fn print_sessions(task: &Task) {
    for (index, session) in task.sessions.iter().enumerate() {
        let end = session
            .end
            .map(|end| end.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "running".to_string());
        println!(
            "{index:>3}  {}  {end:<19}  {}",
            session.start.format("%Y-%m-%d %H:%M:%S"),
            format_duration(session.duration)
        );
    }
}

/// Matches a project by id, id prefix or exact name.
fn resolve_project(ledger: &Ledger, reference: &str) -> Result<ProjectId> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return Ok(id);
    }
    let matches: Vec<ProjectId> = ledger
        .projects()
        .iter()
        .filter(|p| p.name == reference || p.id.to_string().starts_with(reference))
        .map(|p| p.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("Project '{reference}' not found"),
        _ => bail!("Multiple projects match '{reference}', use the id instead"),
    }
}

/// Matches a task by id or unique id prefix.
fn resolve_task(ledger: &Ledger, reference: &str) -> Result<TaskId> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return Ok(id);
    }
    let matches: Vec<TaskId> = ledger
        .tasks()
        .iter()
        .filter(|t| t.id.to_string().starts_with(reference))
        .map(|t| t.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("Task '{reference}' not found"),
        _ => bail!("Task prefix '{reference}' is ambiguous"),
    }
}

fn task_by_id(ledger: &Ledger, id: TaskId) -> Result<&Task> {
    ledger
        .task(id)
        .ok_or_else(|| anyhow::anyhow!("Task {id} not found"))
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Accepts RFC 3339 or local `YYYY-MM-DD HH:MM[:SS]`.
fn parse_datetime(value: &str) -> Result<DateTime<Local>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Local));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            if let Some(dt) = Local.from_local_datetime(&naive).earliest() {
                return Ok(dt);
            }
        }
    }
    bail!("Cannot parse '{value}' as a date and time")
}

pub fn format_duration(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
