/// Read-only aggregations for the presentation layer. Nothing here mutates.
use chrono::{DateTime, Local};

use super::Ledger;
use crate::error::{LedgerError, Result};
use crate::types::{Project, ProjectId, ProjectStatus, Task, TaskId, User};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProjectSummary {
    pub total_seconds: u64,
    pub active_tasks: usize,
    pub completed_tasks: usize,
    /// Share of the budget used, in percent. Not capped at 100.
    pub budget_percent: Option<f64>,
    pub over_budget: bool,
    pub overdue: bool,
}

impl Ledger {
    /// Live elapsed time for display: closed time plus the running interval.
    pub fn live_elapsed(&self, task_id: TaskId) -> Result<u64> {
        let task = self
            .task(task_id)
            .ok_or_else(|| LedgerError::not_found("task", task_id))?;
        Ok(task.live_elapsed(self.clock.now()))
    }

    pub fn running_task(&self, user: User) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|task| task.user == user && task.is_running)
    }

    pub fn tasks_for(&self, user: User) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |task| task.user == user)
    }

    pub fn project_summary(&self, project_id: ProjectId) -> Result<ProjectSummary> {
        let project = self
            .project(project_id)
            .ok_or_else(|| LedgerError::not_found("project", project_id))?;
        Ok(summarize(project, &self.tasks, self.clock.now()))
    }
}

fn summarize(project: &Project, tasks: &[Task], now: DateTime<Local>) -> ProjectSummary {
    let mut summary = ProjectSummary::default();
    for task in tasks.iter().filter(|task| task.project_id == project.id) {
        summary.total_seconds += task.live_elapsed(now);
        if task.is_completed() {
            summary.completed_tasks += 1;
        } else {
            summary.active_tasks += 1;
        }
    }

    if let Some(budget) = project.budget_hours {
        let hours = summary.total_seconds as f64 / 3600.0;
        summary.budget_percent = Some(hours / budget * 100.0);
        summary.over_budget = hours > budget;
    }
    summary.overdue = project.status != ProjectStatus::Completed
        && project
            .deadline
            .is_some_and(|deadline| deadline < now.date_naive());
    summary
}
