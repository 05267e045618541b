use crate::types::{Task, TaskAssignment, TaskId, TaskStatus};
use maestro_core::{MaestroError, MaestroResult};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// A unit of queued execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuedWork {
    /// Single-agent execution of an assigned task.
    Direct(TaskId),
    /// A collaboration strategy run.
    Collaboration(Uuid),
}

/// Task store with a FIFO work queue and the live assignment map.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    tasks: HashMap<TaskId, Task>,
    order: Vec<TaskId>,
    work: VecDeque<QueuedWork>,
    assignments: HashMap<TaskId, TaskAssignment>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a task, replacing any task with the same id.
    pub fn insert(&mut self, task: Task) -> TaskId {
        let id = task.id;
        if self.tasks.insert(id, task).is_none() {
            self.order.push(id);
        }
        id
    }

    pub fn get(&self, id: TaskId) -> MaestroResult<&Task> {
        self.tasks.get(&id).ok_or(MaestroError::TaskNotFound(id))
    }

    pub fn get_mut(&mut self, id: TaskId) -> MaestroResult<&mut Task> {
        self.tasks.get_mut(&id).ok_or(MaestroError::TaskNotFound(id))
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// All tasks in submission order.
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id)).collect()
    }

    pub fn by_project(&self, project_id: &str) -> Vec<&Task> {
        self.all_tasks()
            .into_iter()
            .filter(|t| t.project_id.as_deref() == Some(project_id))
            .collect()
    }

    /// Apply a lifecycle transition.
    pub fn transition(&mut self, id: TaskId, next: TaskStatus) -> MaestroResult<&mut Task> {
        let task = self.get_mut(id)?;
        task.transition(next)?;
        Ok(task)
    }

    pub fn enqueue(&mut self, work: QueuedWork) {
        self.work.push_back(work);
    }

    pub fn pop_work(&mut self) -> Option<QueuedWork> {
        self.work.pop_front()
    }

    /// Number of queued work items, including ones that will be skipped.
    pub fn queued_len(&self) -> usize {
        self.work.len()
    }

    /// Queued work in execution order.
    pub fn queued(&self) -> impl Iterator<Item = &QueuedWork> {
        self.work.iter()
    }

    /// Drop every queued item equal to `work`. Returns how many were removed.
    pub fn remove_work(&mut self, work: QueuedWork) -> usize {
        let before = self.work.len();
        self.work.retain(|w| *w != work);
        before - self.work.len()
    }

    pub fn assign(&mut self, assignment: TaskAssignment) {
        self.assignments.insert(assignment.task_id, assignment);
    }

    pub fn assignment(&self, task_id: TaskId) -> Option<&TaskAssignment> {
        self.assignments.get(&task_id)
    }

    pub fn take_assignment(&mut self, task_id: TaskId) -> Option<TaskAssignment> {
        self.assignments.remove(&task_id)
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    pub fn total_count(&self) -> usize {
        self.tasks.len()
    }
}
