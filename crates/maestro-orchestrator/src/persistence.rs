use crate::types::{Agent, Task, TaskId};
use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// A project tasks can belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// A file known to belong to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub path: String,
    pub language: Option<String>,
    pub summary: Option<String>,
}

/// Durable storage for agents, tasks and project metadata.
///
/// Writes are last-write-wins. The orchestrator logs failures and carries on.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save_agent(&self, agent: &Agent) -> MaestroResult<()>;
    async fn save_task(&self, task: &Task) -> MaestroResult<()>;
    /// Tasks belonging to `project_id`, oldest first.
    async fn get_tasks(&self, project_id: &str) -> MaestroResult<Vec<Task>>;
    async fn get_project(&self, id: &str) -> MaestroResult<Option<Project>>;
    async fn get_project_files(&self, project_id: &str) -> MaestroResult<Vec<ProjectFile>>;
}

/// Default in-process store.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    agents: RwLock<HashMap<String, Agent>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
    projects: RwLock<HashMap<String, Project>>,
    files: RwLock<HashMap<String, Vec<ProjectFile>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_project(&self, project: Project) {
        self.projects.write().await.insert(project.id.clone(), project);
    }

    pub async fn put_project_files(&self, project_id: &str, files: Vec<ProjectFile>) {
        self.files.write().await.insert(project_id.to_string(), files);
    }

    pub async fn agent(&self, id: &str) -> Option<Agent> {
        self.agents.read().await.get(id).cloned()
    }

    pub async fn task(&self, id: TaskId) -> Option<Task> {
        self.tasks.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn save_agent(&self, agent: &Agent) -> MaestroResult<()> {
        self.agents
            .write()
            .await
            .insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn save_task(&self, task: &Task) -> MaestroResult<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_tasks(&self, project_id: &str) -> MaestroResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn get_project(&self, id: &str) -> MaestroResult<Option<Project>> {
        Ok(self.projects.read().await.get(id).cloned())
    }

    async fn get_project_files(&self, project_id: &str) -> MaestroResult<Vec<ProjectFile>> {
        Ok(self
            .files
            .read()
            .await
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// File-based store (JSON files on disk).
///
/// Layout: `agents/<id>.json`, `tasks/<uuid>.json`, `projects/<id>.json` and
/// `projects/<id>.files.json`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn new(dir: PathBuf) -> MaestroResult<Self> {
        for sub in ["agents", "tasks", "projects"] {
            tokio::fs::create_dir_all(dir.join(sub)).await?;
        }
        Ok(Self { dir })
    }

    fn agent_path(&self, id: &str) -> PathBuf {
        self.dir.join("agents").join(format!("{id}.json"))
    }

    fn task_path(&self, id: TaskId) -> PathBuf {
        self.dir.join("tasks").join(format!("{id}.json"))
    }

    fn project_path(&self, id: &str) -> PathBuf {
        self.dir.join("projects").join(format!("{id}.json"))
    }

    fn files_path(&self, project_id: &str) -> PathBuf {
        self.dir.join("projects").join(format!("{project_id}.files.json"))
    }

    pub async fn put_project(&self, project: &Project) -> MaestroResult<()> {
        write_json(&self.project_path(&project.id), project).await
    }

    pub async fn put_project_files(
        &self,
        project_id: &str,
        files: &[ProjectFile],
    ) -> MaestroResult<()> {
        write_json(&self.files_path(project_id), &files).await
    }

    pub async fn load_agent(&self, id: &str) -> MaestroResult<Option<Agent>> {
        read_json(&self.agent_path(id)).await
    }

    pub async fn load_task(&self, id: TaskId) -> MaestroResult<Option<Task>> {
        read_json(&self.task_path(id)).await
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> MaestroResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> MaestroResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = tokio::fs::read_to_string(path).await?;
    let value = serde_json::from_str(&data).map_err(|e| {
        MaestroError::Persistence(format!("Failed to parse {}: {e}", path.display()))
    })?;
    Ok(Some(value))
}

#[async_trait]
impl Persistence for FileStore {
    async fn save_agent(&self, agent: &Agent) -> MaestroResult<()> {
        write_json(&self.agent_path(&agent.id), agent).await
    }

    async fn save_task(&self, task: &Task) -> MaestroResult<()> {
        write_json(&self.task_path(task.id), task).await
    }

    async fn get_tasks(&self, project_id: &str) -> MaestroResult<Vec<Task>> {
        let mut entries = tokio::fs::read_dir(self.dir.join("tasks")).await?;
        let mut tasks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(task) = read_json::<Task>(&path).await? {
                if task.project_id.as_deref() == Some(project_id) {
                    tasks.push(task);
                }
            }
        }
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn get_project(&self, id: &str) -> MaestroResult<Option<Project>> {
        read_json(&self.project_path(id)).await
    }

    async fn get_project_files(&self, project_id: &str) -> MaestroResult<Vec<ProjectFile>> {
        Ok(read_json(&self.files_path(project_id))
            .await?
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{AgentRole, TaskType};

    fn project() -> Project {
        Project {
            id: "shop".into(),
            name: "Shop".into(),
            description: "Storefront".into(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_last_write_wins() {
        let store = InMemoryPersistence::new();
        let mut agent = Agent::new("a", "A", AgentRole::Coder);
        store.save_agent(&agent).await.unwrap();
        agent.name = "Renamed".into();
        store.save_agent(&agent).await.unwrap();
        assert_eq!(store.agent("a").await.unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn test_in_memory_tasks_by_project() {
        let store = InMemoryPersistence::new();
        store
            .save_task(&Task::new("in", TaskType::Code).with_project("shop"))
            .await
            .unwrap();
        store
            .save_task(&Task::new("out", TaskType::Code))
            .await
            .unwrap();
        let tasks = store.get_tasks("shop").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "in");
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();

        let agent = Agent::new("deploy-master", "Deploy Master", AgentRole::DevOps);
        store.save_agent(&agent).await.unwrap();
        let loaded = store.load_agent("deploy-master").await.unwrap().unwrap();
        assert_eq!(loaded.role, AgentRole::DevOps);

        let task = Task::new("Ship", TaskType::Deploy).with_project("shop");
        store.save_task(&task).await.unwrap();
        assert_eq!(store.get_tasks("shop").await.unwrap().len(), 1);
        assert!(store.get_tasks("other").await.unwrap().is_empty());
        assert!(store.load_task(task.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_store_projects() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();
        assert!(store.get_project("shop").await.unwrap().is_none());
        assert!(store.get_project_files("shop").await.unwrap().is_empty());

        store.put_project(&project()).await.unwrap();
        store
            .put_project_files(
                "shop",
                &[ProjectFile {
                    path: "src/cart.rs".into(),
                    language: Some("rust".into()),
                    summary: None,
                }],
            )
            .await
            .unwrap();
        assert_eq!(store.get_project("shop").await.unwrap().unwrap(), project());
        assert_eq!(store.get_project_files("shop").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();
        tokio::fs::write(dir.path().join("agents").join("bad.json"), "{nope")
            .await
            .unwrap();
        assert!(matches!(
            store.load_agent("bad").await,
            Err(MaestroError::Persistence(_))
        ));
    }
}
