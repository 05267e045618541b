//! Context gathered for an agent before it runs a task.
//!
//! Every supplier is optional. A failing supplier is logged and its section
//! is simply left out of the bundle.

use crate::persistence::{Persistence, ProjectFile};
use crate::types::{Task, TaskId, TaskStatus};
use async_trait::async_trait;
use maestro_core::MaestroResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

const KNOWLEDGE_LIMIT: usize = 5;
const KNOWLEDGE_THRESHOLD: f32 = 0.7;
const PRIOR_TASK_LIMIT: usize = 10;
const PRIOR_SUMMARY_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    pub content: String,
    pub score: f32,
    pub source: String,
}

/// A finished task from the same project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorTask {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub project_summary: Option<String>,
    pub related_files: Vec<ProjectFile>,
    pub prior_tasks: Vec<PriorTask>,
    pub knowledge: Vec<KnowledgeSnippet>,
    pub related_concepts: Vec<String>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.project_summary.is_none()
            && self.related_files.is_empty()
            && self.prior_tasks.is_empty()
            && self.knowledge.is_empty()
            && self.related_concepts.is_empty()
    }
}

/// Retrieves knowledge snippets similar to a query.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> MaestroResult<Vec<KnowledgeSnippet>>;
}

/// Looks up concepts linked to a node.
#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    async fn related_concepts(&self, node_id: &str) -> MaestroResult<Vec<String>>;
}

#[derive(Clone)]
pub struct ContextAssembler {
    persistence: Arc<dyn Persistence>,
    search: Option<Arc<dyn SemanticSearch>>,
    graph: Option<Arc<dyn KnowledgeGraph>>,
}

impl ContextAssembler {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self {
            persistence,
            search: None,
            graph: None,
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_semantic_search(mut self, search: Arc<dyn SemanticSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_knowledge_graph(mut self, graph: Arc<dyn KnowledgeGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub async fn assemble(&self, task: &Task) -> ContextBundle {
        let mut bundle = ContextBundle::default();

        if let Some(project_id) = task.project_id.as_deref() {
            match self.persistence.get_project(project_id).await {
                Ok(project) => {
                    bundle.project_summary =
                        project.map(|p| format!("{}: {}", p.name, p.description));
                }
                Err(e) => warn!(project_id, error = %e, "Project lookup failed"),
            }
            match self.persistence.get_project_files(project_id).await {
                Ok(files) => bundle.related_files = files,
                Err(e) => warn!(project_id, error = %e, "Project files lookup failed"),
            }
            match self.persistence.get_tasks(project_id).await {
                Ok(tasks) => bundle.prior_tasks = prior_tasks(task.id, tasks),
                Err(e) => warn!(project_id, error = %e, "Prior tasks lookup failed"),
            }
            if let Some(graph) = &self.graph {
                match graph.related_concepts(project_id).await {
                    Ok(concepts) => bundle.related_concepts = concepts,
                    Err(e) => warn!(project_id, error = %e, "Knowledge graph unavailable"),
                }
            }
        }

        if let Some(search) = &self.search {
            let query = format!("{}\n{}", task.title, task.description);
            match search
                .search(query.trim(), KNOWLEDGE_LIMIT, KNOWLEDGE_THRESHOLD)
                .await
            {
                Ok(snippets) => bundle.knowledge = snippets,
                Err(e) => warn!(task_id = %task.id, error = %e, "Semantic search unavailable"),
            }
        }
        bundle
    }
}

fn prior_tasks(current: TaskId, tasks: Vec<Task>) -> Vec<PriorTask> {
    let finished: Vec<PriorTask> = tasks
        .into_iter()
        .filter(|t| t.id != current && t.status.is_terminal())
        .map(|t| PriorTask {
            id: t.id,
            title: t.title,
            status: t.status,
            summary: t
                .result
                .filter(|r| r.success)
                .map(|r| r.output.chars().take(PRIOR_SUMMARY_CHARS).collect()),
        })
        .collect();
    let skip = finished.len().saturating_sub(PRIOR_TASK_LIMIT);
    finished.into_iter().skip(skip).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryPersistence, Project};
    use crate::types::{TaskResult, TaskType};
    use maestro_core::MaestroError;

    struct FixedSearch;

    #[async_trait]
    impl SemanticSearch for FixedSearch {
        async fn search(
            &self,
            _query: &str,
            limit: usize,
            _threshold: f32,
        ) -> MaestroResult<Vec<KnowledgeSnippet>> {
            Ok((0..limit.min(2))
                .map(|i| KnowledgeSnippet {
                    content: format!("snippet {i}"),
                    score: 0.9,
                    source: "docs".into(),
                })
                .collect())
        }
    }

    struct BrokenSearch;

    #[async_trait]
    impl SemanticSearch for BrokenSearch {
        async fn search(&self, _: &str, _: usize, _: f32) -> MaestroResult<Vec<KnowledgeSnippet>> {
            Err(MaestroError::Provider("index offline".into()))
        }
    }

    struct BrokenGraph;

    #[async_trait]
    impl KnowledgeGraph for BrokenGraph {
        async fn related_concepts(&self, _: &str) -> MaestroResult<Vec<String>> {
            Err(MaestroError::Provider("graph offline".into()))
        }
    }

    async fn seeded_store() -> Arc<InMemoryPersistence> {
        let store = Arc::new(InMemoryPersistence::new());
        store
            .put_project(Project {
                id: "shop".into(),
                name: "Shop".into(),
                description: "Storefront".into(),
            })
            .await;
        let mut done = Task::new("Cart API", TaskType::Code).with_project("shop");
        done.status = TaskStatus::Completed;
        done.result = Some(TaskResult::success("Built the cart endpoints"));
        store.save_task(&done).await.unwrap();
        let pending = Task::new("Checkout", TaskType::Code).with_project("shop");
        store.save_task(&pending).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_assembles_project_context() {
        let store = seeded_store().await;
        let assembler = ContextAssembler::new(store).with_semantic_search(Arc::new(FixedSearch));
        let task = Task::new("Payments", TaskType::Code).with_project("shop");

        let bundle = assembler.assemble(&task).await;
        assert_eq!(bundle.project_summary.as_deref(), Some("Shop: Storefront"));
        assert_eq!(bundle.prior_tasks.len(), 1);
        assert_eq!(
            bundle.prior_tasks[0].summary.as_deref(),
            Some("Built the cart endpoints")
        );
        assert_eq!(bundle.knowledge.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_suppliers_are_omitted() {
        let store = seeded_store().await;
        let assembler = ContextAssembler::new(store)
            .with_semantic_search(Arc::new(BrokenSearch))
            .with_knowledge_graph(Arc::new(BrokenGraph));
        let task = Task::new("Payments", TaskType::Code).with_project("shop");

        let bundle = assembler.assemble(&task).await;
        assert!(bundle.knowledge.is_empty());
        assert!(bundle.related_concepts.is_empty());
        assert!(bundle.project_summary.is_some());
    }

    #[tokio::test]
    async fn test_task_without_project() {
        let assembler = ContextAssembler::new(Arc::new(InMemoryPersistence::new()));
        let bundle = assembler.assemble(&Task::new("Loose", TaskType::Test)).await;
        assert!(bundle.is_empty());
    }
}
