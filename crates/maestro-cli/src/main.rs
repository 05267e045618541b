mod config;

use clap::{Parser, Subcommand};
use config::MaestroConfig;
use maestro_orchestrator::{
    default_agents, Agent, AgentStatus, CollaborationType, FileStore, Orchestrator, Persistence,
    SubmitOptions, SubmitOutcome, Task, TaskPriority, TaskType,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "maestro", about = "Maestro: multi-agent task orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "maestro.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the agent roster
    Agents,
    /// Print orchestration statistics
    Stats,
    /// Submit one task, run it to completion and print the result
    Run {
        #[arg(long)]
        title: String,
        /// code, design, debug, test, deploy or analyze
        #[arg(long = "type", default_value = "code")]
        task_type: TaskType,
        #[arg(long, default_value = "medium")]
        priority: TaskPriority,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        project: Option<String>,
        /// Run as a collaboration instead of a single agent
        #[arg(long)]
        collaborate: bool,
        /// Force a collaboration strategy (implies --collaborate)
        #[arg(long)]
        strategy: Option<CollaborationType>,
        /// Agent ids that get a scoring bonus
        #[arg(long)]
        prefer: Vec<String>,
        /// Skip scoring and run on this agent
        #[arg(long)]
        agent: Option<String>,
        /// Print the full task as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = MaestroConfig::load(&cli.config).await?;
    let orchestrator = build_orchestrator(&config).await?;

    match cli.command {
        Commands::Agents => {
            for agent in orchestrator.list_agents().await {
                print_agent(&agent);
            }
        }
        Commands::Stats => {
            let stats = orchestrator.get_orchestration_stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Run {
            title,
            task_type,
            priority,
            description,
            project,
            collaborate,
            strategy,
            prefer,
            agent,
            json,
        } => {
            let mut task = Task::new(title, task_type)
                .with_priority(priority)
                .with_description(description);
            if let Some(project) = project {
                task = task.with_project(project);
            }
            let options = SubmitOptions {
                require_collaboration: collaborate || strategy.is_some(),
                preferred_agents: prefer,
                force_agent: agent,
                collaboration_type: strategy,
            };

            let task_id = task.id;
            match orchestrator.submit_task(task, options).await? {
                SubmitOutcome::Assigned(assignment) => {
                    info!(task_id = %task_id, agent = %assignment.agent_id, "Running task");
                }
                SubmitOutcome::Collaboration {
                    collaboration_id,
                    collaboration_type,
                    participants,
                } => {
                    info!(
                        task_id = %task_id,
                        collaboration_id = %collaboration_id,
                        kind = %collaboration_type,
                        participants = ?participants,
                        "Running collaboration"
                    );
                }
            }
            orchestrator.process_queue().await;
            orchestrator.process_messages().await;

            let task = orchestrator.get_task(task_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                println!("Task {} [{}]", task.id, task.status);
                if let Some(result) = &task.result {
                    match &result.error {
                        Some(error) => println!("Error: {error}"),
                        None => println!("{}", result.output),
                    }
                    if !result.artifacts.is_empty() {
                        println!("\n{} artifact(s) extracted", result.artifacts.len());
                    }
                }
            }
        }
    }

    Ok(())
}

async fn build_orchestrator(config: &MaestroConfig) -> anyhow::Result<Orchestrator> {
    let router = Arc::new(config.router());
    let mut agents = default_agents(&config.roster_provider());

    let Some(dir) = &config.data_dir else {
        return Ok(Orchestrator::with_agents(
            config.orchestrator.clone(),
            router,
            agents,
        ));
    };

    let store = Arc::new(FileStore::new(dir.clone()).await?);
    for agent in &mut agents {
        // keep learned performance and config from earlier runs
        if let Some(mut stored) = store.load_agent(&agent.id).await? {
            stored.status = AgentStatus::Idle;
            stored.current_task = None;
            *agent = stored;
        }
    }
    info!(dir = %dir.display(), "Using file store");
    let persistence: Arc<dyn Persistence> = store;
    Ok(Orchestrator::with_agents(config.orchestrator.clone(), router, agents)
        .with_persistence(persistence))
}

fn print_agent(agent: &Agent) {
    let state = if agent.is_active { "active" } else { "inactive" };
    println!("{}: {} ({}, {state})", agent.id, agent.name, agent.role);
    let capabilities: Vec<&str> = agent.capabilities.iter().map(String::as_str).collect();
    println!("    capabilities: {}", capabilities.join(", "));
    println!(
        "    provider: {}, success rate {:.2}, {} task(s) completed",
        agent.config.primary_provider,
        agent.performance.success_rate,
        agent.performance.tasks_completed
    );
}
