use crate::context::ContextBundle;
use crate::profiles::role_prompt;
use crate::types::{Agent, Task};
use maestro_core::ChatMessage;
use std::fmt::Write;

/// Build the `[system, user]` message pair for one agent call.
pub fn build_messages(
    agent: &Agent,
    task: &Task,
    instruction: Option<&str>,
    context: &ContextBundle,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(agent)),
        ChatMessage::user(user_prompt(task, instruction, context)),
    ]
}

fn system_prompt(agent: &Agent) -> String {
    let template = agent
        .config
        .prompt_template
        .as_deref()
        .unwrap_or_else(|| role_prompt(agent.role));
    let capabilities = agent
        .capabilities
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = template
        .replace("{name}", &agent.name)
        .replace("{role}", agent.role.title())
        .replace("{capabilities}", &capabilities);
    if !agent.description.is_empty() {
        let _ = write!(prompt, "\n{}", agent.description);
    }
    if !capabilities.is_empty() {
        let _ = write!(prompt, "\nCapabilities: {capabilities}");
    }
    prompt
}

fn user_prompt(task: &Task, instruction: Option<&str>, context: &ContextBundle) -> String {
    let mut prompt = format!(
        "# Task: {}\nType: {} | Priority: {:?}\n",
        task.title, task.task_type, task.priority
    );
    if !task.description.is_empty() {
        let _ = write!(prompt, "\n{}\n", task.description);
    }
    if let Some(instruction) = instruction {
        let _ = write!(prompt, "\n## Instructions\n{instruction}\n");
    }

    if let Some(summary) = &context.project_summary {
        let _ = write!(prompt, "\n## Project\n{summary}\n");
    }
    if !context.related_files.is_empty() {
        prompt.push_str("\n## Related files\n");
        for file in &context.related_files {
            let _ = write!(prompt, "- {}", file.path);
            if let Some(lang) = &file.language {
                let _ = write!(prompt, " ({lang})");
            }
            if let Some(summary) = &file.summary {
                let _ = write!(prompt, ": {summary}");
            }
            prompt.push('\n');
        }
    }
    if !context.prior_tasks.is_empty() {
        prompt.push_str("\n## Prior tasks\n");
        for prior in &context.prior_tasks {
            let _ = write!(prompt, "- {} [{}]", prior.title, prior.status);
            if let Some(summary) = &prior.summary {
                let _ = write!(prompt, ": {summary}");
            }
            prompt.push('\n');
        }
    }
    if !context.knowledge.is_empty() {
        prompt.push_str("\n## Relevant knowledge\n");
        for snippet in &context.knowledge {
            let _ = writeln!(prompt, "- ({}) {}", snippet.source, snippet.content);
        }
    }
    if !context.related_concepts.is_empty() {
        let _ = write!(
            prompt,
            "\n## Related concepts\n{}\n",
            context.related_concepts.join(", ")
        );
    }
    prompt
}
