//! Prompt assembly for classification and delegated execution.
//!
//! Prompts are built with plain string concatenation in a fixed field
//! order so the same task always produces the same bytes.

use foreman_core::{AgentProfile, TaskSnapshot};

/// System preamble for the phase-two classification call.
pub const CLASSIFIER_SYSTEM_PROMPT: &str = "\
You route tasks to the most suitable agent.

Rules:
1. Reply with exactly one agent name from the provided list.
2. Reply with the name only. No punctuation, no explanation.
3. If no agent clearly fits, reply with the closest match anyway.";

/// User message for the phase-two classification call: the task text
/// followed by one line per registered agent.
pub fn classification_prompt(
    title: &str,
    description: &str,
    profiles: &[AgentProfile],
) -> String {
    let mut prompt = format!("Task title: {title}\nTask description: {description}\n\nAgents:\n");
    for profile in profiles {
        prompt.push_str(&format!("- {}: {}\n", profile.name, profile.description));
    }
    prompt.push_str("\nWhich agent should take this task?");
    prompt
}

/// Execution prompt handed to the assigned agent: the task snapshot,
/// optional retrieved snippets, then results carried over from earlier
/// agents in a chain.
pub fn execution_prompt(input: &TaskSnapshot, context: &[String], snippets: &[String]) -> String {
    let mut prompt = format!(
        "Task: {}\nPriority: {}\n\n{}\n",
        input.title, input.priority, input.description
    );
    if !snippets.is_empty() {
        prompt.push_str("\nRelevant context:\n");
        for snippet in snippets {
            prompt.push_str(&format!("- {snippet}\n"));
        }
    }
    if !context.is_empty() {
        prompt.push_str("\nResults from earlier agents:\n");
        for entry in context {
            prompt.push_str(entry);
            prompt.push('\n');
        }
    }
    prompt.push_str("\nProduce the deliverable for this task.");
    prompt
}

/// Role prompt for agents registered without one.
pub fn generic_role_prompt(agent_name: &str) -> String {
    format!(
        "You are {agent_name}, an agent in the Foreman delegation system. \
Complete the task you are given directly and concisely."
    )
}
