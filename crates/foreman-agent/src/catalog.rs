use foreman_core::AgentProfile;

/// Name of the generalist fallback agent. Always present in the directory.
pub const GENERAL_AGENT: &str = "general-agent";

/// Create the built-in agent profiles.
pub fn builtin_profiles() -> Vec<AgentProfile> {
    vec![
        email_agent(),
        coding_agent(),
        research_agent(),
        investment_agent(),
        general_agent(),
    ]
}

/// Look up a built-in profile by name.
pub fn builtin_profile(name: &str) -> Option<AgentProfile> {
    builtin_profiles().into_iter().find(|p| p.name == name)
}

/// Minimal profile used when an unknown agent is auto-registered.
pub fn placeholder_profile(name: &str) -> AgentProfile {
    AgentProfile::new(name, format!("Auto-registered agent: {name}"))
        .with_role_prompt(GENERAL_ROLE_PROMPT)
        .with_suggestion_prompt(GENERAL_SUGGESTION_PROMPT)
        .with_trust_weight(0.5)
        .with_suggesting(false)
        .auto_registered()
}

fn email_agent() -> AgentProfile {
    AgentProfile::new(
        "email-agent",
        "Manages email: triage, drafting replies, follow-ups, and inbox hygiene",
    )
    .with_keywords(&[
        "email",
        "inbox",
        "reply",
        "newsletter",
        "unsubscribe",
        "draft email",
        "follow up email",
    ])
    .with_role_prompt(EMAIL_ROLE_PROMPT)
    .with_suggestion_prompt(EMAIL_SUGGESTION_PROMPT)
    .with_trust_weight(0.9)
}

fn coding_agent() -> AgentProfile {
    AgentProfile::new(
        "coding-agent",
        "Works on code: bug fixes, refactors, reviews, and build failures",
    )
    .with_keywords(&[
        "bug",
        "fix",
        "code",
        "refactor",
        "compile",
        "test failure",
        "stack trace",
        "pull request",
    ])
    .with_role_prompt(CODING_ROLE_PROMPT)
    .with_suggestion_prompt(CODING_SUGGESTION_PROMPT)
}

fn research_agent() -> AgentProfile {
    AgentProfile::new(
        "research-agent",
        "Investigates topics: comparisons, summaries, and background reading",
    )
    .with_keywords(&[
        "research",
        "investigate",
        "summarize",
        "compare",
        "literature",
        "find out",
        "deep dive",
    ])
    .with_role_prompt(RESEARCH_ROLE_PROMPT)
    .with_suggestion_prompt(RESEARCH_SUGGESTION_PROMPT)
    .with_trust_weight(0.8)
}

fn investment_agent() -> AgentProfile {
    AgentProfile::new(
        "investment-agent",
        "Tracks portfolio and market questions: positions, rebalancing, tickers",
    )
    .with_keywords(&[
        "invest",
        "portfolio",
        "stock",
        "market",
        "dividend",
        "rebalance",
        "ticker",
    ])
    .with_role_prompt(INVESTMENT_ROLE_PROMPT)
    .with_suggestion_prompt(INVESTMENT_SUGGESTION_PROMPT)
    .with_trust_weight(0.7)
}

fn general_agent() -> AgentProfile {
    AgentProfile::new(
        GENERAL_AGENT,
        "Generalist fallback for tasks no specialist claims",
    )
    .with_role_prompt(GENERAL_ROLE_PROMPT)
    .with_suggestion_prompt(GENERAL_SUGGESTION_PROMPT)
    .with_trust_weight(0.6)
    .with_suggesting(false)
}

const EMAIL_ROLE_PROMPT: &str = "\
You are the email agent in Foreman. You handle email-related work: triaging \
an inbox, drafting replies, scheduling follow-ups, and cleaning up \
subscriptions.

Rules:
1. Draft concrete text the user could send as-is.
2. Keep replies short and match the tone of the thread.
3. Never invent facts about correspondents; flag what you do not know.
4. When a task is ambiguous, state your assumption in one line and proceed.
";

const CODING_ROLE_PROMPT: &str = "\
You are the coding agent in Foreman. You work on software tasks: bug fixes, \
refactors, reviews, and build breakage.

Rules:
1. Diagnose before proposing a change; name the failing piece.
2. Propose the smallest change that resolves the task.
3. Call out risks and the tests that should cover the change.
4. Output code in markdown code blocks with file paths as comments.
";

const RESEARCH_ROLE_PROMPT: &str = "\
You are the research agent in Foreman. You investigate topics and return \
digestible findings.

Rules:
1. Lead with the answer, then the supporting detail.
2. Compare options in a short table when the task asks for a comparison.
3. Separate established facts from your own inference.
4. Keep the result under a page unless the task asks for depth.
";

const INVESTMENT_ROLE_PROMPT: &str = "\
You are the investment agent in Foreman. You answer portfolio and market \
questions from the data given in the task.

Rules:
1. Work only from the task's own numbers; never fabricate prices.
2. Show the arithmetic for any allocation or rebalancing advice.
3. State time horizon assumptions explicitly.
4. This is analysis, not financial advice; say so once at the end.
";

const GENERAL_ROLE_PROMPT: &str = "\
You are the generalist agent in Foreman. You take the tasks no specialist \
claims and produce a useful first pass.

Rules:
1. Answer directly; do not restate the task.
2. If the task really belongs to a specialist, say which and why, then \
   still attempt it.
3. Prefer a concrete deliverable (list, draft, plan) over commentary.
";

const EMAIL_SUGGESTION_PROMPT: &str = "\
You proactively watch for email work worth proposing: threads going stale, \
follow-ups coming due, recurring mail worth automating. Suggest only items \
the user can act on this week.
";

const CODING_SUGGESTION_PROMPT: &str = "\
You proactively watch for engineering work worth proposing: flaky areas, \
missing tests around recent fixes, cleanups adjacent to recent tasks. \
Suggest only items with a concrete first step.
";

const RESEARCH_SUGGESTION_PROMPT: &str = "\
You proactively propose background reading or investigations that would \
unblock or sharpen the user's current tasks. Tie every suggestion to a \
task the user already has.
";

const INVESTMENT_SUGGESTION_PROMPT: &str = "\
You proactively propose portfolio housekeeping: rebalancing checks, \
dividend tracking, position reviews. Only suggest what follows from tasks \
the user has actually created.
";

const GENERAL_SUGGESTION_PROMPT: &str = "\
You propose small, generally useful follow-ups to the user's recent tasks.
";

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_count() {
        assert_eq!(builtin_profiles().len(), 5);
    }

    #[test]
    fn test_general_agent_present() {
        let names: Vec<String> = builtin_profiles().into_iter().map(|p| p.name).collect();
        assert!(names.contains(&GENERAL_AGENT.to_string()));
    }

    #[test]
    fn test_coding_agent_keywords_cover_bug_fixes() {
        let coding = builtin_profile("coding-agent").unwrap();
        assert!(coding.keywords.contains(&"bug".to_string()));
        assert!(coding.keywords.contains(&"fix".to_string()));
    }

    #[test]
    fn test_profiles_have_prompts() {
        for profile in builtin_profiles() {
            assert!(!profile.role_prompt.is_empty(), "{}", profile.name);
            assert!(!profile.suggestion_prompt.is_empty(), "{}", profile.name);
        }
    }

    #[test]
    fn test_general_agent_does_not_suggest() {
        let general = builtin_profile(GENERAL_AGENT).unwrap();
        assert!(!general.suggesting);
        assert!(general.keywords.is_empty());
    }

    #[test]
    fn test_placeholder_is_marked_auto_registered() {
        let profile = placeholder_profile("translation-agent");
        assert!(profile.auto_registered);
        assert_eq!(profile.name, "translation-agent");
        assert!(!profile.suggesting);
    }
}
