//! Prompt text sent to the oracle
//!
//! Two flavours: operational-only (no source files configured) and code
//! editing (current source text embedded, `files_to_edit` schema).

use crate::domain::HealthSnapshot;
use crate::supervisor::context::tail_chars;
use std::collections::BTreeMap;
use std::fmt::Write;

const OPERATIONAL_SCHEMA: &str = r#"{
    "error_analysis": "Brief description of what went wrong",
    "root_cause": "The actual root cause",
    "fix_type": "restart|rebuild|update_config|other",
    "commands": ["command1", "command2"],
    "explanation": "Why this fix should work",
    "confidence": "high|medium|low"
}"#;

const CODE_EDIT_SCHEMA: &str = r#"{
    "error_analysis": "Detailed analysis of what went wrong",
    "root_cause": "The actual root cause",
    "fix_type": "code_edit|restart|rebuild|update_config|other",
    "files_to_edit": [
        {
            "filename": "one of the files shown above",
            "changes": [
                {
                    "old_code": "exact code to replace (must match exactly!)",
                    "new_code": "new code to insert",
                    "explanation": "why this fixes it"
                }
            ]
        }
    ],
    "docker_commands": ["docker restart <container>"],
    "git_commit_message": "Fix: description of what was fixed",
    "confidence": "high|medium|low",
    "explanation": "Why this fix should work",
    "testing_steps": ["how to verify the fix worked"]
}"#;

/// Build the diagnosis prompt for one snapshot
pub fn build_prompt(
    snapshot: &HealthSnapshot,
    sources: &BTreeMap<String, String>,
    log_excerpt_chars: usize,
) -> String {
    let mut prompt = String::new();

    if sources.is_empty() {
        prompt.push_str(
            "You are an autonomous system administrator for a containerized service running in Docker.\n\n",
        );
    } else {
        prompt.push_str("You are an autonomous system that fixes bugs in production code.\n\n");
    }

    let _ = writeln!(prompt, "CONTAINER: {}", snapshot.service);
    let _ = writeln!(prompt, "RUNNING: {}", snapshot.running);
    let _ = writeln!(
        prompt,
        "STATUS: {}",
        if snapshot.status_text.is_empty() { "not running" } else { snapshot.status_text.as_str() }
    );
    let _ = writeln!(prompt, "ERROR DETECTED: {}", snapshot.error_detected);
    let _ = writeln!(prompt, "ERROR TYPE: {}", snapshot.error_type);

    prompt.push_str("\nERROR CONTEXT:\n```\n");
    prompt.push_str(snapshot.error_context.as_deref().unwrap_or("None"));
    prompt.push_str("\n```\n");

    prompt.push_str("\nRECENT LOGS:\n```\n");
    if snapshot.recent_log.is_empty() {
        prompt.push_str("No logs available");
    } else {
        prompt.push_str(tail_chars(&snapshot.recent_log, log_excerpt_chars));
    }
    prompt.push_str("\n```\n");

    for (filename, content) in sources {
        let _ = write!(prompt, "\nCURRENT SOURCE CODE - {}:\n```\n{}\n```\n", filename, content);
    }

    if sources.is_empty() {
        prompt.push_str("\nTASK: Analyze this error and provide an executable fix.\n\n");
        prompt.push_str("Return a JSON response with this structure:\n");
        prompt.push_str(OPERATIONAL_SCHEMA);
        prompt.push_str(
            "\n\nIMPORTANT:\n\
             - Provide actual shell commands that can be executed\n\
             - Commands should be safe and non-destructive\n\
             - Focus on common Docker/runtime/network issues\n\
             - If unsure, recommend \"restart\" as safe default\n",
        );
    } else {
        prompt.push_str("\nTASK: Analyze this error and provide a complete fix.\n\n");
        prompt.push_str("Return a JSON response with this EXACT structure:\n");
        prompt.push_str(CODE_EDIT_SCHEMA);
        prompt.push_str(
            "\n\nCRITICAL RULES:\n\
             1. old_code must EXACTLY match the existing code (including whitespace)\n\
             2. old_code should be unique within its file; only the first occurrence is replaced\n\
             3. Provide complete fixes, not partial\n\
             4. Only edit the files shown above\n\
             5. Be specific and actionable\n\
             6. If it's just a transient error, fix_type should be \"restart\" with docker_commands\n",
        );
    }

    prompt
}
