//! Code reviewer stage.
//!
//! Advisory: a failed review triggers regeneration with the collected
//! feedback, but after the attempt limit the code is accepted as-is and
//! the workflow completes.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use tfgen_core::{Next, Phase, Stage, StageError, StageKind, WorkflowState};
use tfgen_llm::{extract_json, ChatClient, ChatTurn};

use crate::prompts::{FIX_SYSTEM_PROMPT, REVIEW_SYSTEM_PROMPT};

const MAX_REVIEW_ATTEMPTS: usize = 3;

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(\S+\.tf)\s*\n(.*?)```").unwrap());

#[derive(Debug, Default, Deserialize)]
struct ReviewReply {
    #[serde(default)]
    passed: bool,
    #[serde(default)]
    overall_score: u32,
    #[serde(default)]
    issues: Vec<ReviewIssue>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct ReviewIssue {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    file: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    suggestion: String,
}

pub struct CodeReviewerStage {
    client: Arc<dyn ChatClient>,
}

impl CodeReviewerStage {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }

    fn review_prompt(state: &WorkflowState) -> String {
        let files = render_files(&state.generated_code);
        let requirements = serde_json::to_string_pretty(&state.resources).unwrap_or_default();
        format!(
            "Review the following Terraform code generated for these requirements:\n\n\
             ## Requirements:\n{requirements}\n\n## Generated code:\n{files}\n"
        )
    }

    async fn regenerate(
        &self,
        state: &mut WorkflowState,
        feedback: &str,
    ) -> Result<(), StageError> {
        let files = render_files(&state.generated_code);
        let requirements = serde_json::to_string_pretty(&state.resources).unwrap_or_default();
        let prompt = format!(
            "## Original requirements:\n{requirements}\n\n## Current code:\n{files}\n\n\
             ## Review feedback (issues to fix):\n{feedback}\n\n\
             Please fix all the issues and output the corrected files."
        );

        let reply = self
            .client
            .chat(&[ChatTurn::system(FIX_SYSTEM_PROMPT), ChatTurn::user(prompt)])
            .await
            .map_err(|e| StageError::Llm(e.to_string()))?;

        let mut fixed: BTreeMap<String, String> = BTreeMap::new();
        for caps in CODE_BLOCK.captures_iter(&reply) {
            fixed.insert(caps[1].to_string(), caps[2].trim().to_string() + "\n");
        }
        if fixed.is_empty() {
            tracing::warn!(session = %state.session_id, "regeneration reply had no code blocks, keeping original");
            return Ok(());
        }

        // Only replace the files the model returned; untouched files stand.
        for (name, content) in fixed {
            state.generated_code.insert(name, content);
        }
        tfgen_render::fixups::apply(&mut state.generated_code);
        Ok(())
    }
}

fn render_files(files: &BTreeMap<String, String>) -> String {
    files
        .iter()
        .map(|(name, content)| format!("=== File: {name} ===\n{content}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Deterministic checks for the constraints the review prompt names.
fn static_issues(files: &BTreeMap<String, String>) -> Vec<String> {
    let mut issues = Vec::new();
    for (name, content) in files {
        if !name.ends_with(".tf") {
            continue;
        }
        for deprecated in ["enable_https_traffic_only", "allow_blob_public_access"] {
            if content.contains(deprecated) {
                issues.push(format!("{name}: uses deprecated parameter {deprecated}"));
            }
        }
    }
    issues
}

#[async_trait]
impl Stage for CodeReviewerStage {
    fn kind(&self) -> StageKind {
        StageKind::Review
    }

    async fn run(&self, state: &mut WorkflowState) -> Result<Next, StageError> {
        state.phase = Phase::ReviewingCode;

        if state.generated_code.is_empty() {
            return Err(StageError::Internal(
                "nothing to review: generated code is empty".to_string(),
            ));
        }

        let mut attempt = 1;
        loop {
            let mut prompt = Self::review_prompt(state);
            let pre_existing = static_issues(&state.generated_code);
            if !pre_existing.is_empty() {
                prompt.push_str("\n## Known issues from static checks:\n");
                for issue in &pre_existing {
                    prompt.push_str(&format!("- {issue}\n"));
                }
            }

            let reply = match self
                .client
                .chat(&[ChatTurn::system(REVIEW_SYSTEM_PROMPT), ChatTurn::user(prompt)])
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    // Advisory stage: a broken reviewer never blocks
                    // completed code.
                    tracing::warn!(session = %state.session_id, error = %e, "review call failed, accepting code");
                    state.phase = Phase::Completed;
                    state.push_assistant(
                        "Code generation completed. Automatic review was unavailable.",
                    );
                    return Ok(Next::Halt);
                }
            };

            let review: ReviewReply = extract_json(&reply)
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or(ReviewReply {
                    // Unparseable review: accept rather than block.
                    passed: true,
                    overall_score: 0,
                    issues: Vec::new(),
                    summary: "Review completed (response parsing issue, code accepted).".into(),
                });

            if review.passed || attempt >= MAX_REVIEW_ATTEMPTS {
                state.phase = Phase::Completed;
                let mut message = if review.passed {
                    format!(
                        "**Code review passed** (score: {}/10)\n\n{}",
                        review.overall_score, review.summary
                    )
                } else {
                    format!(
                        "Code accepted after {MAX_REVIEW_ATTEMPTS} review attempts.\n\n{}",
                        review.summary
                    )
                };
                let advisory: Vec<&ReviewIssue> = review
                    .issues
                    .iter()
                    .filter(|i| i.severity != "critical")
                    .collect();
                if !advisory.is_empty() {
                    message.push_str("\n\nSuggestions:\n");
                    for issue in advisory {
                        message.push_str(&format!(
                            "- [{}] {}\n",
                            issue.severity, issue.description
                        ));
                    }
                }
                message.push_str("\nThe code is ready for download and deployment.");
                state.push_assistant(message);
                return Ok(Next::Halt);
            }

            // Build feedback and regenerate.
            let mut feedback = format!(
                "Review failed (score: {}/10). Issues found:\n",
                review.overall_score
            );
            for issue in &review.issues {
                feedback.push_str(&format!(
                    "- [{}] [{}] {}\n  Fix: {}\n",
                    issue.severity, issue.file, issue.description, issue.suggestion
                ));
            }
            tracing::info!(session = %state.session_id, attempt, "review failed, regenerating");
            self.regenerate(state, &feedback).await?;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tfgen_llm::ScriptedClient;

    fn state_with_code() -> WorkflowState {
        let mut state = WorkflowState::new("s1");
        state.generated_code.insert(
            "main.tf".to_string(),
            "resource \"aws_vpc\" \"main\" {\n  cidr_block = \"10.0.0.0/16\"\n}\n".to_string(),
        );
        state
    }

    #[tokio::test]
    async fn test_passing_review_completes() {
        let reply = json!({"passed": true, "overall_score": 9, "issues": [], "summary": "Looks good."})
            .to_string();
        let stage = CodeReviewerStage::new(Arc::new(ScriptedClient::new([reply])));
        let mut state = state_with_code();

        let next = stage.run(&mut state).await.unwrap();
        assert_eq!(next, Next::Halt);
        assert_eq!(state.phase, Phase::Completed);
        assert!(state.last_assistant_message().unwrap().contains("review passed"));
    }

    #[tokio::test]
    async fn test_failed_review_regenerates_then_passes() {
        let fail = json!({
            "passed": false, "overall_score": 4,
            "issues": [{"severity": "critical", "file": "main.tf",
                        "description": "wrong cidr", "suggestion": "use 10.1.0.0/16"}],
            "summary": "Needs work."
        })
        .to_string();
        let fixed = "Here you go:\n```main.tf\nresource \"aws_vpc\" \"main\" {\n  cidr_block = \"10.1.0.0/16\"\n}\n```";
        let pass = json!({"passed": true, "overall_score": 8, "issues": [], "summary": "Fixed."})
            .to_string();

        let stage = CodeReviewerStage::new(Arc::new(ScriptedClient::new([
            fail,
            fixed.to_string(),
            pass,
        ])));
        let mut state = state_with_code();

        let next = stage.run(&mut state).await.unwrap();
        assert_eq!(next, Next::Halt);
        assert_eq!(state.phase, Phase::Completed);
        assert!(state.generated_code["main.tf"].contains("10.1.0.0/16"));
    }

    #[tokio::test]
    async fn test_unparseable_review_accepts_code() {
        let stage = CodeReviewerStage::new(Arc::new(ScriptedClient::new(["not json at all"])));
        let mut state = state_with_code();

        let next = stage.run(&mut state).await.unwrap();
        assert_eq!(next, Next::Halt);
        assert_eq!(state.phase, Phase::Completed);
    }

    #[tokio::test]
    async fn test_reviewer_outage_accepts_code() {
        // Empty script: first chat call errors.
        let stage = CodeReviewerStage::new(Arc::new(ScriptedClient::default()));
        let mut state = state_with_code();

        let next = stage.run(&mut state).await.unwrap();
        assert_eq!(next, Next::Halt);
        assert_eq!(state.phase, Phase::Completed);
        assert!(!state.generated_code.is_empty());
    }

    #[tokio::test]
    async fn test_persistent_failure_accepts_after_attempt_limit() {
        let fail = json!({
            "passed": false, "overall_score": 3,
            "issues": [{"severity": "critical", "file": "main.tf",
                        "description": "bad", "suggestion": "fix"}],
            "summary": "Still bad."
        })
        .to_string();
        // fail -> fix(no blocks) -> fail -> fix(no blocks) -> fail(attempt 3, accept)
        let stage = CodeReviewerStage::new(Arc::new(ScriptedClient::new([
            fail.clone(),
            "no code here".to_string(),
            fail.clone(),
            "still no code".to_string(),
            fail,
        ])));
        let mut state = state_with_code();

        let next = stage.run(&mut state).await.unwrap();
        assert_eq!(next, Next::Halt);
        assert_eq!(state.phase, Phase::Completed);
        assert!(state
            .last_assistant_message()
            .unwrap()
            .contains("after 3 review attempts"));
    }
}
