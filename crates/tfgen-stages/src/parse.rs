//! Input parser stage: conversation → resource list.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use tfgen_core::{
    merge_resources, CanonicalResource, InputType, Next, Phase, Role, Stage, StageError,
    StageKind, WorkflowState,
};
use tfgen_llm::{extract_json, ChatClient, ChatTurn};

use crate::prompts::PARSE_SYSTEM_PROMPT;

/// Schema the extractor is instructed to return.
#[derive(Debug, Default, Deserialize)]
struct ParseReply {
    #[serde(default)]
    resources: Vec<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps the message history to a canonical resource list via the LLM, or
/// accepts a spreadsheet seed as-is.
pub struct InputParserStage {
    client: Arc<dyn ChatClient>,
}

impl InputParserStage {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }

    /// A state is a spreadsheet seed when it was tagged as such, or when it
    /// already carries resources on the very first message. Resource
    /// presence alone is NOT enough: a natural-language follow-up turn has
    /// resources too and must re-parse.
    fn is_spreadsheet_seed(state: &WorkflowState) -> bool {
        state.input_type == InputType::Spreadsheet
            || (!state.resources.is_empty() && state.messages.len() <= 1)
    }
}

#[async_trait]
impl Stage for InputParserStage {
    fn kind(&self) -> StageKind {
        StageKind::Parse
    }

    async fn run(&self, state: &mut WorkflowState) -> Result<Next, StageError> {
        state.phase = Phase::Parsing;

        if Self::is_spreadsheet_seed(state) && !state.resources.is_empty() {
            // Spreadsheet rows carry every detail; re-parsing them through
            // the LLM would only lose fidelity.
            state.information_complete = true;
            state.push_assistant(format!(
                "Received {} resource(s) from spreadsheet upload.",
                state.resources.len()
            ));
            return Ok(Next::Jump(StageKind::Comply));
        }

        let mut turns = vec![ChatTurn::system(PARSE_SYSTEM_PROMPT)];
        for message in &state.messages {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            turns.push(ChatTurn {
                role: role.to_string(),
                content: message.content.clone(),
            });
        }

        let reply = self
            .client
            .chat(&turns)
            .await
            .map_err(|e| StageError::Llm(e.to_string()))?;

        let Some(json) = extract_json(&reply) else {
            // Reported, not retried.
            tracing::warn!(session = %state.session_id, "extractor reply was not valid JSON");
            state.push_assistant(
                "I could not map that to cloud resources. Could you rephrase your request, \
                 naming the resources you need (for example: an EC2 instance, an Azure VM)?",
            );
            return Ok(Next::Halt);
        };

        let parsed: ParseReply = serde_json::from_value(json).unwrap_or_default();

        let mut extracted = Vec::new();
        let mut dropped = 0usize;
        for value in &parsed.resources {
            match CanonicalResource::from_value(value) {
                Some(resource) => extracted.push(resource),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::warn!(session = %state.session_id, dropped, "extractor returned unplaceable resources");
        }

        if extracted.is_empty() {
            let message = parsed
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| reply.trim().to_string());
            state.push_assistant(message);
            return Ok(Next::Halt);
        }

        merge_resources(&mut state.resources, extracted);
        Ok(Next::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tfgen_llm::ScriptedClient;

    fn stage_with(replies: Vec<String>) -> InputParserStage {
        InputParserStage::new(Arc::new(ScriptedClient::new(replies)))
    }

    fn text_state(message: &str) -> WorkflowState {
        let mut state = WorkflowState::new("s1");
        state.push_user(message);
        state
    }

    #[tokio::test]
    async fn test_extracts_and_normalizes_resources() {
        let reply = json!({
            "information_complete": false,
            "resources": [{"type": "EC2", "name": "web", "properties": {"Region": "us-east-1"}}]
        })
        .to_string();
        let stage = stage_with(vec![reply]);
        let mut state = text_state("create an ec2 called web in us-east-1");

        let next = stage.run(&mut state).await.unwrap();
        assert_eq!(next, Next::Continue);
        assert_eq!(state.resources.len(), 1);
        assert_eq!(state.resources[0].kind, "aws_ec2");
    }

    #[tokio::test]
    async fn test_spreadsheet_seed_skips_llm() {
        let stage = stage_with(vec![]);
        let mut state = text_state("uploaded");
        state.input_type = InputType::Spreadsheet;
        state
            .resources
            .push(CanonicalResource::new(tfgen_core::Platform::Aws, "aws_s3", "logs"));

        let next = stage.run(&mut state).await.unwrap();
        assert_eq!(next, Next::Jump(StageKind::Comply));
        assert!(state.information_complete);
        assert!(state
            .last_assistant_message()
            .unwrap()
            .contains("spreadsheet upload"));
    }

    #[tokio::test]
    async fn test_follow_up_turn_reparses_despite_resources() {
        let reply = json!({
            "resources": [{"type": "aws_ec2", "name": "web",
                           "properties": {"Tags": {"Project": "X"}}}]
        })
        .to_string();
        let stage = stage_with(vec![reply]);

        let mut state = WorkflowState::new("s1");
        state.push_user("create an ec2 called web");
        state.push_assistant("need more info");
        state
            .resources
            .push(CanonicalResource::new(tfgen_core::Platform::Aws, "aws_ec2", "web"));
        state.push_user("Tags: Project=X");

        let next = stage.run(&mut state).await.unwrap();
        assert_eq!(next, Next::Continue);
        // Merged, not duplicated.
        assert_eq!(state.resources.len(), 1);
        assert_eq!(state.resources[0].tags().get("Project").unwrap(), "X");
    }

    #[tokio::test]
    async fn test_invalid_json_falls_back_to_clarification() {
        let stage = stage_with(vec!["that does not parse".to_string()]);
        let mut state = text_state("gibberish");

        let next = stage.run(&mut state).await.unwrap();
        assert_eq!(next, Next::Halt);
        assert!(state.resources.is_empty());
        assert!(state.last_assistant_message().unwrap().contains("rephrase"));
    }

    #[tokio::test]
    async fn test_no_resources_surfaces_model_message() {
        let reply = json!({
            "resources": [],
            "message": "Which cloud platform would you like to use?"
        })
        .to_string();
        let stage = stage_with(vec![reply]);
        let mut state = text_state("make me something");

        let next = stage.run(&mut state).await.unwrap();
        assert_eq!(next, Next::Halt);
        assert_eq!(
            state.last_assistant_message().unwrap(),
            "Which cloud platform would you like to use?"
        );
    }
}
