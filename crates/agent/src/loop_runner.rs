//! The agent loop: a two-phase state machine over an append-only turn log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ssalmuk_core::error::ToolError;
use ssalmuk_core::event::{AgentEvent, EventBus, Phase};
use ssalmuk_core::message::{ToolResultEntry, Turn};
use ssalmuk_core::provider::{Provider, ProviderRequest, ToolDefinition};
use ssalmuk_core::tool::{ToolOutput, ToolRegistry};
use ssalmuk_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::context::{ContextOptions, build_project_context};
use crate::persona::{DEFAULT_PERSONA, grounding_instruction};
use crate::state::{AgentRunState, LoopState};

/// Default cap on model-phase cycles per run.
pub const DEFAULT_MAX_TURNS: u32 = 20;

/// Returned when neither the last response nor any earlier one had text.
pub const NO_FINAL_RESPONSE: &str = "(No final response.)";

/// Orchestrates model calls and tool execution for one run at a time.
pub struct AgentLoop {
    /// The model backend
    provider: Arc<dyn Provider>,

    /// The model to request
    model: String,

    /// Sampling temperature; backend default when unset
    temperature: Option<f32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Observability sink
    event_bus: Arc<EventBus>,

    /// Persona instruction prepended to every call
    persona: String,

    /// Maximum model-phase cycles per run
    max_turns: u32,

    /// Caps for the workspace context
    context_options: ContextOptions,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
            tools,
            event_bus,
            persona: DEFAULT_PERSONA.into(),
            max_turns: DEFAULT_MAX_TURNS,
            context_options: ContextOptions::default(),
        }
    }

    /// Set the maximum number of model-phase cycles.
    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = max;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Replace the built-in persona.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_context_options(mut self, options: ContextOptions) -> Self {
        self.context_options = options;
        self
    }

    /// Drive `state` from `Model` to `Done` and return the final text.
    ///
    /// Only backend failures abort; tool failures are fed back to the model.
    pub async fn run(&self, state: &mut AgentRunState) -> Result<String> {
        info!(
            conversation_id = %state.conversation.id,
            turns = state.conversation.len(),
            workspace = %state.workspace_root(),
            "Starting agent run"
        );

        let definitions = self.tools.definitions();
        let mut current = LoopState::Model;

        while current != LoopState::Done {
            current = match current {
                LoopState::Model => {
                    self.in_phase(Phase::Model, self.model_phase(state, &definitions))
                        .await?
                }
                LoopState::Tools => self.in_phase(Phase::Tools, self.tools_phase(state)).await?,
                LoopState::Done => LoopState::Done,
            };
        }

        info!(
            conversation_id = %state.conversation.id,
            turn_count = state.turn_count,
            "Agent run finished"
        );
        Ok(state.final_text.clone())
    }

    /// Bracket a phase with entered/exited events, including on failure.
    async fn in_phase<F>(&self, phase: Phase, work: F) -> Result<LoopState>
    where
        F: std::future::Future<Output = Result<LoopState>>,
    {
        self.event_bus.publish(AgentEvent::phase_entered(phase));
        let outcome = work.await;
        self.event_bus.publish(AgentEvent::phase_exited(phase));
        outcome
    }

    async fn model_phase(
        &self,
        state: &mut AgentRunState,
        definitions: &[ToolDefinition],
    ) -> Result<LoopState> {
        state.turn_count += 1;
        debug!(turn = state.turn_count, "Model phase");

        let request = ProviderRequest {
            model: self.model.clone(),
            turns: state.conversation.turns().to_vec(),
            tools: definitions.to_vec(),
            system_instruction: self.system_instruction(state.workspace_root()).await?,
            temperature: self.temperature,
        };

        let response = self.provider.complete(request).await?;

        if response.has_tool_calls() && state.turn_count <= self.max_turns {
            debug!(tool_count = response.tool_calls.len(), "Model requested tools");
            if !response.text.is_empty() {
                state.final_text = response.text;
            }
            state
                .conversation
                .push_tool_request(response.tool_calls.clone(), response.raw_parts)?;
            state.pending = response.tool_calls;
            return Ok(LoopState::Tools);
        }

        if response.has_tool_calls() {
            warn!(
                turn = state.turn_count,
                max_turns = self.max_turns,
                dropped = response.tool_calls.len(),
                "Turn limit reached, finishing with available text"
            );
        }

        let text = if !response.text.is_empty() {
            response.text
        } else if !state.final_text.is_empty() {
            std::mem::take(&mut state.final_text)
        } else {
            NO_FINAL_RESPONSE.to_string()
        };
        state.conversation.push_text(Turn::model(&text))?;
        state.final_text = text;
        Ok(LoopState::Done)
    }

    async fn tools_phase(&self, state: &mut AgentRunState) -> Result<LoopState> {
        let calls = std::mem::take(&mut state.pending);
        let root = state.workspace_root().trim();
        let workspace = (!root.is_empty()).then(|| Path::new(root));

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            self.event_bus
                .publish(AgentEvent::tool_invoked(&call.name, call.arguments.clone()));

            let output = match workspace {
                Some(dir) => self.tools.dispatch(dir, &call).await,
                None => ToolOutput::from(ToolError::WorkspaceNotSet),
            };
            debug!(tool = %call.name, is_error = output.is_error(), "Tool result");

            results.push(ToolResultEntry {
                id: call.id,
                name: call.name,
                output,
            });
        }

        state.conversation.push_tool_results(results)?;
        Ok(LoopState::Model)
    }

    /// Persona plus workspace grounding, rebuilt each cycle so the model sees
    /// its own writes.
    async fn system_instruction(&self, workspace_root: &str) -> Result<String> {
        let root = workspace_root.trim();
        if root.is_empty() {
            return Ok(grounding_instruction(&self.persona, root, None));
        }

        let dir = PathBuf::from(root);
        let options = self.context_options.clone();
        let context = tokio::task::spawn_blocking(move || build_project_context(&dir, &options))
            .await
            .map_err(|e| Error::Internal(format!("context builder panicked: {e}")))?;
        Ok(grounding_instruction(&self.persona, root, Some(context.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, text_response, tool_response};
    use ssalmuk_core::error::ProviderError;
    use ssalmuk_core::provider::ProviderResponse;
    use ssalmuk_core::tool::ToolCall;
    use std::sync::Arc;

    fn agent(provider: Arc<ScriptedProvider>, bus: Arc<EventBus>) -> AgentLoop {
        AgentLoop::new(
            provider,
            "scripted-model",
            Arc::new(ssalmuk_tools::default_registry()),
            bus,
        )
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<Arc<AgentEvent>>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event.as_ref().clone());
        }
        events
    }

    fn phase_trace(events: &[AgentEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                AgentEvent::PhaseEntered { phase, .. } => format!("enter:{phase}"),
                AgentEvent::PhaseExited { phase, .. } => format!("exit:{phase}"),
                AgentEvent::ToolInvoked { name, .. } => format!("tool:{name}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn hello_without_workspace_finishes_in_one_cycle() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Hi there!")]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();

        let mut state = AgentRunState::new("", &[], "hello");
        let text = agent(provider.clone(), bus).run(&mut state).await.unwrap();

        assert_eq!(text, "Hi there!");
        assert_eq!(state.turn_count(), 1);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(
            phase_trace(&drain(&mut rx)),
            vec!["enter:model", "exit:model"]
        );

        let request = &provider.requests()[0];
        assert_eq!(request.tools.len(), 3);
        assert!(request.system_instruction.starts_with(DEFAULT_PERSONA));
        assert!(request.system_instruction.contains("has not been set"));
        assert_eq!(state.conversation().last(), Some(&Turn::model("Hi there!")));
    }

    #[tokio::test]
    async fn write_file_then_confirm() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(&[(
                "write_file",
                serde_json::json!({ "path": "a.txt", "content": "hi" }),
            )]),
            text_response("Created a.txt."),
        ]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();

        let mut state = AgentRunState::new(root.clone(), &[], "create file a.txt with content hi");
        let text = agent(provider.clone(), bus).run(&mut state).await.unwrap();

        assert_eq!(text, "Created a.txt.");
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "hi");
        assert_eq!(state.turn_count(), 2);
        assert_eq!(
            phase_trace(&drain(&mut rx)),
            vec![
                "enter:model",
                "exit:model",
                "enter:tools",
                "tool:write_file",
                "exit:tools",
                "enter:model",
                "exit:model"
            ]
        );

        // The second call sees the request and its result, and the fresh tree.
        let second = &provider.requests()[1];
        assert_eq!(second.turns.len(), 3);
        assert!(matches!(second.turns[1], Turn::ModelToolRequest { .. }));
        match &second.turns[2] {
            Turn::ToolResult { results } => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].output, ToolOutput::Written { written: true });
            }
            other => panic!("expected tool result, got {other:?}"),
        }
        assert!(second.system_instruction.contains(&format!("Working directory: {root}")));
        assert!(second.system_instruction.contains("a.txt"));
    }

    #[tokio::test]
    async fn turn_limit_stops_at_cycle_twenty_one() {
        let provider = Arc::new(ScriptedProvider::repeating(tool_response(&[(
            "read_file",
            serde_json::json!({ "path": "missing.txt" }),
        )])));
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::new(1024));
        let mut rx = bus.subscribe();

        let mut state = AgentRunState::new(dir.path().to_string_lossy(), &[], "loop forever");
        let text = agent(provider.clone(), bus).run(&mut state).await.unwrap();

        assert_eq!(provider.call_count(), 21);
        assert_eq!(state.turn_count(), 21);
        assert_eq!(text, NO_FINAL_RESPONSE);

        let tool_events = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, AgentEvent::ToolInvoked { .. }))
            .count();
        assert_eq!(tool_events, 20);
    }

    #[tokio::test]
    async fn custom_turn_limit() {
        let provider = Arc::new(ScriptedProvider::repeating(tool_response(&[(
            "run_command",
            serde_json::json!({ "command": "true" }),
        )])));
        let mut state = AgentRunState::new("", &[], "go");
        agent(provider.clone(), Arc::new(EventBus::default()))
            .with_max_turns(2)
            .run(&mut state)
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn results_preserve_request_order_and_count() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), "1").unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(&[
                ("read_file", serde_json::json!({ "path": "one.txt" })),
                ("no_such_tool", serde_json::json!({})),
                ("read_file", serde_json::json!({ "path": "../outside.txt" })),
            ]),
            text_response("done"),
        ]));

        let mut state = AgentRunState::new(dir.path().to_string_lossy(), &[], "read");
        agent(provider.clone(), Arc::new(EventBus::default()))
            .run(&mut state)
            .await
            .unwrap();

        let turns = state.conversation().turns();
        let Turn::ModelToolRequest { calls, .. } = &turns[1] else {
            panic!("expected tool request");
        };
        let Turn::ToolResult { results } = &turns[2] else {
            panic!("expected tool result");
        };
        assert_eq!(calls.len(), results.len());
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["read_file", "no_such_tool", "read_file"]);
        assert_eq!(results[0].output, ToolOutput::Content { content: "1".into() });
        assert_eq!(results[1].output, ToolOutput::error("Unknown tool: no_such_tool"));
        assert!(results[2].output.is_error());
    }

    #[tokio::test]
    async fn blank_workspace_short_circuits_every_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(&[
                ("write_file", serde_json::json!({ "path": "x.txt", "content": "x" })),
                ("run_command", serde_json::json!({ "command": "echo hi" })),
            ]),
            text_response("I need a workspace."),
        ]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();

        let mut state = AgentRunState::new("   ", &[], "do it");
        agent(provider.clone(), bus).run(&mut state).await.unwrap();

        let Turn::ToolResult { results } = &state.conversation().turns()[2] else {
            panic!("expected tool result");
        };
        for result in results {
            assert_eq!(result.output, ToolOutput::error("workspace root not set"));
        }
        let invoked = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, AgentEvent::ToolInvoked { .. }))
            .count();
        assert_eq!(invoked, 2);
    }

    #[tokio::test]
    async fn text_beside_tool_calls_is_the_fallback_answer() {
        let mut with_text = tool_response(&[("read_file", serde_json::json!({ "path": "a" }))]);
        with_text.text = "Checking the file first.".into();
        let provider = Arc::new(ScriptedProvider::new(vec![with_text, ProviderResponse::default()]));

        let mut state = AgentRunState::new("", &[], "q");
        let text = agent(provider, Arc::new(EventBus::default()))
            .run(&mut state)
            .await
            .unwrap();
        assert_eq!(text, "Checking the file first.");
    }

    #[tokio::test]
    async fn empty_answer_falls_back_to_literal() {
        let provider = Arc::new(ScriptedProvider::new(vec![ProviderResponse::default()]));
        let mut state = AgentRunState::new("", &[], "q");
        let text = agent(provider, Arc::new(EventBus::default()))
            .run(&mut state)
            .await
            .unwrap();
        assert_eq!(text, NO_FINAL_RESPONSE);
    }

    #[tokio::test]
    async fn backend_failure_aborts_but_closes_phase() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::Network(
            "connection reset".into(),
        )));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();

        let mut state = AgentRunState::new("", &[], "q");
        let err = agent(provider, bus).run(&mut state).await.unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::Network(_))));
        assert_eq!(
            phase_trace(&drain(&mut rx)),
            vec!["enter:model", "exit:model"]
        );
    }

    #[tokio::test]
    async fn history_is_sent_before_the_new_message() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("ok")]));
        let history = vec![
            ssalmuk_core::HistoryTurn::user("earlier"),
            ssalmuk_core::HistoryTurn::assistant("reply"),
        ];
        let mut state = AgentRunState::new("", &history, "now");
        agent(provider.clone(), Arc::new(EventBus::default()))
            .run(&mut state)
            .await
            .unwrap();

        let turns = &provider.requests()[0].turns;
        assert_eq!(
            turns,
            &vec![Turn::user("earlier"), Turn::model("reply"), Turn::user("now")]
        );
    }

    #[tokio::test]
    async fn tool_call_ids_are_echoed() {
        let mut call = ToolCall::new("read_file", serde_json::json!({ "path": "nope" }));
        call.id = Some("call-7".into());
        let provider = Arc::new(ScriptedProvider::new(vec![
            ProviderResponse::tool_calls(vec![call]),
            text_response("done"),
        ]));
        let dir = tempfile::tempdir().unwrap();
        let mut state = AgentRunState::new(dir.path().to_string_lossy(), &[], "q");
        agent(provider, Arc::new(EventBus::default()))
            .run(&mut state)
            .await
            .unwrap();

        let Turn::ToolResult { results } = &state.conversation().turns()[2] else {
            panic!("expected tool result");
        };
        assert_eq!(results[0].id.as_deref(), Some("call-7"));
    }
}
