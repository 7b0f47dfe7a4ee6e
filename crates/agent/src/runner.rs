//! Run entry point: credential resolution, conversation seeding, one loop run.

use std::sync::Arc;

use ssalmuk_config::AppConfig;
use ssalmuk_core::event::EventBus;
use ssalmuk_core::history::HistoryTurn;
use ssalmuk_core::message::Conversation;
use ssalmuk_core::provider::Provider;
use ssalmuk_core::tool::ToolRegistry;
use ssalmuk_core::{Error, Result};
use tracing::info;

use crate::context::{ContextOptions, TreeOptions};
use crate::loop_runner::{AgentLoop, DEFAULT_MAX_TURNS};
use crate::persona::DEFAULT_PERSONA;
use crate::state::AgentRunState;

/// Builds a backend for a resolved credential.
pub type ProviderFactory = Arc<dyn Fn(&str) -> Arc<dyn Provider> + Send + Sync>;

/// One user message to answer.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Blank means no workspace; the model then answers without tools.
    pub workspace_root: String,
    pub user_message: String,
    /// Overrides the runner's default credential when non-blank.
    pub api_key: Option<String>,
    /// Prior exchanges, oldest first.
    pub history: Vec<HistoryTurn>,
}

impl RunRequest {
    pub fn new(workspace_root: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            user_message: user_message.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub text: String,
    /// Model-phase cycles used
    pub turns: u32,
    pub conversation: Conversation,
}

/// Long-lived front door: holds configuration, builds a loop per run.
pub struct AgentRunner {
    provider_factory: ProviderFactory,
    default_api_key: Option<String>,
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    model: String,
    temperature: Option<f32>,
    max_turns: u32,
    persona: String,
    context_options: ContextOptions,
}

impl AgentRunner {
    pub fn new(
        provider_factory: ProviderFactory,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider_factory,
            default_api_key: None,
            tools,
            event_bus,
            model: model.into(),
            temperature: None,
            max_turns: DEFAULT_MAX_TURNS,
            persona: DEFAULT_PERSONA.into(),
            context_options: ContextOptions::default(),
        }
    }

    /// Wire the Gemini backend, the builtin tools and every tunable from `config`.
    pub fn from_config(config: &AppConfig, event_bus: Arc<EventBus>) -> Self {
        let provider_config = config.clone();
        let factory: ProviderFactory =
            Arc::new(move |key: &str| ssalmuk_providers::from_config(&provider_config, key));
        let tools = Arc::new(ssalmuk_tools::registry_with_timeout(
            config.tools.command_timeout_ms,
        ));

        let context_options = ContextOptions {
            max_files: config.context.max_files,
            max_chars_per_file: config.context.max_chars_per_file,
            max_total_chars: config.context.max_total_chars,
            tree: TreeOptions {
                max_depth: config.context.tree_max_depth,
                ..TreeOptions::default()
            },
        };

        let mut runner = Self::new(factory, tools, event_bus, config.model.clone())
            .with_default_api_key(config.api_key.clone())
            .with_temperature(config.temperature)
            .with_max_turns(config.agent.max_turns)
            .with_context_options(context_options);
        if let Some(persona) = &config.agent.system_prompt_override {
            runner = runner.with_persona(persona.clone());
        }
        runner
    }

    /// Always hand out the same backend regardless of credential.
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider_factory = Arc::new(move |_: &str| provider.clone());
        self
    }

    pub fn with_default_api_key(mut self, key: Option<String>) -> Self {
        self.default_api_key = key;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = max;
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_context_options(mut self, options: ContextOptions) -> Self {
        self.context_options = options;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Explicit credential wins over the default; blanks count as absent.
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Result<String> {
        [explicit, self.default_api_key.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|key| !key.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::AuthRequired(
                    "no API key configured; set one with `ssalmuk config set-key` or GEMINI_API_KEY"
                        .into(),
                )
            })
    }

    /// Answer one message. Fails before any backend call or event when no
    /// credential is available.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        let api_key = self.resolve_api_key(request.api_key.as_deref())?;
        let provider = (self.provider_factory)(&api_key);

        let agent = AgentLoop::new(
            provider,
            self.model.clone(),
            self.tools.clone(),
            self.event_bus.clone(),
        )
        .with_temperature(self.temperature)
        .with_max_turns(self.max_turns)
        .with_persona(self.persona.clone())
        .with_context_options(self.context_options.clone());

        let mut state = AgentRunState::new(
            request.workspace_root,
            &request.history,
            request.user_message,
        );
        info!(
            model = %self.model,
            history = request.history.len(),
            has_workspace = state.has_workspace(),
            "Running agent"
        );

        let text = agent.run(&mut state).await?;
        Ok(RunOutcome {
            text,
            turns: state.turn_count,
            conversation: state.conversation,
        })
    }
}
