use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolArgs,
        ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionObjectArgs,
    },
    Client,
};
use anyhow::{bail, Context, Result};
use async_recursion::async_recursion;
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::AgentSettings;
use crate::pipeline::{render_instruction, AgentSpec};
use crate::runtime::{AgentEvent, AgentRuntime, EventStream};

type EventSink = mpsc::UnboundedSender<Result<AgentEvent>>;

// Aborts the pipeline task once its event stream is dropped, so a caller
// that stops listening (timeout, disconnect) also stops the model calls.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// Per-invocation state. Output keys land here so later agents can read them.
#[derive(Debug, Default)]
struct Session {
    state: HashMap<String, String>,
}

/// Runs an agent pipeline against the OpenAI chat completions API. Sub-agents
/// are exposed to their parent as function tools and executed recursively.
#[derive(Clone)]
pub struct OpenAiRuntime {
    client: Client<OpenAIConfig>,
    model: String,
    max_turns: usize,
}

impl OpenAiRuntime {
    pub fn new(settings: &AgentSettings) -> Self {
        let mut config =
            OpenAIConfig::new().with_api_key(settings.api_key.clone().unwrap_or_default());
        if let Some(base) = &settings.base_url {
            config = config.with_api_base(base);
        }
        let client = Client::with_config(config);

        info!("Agent runtime ready. Model: {}", settings.model);
        Self {
            client,
            model: settings.model.clone(),
            max_turns: settings.max_turns,
        }
    }

    /// Startup connectivity check.
    pub async fn say_hello(&self) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content("Hello! Reply with 'System Online'.")
                    .build()?,
            )])
            .build()?;

        let response = self.client.chat().create(request).await?;
        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(reply)
    }

    // Runs one agent to completion and returns its final text. Only the root
    // gets a sink; sub-agent chatter stays internal and surfaces as the tool
    // result its parent sees.
    #[async_recursion]
    async fn run_agent(
        &self,
        agent: &AgentSpec,
        input: &str,
        session: &mut Session,
        sink: Option<EventSink>,
    ) -> Result<String> {
        let model = agent.model.as_deref().unwrap_or(&self.model);
        let tools = agent_tools(agent)?;
        let system = render_instruction(&agent.instruction, &session.state);

        debug!("Running agent '{}' on {} ({} tools)", agent.name, model, tools.len());

        let mut messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(input)
                    .build()?,
            ),
        ];

        for _ in 0..self.max_turns {
            let mut request = CreateChatCompletionRequestArgs::default();
            request.model(model).messages(messages.clone());
            if !tools.is_empty() {
                request.tools(tools.clone());
            }
            let request = request.build()?;

            let response = self
                .client
                .chat()
                .create(request)
                .await
                .with_context(|| format!("Model call for agent '{}' failed", agent.name))?;

            let message = response
                .choices
                .into_iter()
                .next()
                .map(|c| c.message)
                .with_context(|| format!("Model returned no choices for agent '{}'", agent.name))?;

            let text = message.content.filter(|t| !t.trim().is_empty());
            let calls = message.tool_calls.unwrap_or_default();

            if let (Some(sink), Some(text)) = (&sink, &text) {
                let _ = sink.send(Ok(AgentEvent::text(&agent.name, text.clone())));
            }

            if calls.is_empty() {
                let output = text.unwrap_or_default();
                if let Some(key) = &agent.output_key {
                    session.state.insert(key.clone(), output.clone());
                }
                return Ok(output);
            }

            let mut assistant = ChatCompletionRequestAssistantMessageArgs::default();
            assistant.tool_calls(calls.clone());
            if let Some(text) = &text {
                assistant.content(text.clone());
            }
            messages.push(ChatCompletionRequestMessage::Assistant(assistant.build()?));

            for call in calls {
                let arguments: Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                let request_text = arguments["request"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| call.function.arguments.clone());

                if let Some(sink) = &sink {
                    let _ = sink.send(Ok(AgentEvent::tool_call(
                        &agent.name,
                        &call.function.name,
                        arguments.clone(),
                    )));
                }

                let result = match agent.find(&call.function.name) {
                    Some(sub) => {
                        info!("Agent '{}' delegated to '{}'", agent.name, sub.name);
                        self.run_agent(sub, &request_text, session, None).await?
                    }
                    None => format!("Error: no agent named '{}'", call.function.name),
                };

                messages.push(ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(call.id)
                        .content(result)
                        .build()?,
                ));
            }
        }

        bail!(
            "Agent '{}' did not finish within {} turns",
            agent.name,
            self.max_turns
        )
    }
}

impl AgentRuntime for OpenAiRuntime {
    fn invoke(&self, root: Arc<AgentSpec>, input: String) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = self.clone();

        let task = tokio::spawn(async move {
            let mut session = Session::default();
            if let Err(e) = runtime.run_agent(&root, &input, &mut session, Some(tx.clone())).await {
                let _ = tx.send(Err(e));
            }
        });

        stream::unfold((rx, AbortOnDrop(task)), |(mut rx, guard)| async move {
            rx.recv().await.map(|item| (item, (rx, guard)))
        })
        .boxed()
    }
}

// Sub-agents -> function tools taking a single `request` string
fn agent_tools(agent: &AgentSpec) -> Result<Vec<ChatCompletionTool>> {
    agent
        .sub_agents
        .iter()
        .map(|sub| {
            let description = if sub.description.is_empty() {
                format!("Delegate a request to the '{}' agent.", sub.name)
            } else {
                sub.description.clone()
            };

            let function = FunctionObjectArgs::default()
                .name(&sub.name)
                .description(description)
                .parameters(json!({
                    "type": "object",
                    "properties": {
                        "request": {
                            "type": "string",
                            "description": "What the agent should work on."
                        }
                    },
                    "required": ["request"]
                }))
                .build()?;

            let tool = ChatCompletionToolArgs::default()
                .r#type(ChatCompletionToolType::Function)
                .function(function)
                .build()?;
            Ok(tool)
        })
        .collect()
}
