use futures::StreamExt;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::AgentSettings;
use crate::error::AgentError;
use crate::pipeline::AgentSpec;
use crate::runtime::AgentRuntime;

/// Answer used when the runtime finishes without emitting any text.
pub const NO_TEXT_RESPONSE: &str = "(No text response from agent)";

/// Text fragments are joined in emission order with this separator.
pub const FRAGMENT_SEPARATOR: &str = "\n";

/// Turns one question into one answer. Built once at startup and shared
/// across requests; holds no per-request state.
pub struct AgentAdapter {
    settings: AgentSettings,
    pipeline: Arc<AgentSpec>,
    runtime: Arc<dyn AgentRuntime>,
}

impl AgentAdapter {
    pub fn new(settings: AgentSettings, pipeline: AgentSpec, runtime: Arc<dyn AgentRuntime>) -> Self {
        Self {
            settings,
            pipeline: Arc::new(pipeline),
            runtime,
        }
    }

    /// Root of the pipeline every question is submitted to.
    pub fn pipeline(&self) -> &AgentSpec {
        &self.pipeline
    }

    pub async fn ask(&self, question: &str) -> Result<String, AgentError> {
        if self.settings.api_key.is_none() {
            return Err(AgentError::Configuration(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }
        if question.trim().is_empty() {
            return Err(AgentError::InvalidInput("question is empty".to_string()));
        }

        info!(
            "Submitting question ({} chars) to '{}'",
            question.chars().count(),
            self.pipeline.name
        );

        let collect = self.collect(question);
        let fragments = match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, collect)
                .await
                .map_err(|_| AgentError::Timeout(limit))
                .and_then(|r| r),
            None => collect.await,
        }
        .inspect_err(|e| error!("Agent invocation failed: {}", e))?;

        if fragments.is_empty() {
            info!("Agent produced no text");
            return Ok(NO_TEXT_RESPONSE.to_string());
        }

        Ok(fragments.join(FRAGMENT_SEPARATOR))
    }

    // Drains the event stream, keeping non-empty text in order
    async fn collect(&self, question: &str) -> Result<Vec<String>, AgentError> {
        let mut events = self
            .runtime
            .invoke(Arc::clone(&self.pipeline), question.to_string());

        let mut fragments = Vec::new();
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| AgentError::Execution(format!("{:#}", e)))?;

            if let Some(call) = &event.tool_call {
                info!("'{}' called tool '{}'", event.author, call.name);
            }
            if let Some(text) = event.text.filter(|t| !t.is_empty()) {
                fragments.push(text);
            }
        }
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::runtime::{AgentEvent, EventStream};
    use futures::stream;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    // Replays a fixed script of events and remembers what it was asked.
    #[derive(Default)]
    struct ScriptedRuntime {
        events: Vec<AgentEvent>,
        fail: Option<&'static str>,
        calls: AtomicUsize,
        inputs: Mutex<Vec<(String, String)>>,
    }

    impl AgentRuntime for ScriptedRuntime {
        fn invoke(&self, root: Arc<AgentSpec>, input: String) -> EventStream {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inputs.lock().unwrap().push((root.name.clone(), input));

            let mut items: Vec<anyhow::Result<AgentEvent>> =
                self.events.iter().cloned().map(Ok).collect();
            if let Some(msg) = self.fail {
                items.push(Err(anyhow::anyhow!(msg)));
            }
            stream::iter(items).boxed()
        }
    }

    struct HangingRuntime;

    impl AgentRuntime for HangingRuntime {
        fn invoke(&self, _root: Arc<AgentSpec>, _input: String) -> EventStream {
            stream::pending().boxed()
        }
    }

    fn settings() -> AgentSettings {
        AgentSettings {
            api_key: Some("sk-test".to_string()),
            ..AgentSettings::default()
        }
    }

    fn adapter(runtime: Arc<dyn AgentRuntime>) -> AgentAdapter {
        AgentAdapter::new(settings(), Pipeline::research(), runtime)
    }

    #[tokio::test]
    async fn fragments_join_with_newlines_in_order() {
        let runtime = Arc::new(ScriptedRuntime {
            events: vec![
                AgentEvent::text("coordinator", "A"),
                AgentEvent::tool_call("coordinator", "researcher", json!({"request": "x"})),
                AgentEvent::text("coordinator", "B"),
            ],
            ..Default::default()
        });

        let answer = adapter(runtime).ask("ping").await.unwrap();
        assert_eq!(answer, "A\nB");
    }

    #[tokio::test]
    async fn no_text_yields_sentinel() {
        let runtime = Arc::new(ScriptedRuntime {
            events: vec![AgentEvent::tool_call("coordinator", "researcher", json!({}))],
            ..Default::default()
        });

        let answer = adapter(runtime).ask("ping").await.unwrap();
        assert_eq!(answer, NO_TEXT_RESPONSE);
    }

    #[tokio::test]
    async fn empty_fragments_are_skipped() {
        let runtime = Arc::new(ScriptedRuntime {
            events: vec![AgentEvent::text("coordinator", "")],
            ..Default::default()
        });

        let answer = adapter(runtime).ask("ping").await.unwrap();
        assert_eq!(answer, NO_TEXT_RESPONSE);
    }

    #[tokio::test]
    async fn question_goes_to_the_coordinator() {
        let runtime = Arc::new(ScriptedRuntime::default());
        let adapter = adapter(runtime.clone());
        assert_eq!(adapter.pipeline().name, "coordinator");
        adapter.ask("why is the sky blue?").await.unwrap();

        let inputs = runtime.inputs.lock().unwrap();
        assert_eq!(
            inputs.as_slice(),
            [("coordinator".to_string(), "why is the sky blue?".to_string())]
        );
    }

    #[tokio::test]
    async fn runtime_error_becomes_execution_error() {
        let runtime = Arc::new(ScriptedRuntime {
            events: vec![AgentEvent::text("coordinator", "partial")],
            fail: Some("upstream exploded"),
            ..Default::default()
        });

        let err = adapter(runtime).ask("ping").await.unwrap_err();
        match err {
            AgentError::Execution(detail) => assert!(detail.contains("upstream exploded")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_credential_fails_before_invoking() {
        let runtime = Arc::new(ScriptedRuntime::default());
        let adapter = AgentAdapter::new(AgentSettings::default(), Pipeline::research(), runtime.clone());

        let err = adapter.ask("ping").await.unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let runtime = Arc::new(ScriptedRuntime::default());
        let err = adapter(runtime.clone()).ask("   ").await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn every_question_is_a_fresh_invocation() {
        let runtime = Arc::new(ScriptedRuntime {
            events: vec![AgentEvent::text("coordinator", "same")],
            ..Default::default()
        });
        let adapter = adapter(runtime.clone());

        adapter.ask("ping").await.unwrap();
        adapter.ask("ping").await.unwrap();
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_runtime_times_out() {
        let adapter = AgentAdapter::new(
            AgentSettings {
                timeout: Some(Duration::from_secs(5)),
                ..settings()
            },
            Pipeline::research(),
            Arc::new(HangingRuntime),
        );

        let err = adapter.ask("ping").await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_timeout_keeps_its_precision() {
        let adapter = AgentAdapter::new(
            AgentSettings {
                timeout: Some(Duration::from_millis(250)),
                ..settings()
            },
            Pipeline::research(),
            Arc::new(HangingRuntime),
        );

        let err = adapter.ask("ping").await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_millis(250)));
        assert_eq!(err.to_string(), "Agent execution timed out after 250ms");
    }
}
