//! The run coordinator: one tool-calling loop per run.
//!
//! `start` is non-blocking; the spawned task drives the loop and the
//! returned handle is awaited by exactly one caller. Cancellation is
//! checked before every model call and before launching a turn's tool
//! batch; the model call itself is raced against the token. Terminal
//! effects (usage counters, `complete`/`cancelled`/`error` events, the
//! interruption marker) apply only while the run's generation is still
//! the session's current one.

use std::sync::Arc;
use std::time::Duration;

use strand_core::events::SessionEvent;
use strand_core::ids::RunId;
use strand_core::messages::{Message, TokenUsage, ToolCall, ToolResult};
use strand_core::tools::ToolDefinition;
use strand_llm::{send_with_retry, Provider, ProviderError, ProviderResponse, RetryConfig, SendOptions};
use strand_tools::{ToolContext, ToolRegistry};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::history::MessageStore;
use crate::hub::StreamHub;
use crate::permission::{PermissionChecker, PermissionDecision};
use crate::session::SessionEntry;
use crate::types::RunOutcome;

/// Synthetic history entry appended when a run is interrupted.
pub const INTERRUPTION_MARKER: &str = "[request interrupted by user]";

/// Default turn limit per run.
pub const DEFAULT_MAX_TURNS: u32 = 25;
/// Default wall-clock ceiling for one model call, in ms.
pub const DEFAULT_MODEL_TIMEOUT_MS: u64 = 120_000;
/// Default per-tool-call ceiling for tools that declare none, in ms.
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 60_000;

/// Knobs for the run loop.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// System prompt sent on every model call.
    pub system_prompt: String,
    /// Working directory handed to tools.
    pub working_directory: String,
    /// Turn limit per run.
    pub max_turns: u32,
    /// Wall-clock ceiling for one model call attempt, in ms.
    pub model_timeout_ms: u64,
    /// Ceiling for tool calls that declare no timeout, in ms.
    pub tool_timeout_ms: u64,
    /// Per-send options forwarded to the provider.
    pub send_options: SendOptions,
    /// Backoff policy for retryable provider errors.
    pub retry: RetryConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            working_directory: ".".to_owned(),
            max_turns: DEFAULT_MAX_TURNS,
            model_timeout_ms: DEFAULT_MODEL_TIMEOUT_MS,
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
            send_options: SendOptions::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Handle to a running run. Awaited by exactly one caller.
pub struct RunHandle {
    /// Run ID.
    pub run_id: RunId,
    /// Generation the run started under.
    pub generation: u64,
    /// Cancels this run.
    pub cancel: CancellationToken,
    result: oneshot::Receiver<RunOutcome>,
}

impl RunHandle {
    /// Wait for the terminal result.
    pub async fn outcome(self) -> RunOutcome {
        self.result.await.unwrap_or(RunOutcome::Failed {
            error: "run task dropped".into(),
        })
    }
}

/// Drives runs: model calls, tool batches, terminal events.
pub struct RunCoordinator {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn MessageStore>,
    permissions: Arc<dyn PermissionChecker>,
    hub: Arc<StreamHub>,
    config: RunConfig,
}

impl RunCoordinator {
    /// Assemble a coordinator from its collaborators.
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn MessageStore>,
        permissions: Arc<dyn PermissionChecker>,
        hub: Arc<StreamHub>,
        config: RunConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            store,
            permissions,
            hub,
            config,
        }
    }

    /// The provider behind this coordinator.
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// The message store behind this coordinator.
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Start a run under an already-claimed generation. Non-blocking.
    #[instrument(skip_all, fields(session_id = %entry.id, generation))]
    pub fn start(
        self: &Arc<Self>,
        entry: Arc<SessionEntry>,
        generation: u64,
        cancel: CancellationToken,
        content: String,
    ) -> RunHandle {
        let run_id = RunId::new();
        let (result_tx, result_rx) = oneshot::channel();

        let coordinator = self.clone();
        let task_cancel = cancel.clone();
        let task_run_id = run_id.clone();
        let _ = tokio::spawn(async move {
            let (outcome, usage) = coordinator
                .execute(&entry, &task_run_id, &task_cancel, content)
                .await;
            coordinator
                .finish(&entry, generation, outcome, usage, result_tx)
                .await;
        });

        RunHandle {
            run_id,
            generation,
            cancel,
            result: result_rx,
        }
    }

    /// Apply terminal effects under the generation guard, then deliver
    /// the outcome.
    async fn finish(
        &self,
        entry: &SessionEntry,
        generation: u64,
        outcome: RunOutcome,
        usage: TokenUsage,
        result_tx: oneshot::Sender<RunOutcome>,
    ) {
        if entry.is_current(generation) {
            entry.add_usage(usage);
            match &outcome {
                RunOutcome::Completed {
                    message_id,
                    content,
                    ..
                } => {
                    self.hub.publish(
                        &entry.id,
                        &SessionEvent::Complete {
                            message_id: message_id.clone(),
                            content: content.clone(),
                        },
                    );
                }
                RunOutcome::Cancelled => {
                    let marker = Message::user(entry.id.clone(), INTERRUPTION_MARKER);
                    if let Err(e) = self.store.append(marker).await {
                        warn!(session_id = %entry.id, error = %e, "failed to append interruption marker");
                    }
                    self.hub.publish(&entry.id, &SessionEvent::Cancelled);
                }
                RunOutcome::Failed { error } => {
                    self.hub.publish(
                        &entry.id,
                        &SessionEvent::Error {
                            message: error.clone(),
                        },
                    );
                }
            }
        } else {
            debug!(
                session_id = %entry.id,
                generation,
                current = entry.current_generation(),
                "stale run completion discarded"
            );
        }
        let _ = result_tx.send(outcome);
    }

    async fn execute(
        &self,
        entry: &SessionEntry,
        run_id: &RunId,
        cancel: &CancellationToken,
        content: String,
    ) -> (RunOutcome, TokenUsage) {
        let session_id = entry.id.clone();
        let mut usage = TokenUsage::default();

        if let Err(e) = self
            .store
            .append(Message::user(session_id.clone(), content))
            .await
        {
            return (RunOutcome::Failed { error: e.to_string() }, usage);
        }

        let definitions = self.tools.definitions();
        let mut turns = 0u32;

        loop {
            if cancel.is_cancelled() {
                return (RunOutcome::Cancelled, usage);
            }
            if turns >= self.config.max_turns {
                warn!(session_id = %session_id, run_id = %run_id, turns, "turn limit reached");
                return (
                    RunOutcome::Failed {
                        error: format!("max turns ({}) exceeded", self.config.max_turns),
                    },
                    usage,
                );
            }

            let messages = match self.store.list(&session_id).await {
                Ok(messages) => messages,
                Err(e) => return (RunOutcome::Failed { error: e.to_string() }, usage),
            };

            let response = match self.call_model(&messages, &definitions, cancel).await {
                Ok(response) => response,
                Err(ProviderError::Cancelled) => return (RunOutcome::Cancelled, usage),
                Err(e) => {
                    warn!(session_id = %session_id, run_id = %run_id, error = %e, "model call failed");
                    return (RunOutcome::Failed { error: e.to_string() }, usage);
                }
            };
            usage.add(response.usage);

            if !response.wants_tools() {
                let message =
                    Message::assistant(session_id.clone(), response.content.clone(), Vec::new());
                let message_id = message.id.clone();
                if let Err(e) = self.store.append(message).await {
                    return (RunOutcome::Failed { error: e.to_string() }, usage);
                }
                return (
                    RunOutcome::Completed {
                        message_id,
                        content: response.content,
                        usage,
                    },
                    usage,
                );
            }

            let assistant = Message::assistant(
                session_id.clone(),
                response.content.clone(),
                response.tool_calls.clone(),
            );
            if let Err(e) = self.store.append(assistant).await {
                return (RunOutcome::Failed { error: e.to_string() }, usage);
            }

            for call in &response.tool_calls {
                self.hub.publish(
                    &session_id,
                    &SessionEvent::tool_pending(call.id.clone(), &call.name, call.arguments.clone()),
                );
            }

            // Tools already launched get awaited on cancel; a batch
            // not yet launched does not start
            if cancel.is_cancelled() {
                return (RunOutcome::Cancelled, usage);
            }

            let results = self
                .execute_tool_batch(entry, &response.tool_calls, cancel)
                .await;
            if let Err(e) = self
                .store
                .append(Message::tool_results(session_id.clone(), results))
                .await
            {
                return (RunOutcome::Failed { error: e.to_string() }, usage);
            }

            turns += 1;
        }
    }

    /// One model call: per-attempt timeout, backoff on retryable
    /// errors, raced against the run's token.
    async fn call_model(
        &self,
        messages: &[Message],
        definitions: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse, ProviderError> {
        let timeout = Duration::from_millis(self.config.model_timeout_ms);
        let attempt = || async {
            match tokio::time::timeout(
                timeout,
                self.provider.send(
                    &self.config.system_prompt,
                    messages,
                    definitions,
                    &self.config.send_options,
                ),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    timeout_ms: self.config.model_timeout_ms,
                }),
            }
        };

        tokio::select! {
            result = send_with_retry(attempt, &self.config.retry, cancel) => result,
            () = cancel.cancelled() => Err(ProviderError::Cancelled),
        }
    }

    /// Run every call of the turn concurrently; each produces exactly
    /// one result and a terminal tool event. Individual failures are
    /// results for the model, never run failures.
    async fn execute_tool_batch(
        &self,
        entry: &SessionEntry,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Vec<ToolResult> {
        let futures = calls.iter().map(|call| self.run_one_tool(entry, call, cancel));
        futures::future::join_all(futures).await
    }

    async fn run_one_tool(
        &self,
        entry: &SessionEntry,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let session_id = &entry.id;

        let Some(tool) = self.tools.get(&call.name) else {
            return self.tool_failed(session_id, call, format!("unknown tool: {}", call.name));
        };

        match self
            .permissions
            .check(session_id, &call.name, tool.read_only())
        {
            PermissionDecision::Deny { reason } => {
                return self.tool_failed(session_id, call, reason);
            }
            PermissionDecision::Ask => {
                return self.tool_failed(
                    session_id,
                    call,
                    format!(
                        "tool '{}' requires approval and no approver is attached",
                        call.name
                    ),
                );
            }
            PermissionDecision::Allow => {}
        }

        self.hub.publish(
            session_id,
            &SessionEvent::tool_running(call.id.clone(), &call.name),
        );

        let ctx = ToolContext {
            tool_call_id: call.id.clone(),
            session_id: session_id.clone(),
            working_directory: self.config.working_directory.clone(),
            cancellation: cancel.child_token(),
        };
        let timeout_ms = tool.timeout_ms().unwrap_or(self.config.tool_timeout_ms);

        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tool.execute(call.arguments.clone(), &ctx),
        )
        .await;

        match result {
            Ok(Ok(output)) => {
                self.hub.publish(
                    session_id,
                    &SessionEvent::tool_finished(
                        call.id.clone(),
                        &call.name,
                        &output.content,
                        output.is_error,
                    ),
                );
                ToolResult {
                    tool_call_id: call.id.clone(),
                    content: output.content,
                    is_error: output.is_error,
                }
            }
            Ok(Err(e)) => self.tool_failed(session_id, call, e.to_string()),
            Err(_) => self.tool_failed(
                session_id,
                call,
                format!("tool timed out after {timeout_ms}ms"),
            ),
        }
    }

    fn tool_failed(
        &self,
        session_id: &strand_core::ids::SessionId,
        call: &ToolCall,
        message: String,
    ) -> ToolResult {
        self.hub.publish(
            session_id,
            &SessionEvent::tool_finished(call.id.clone(), &call.name, &message, true),
        );
        ToolResult {
            tool_call_id: call.id.clone(),
            content: message,
            is_error: true,
        }
    }
}

// ─────────────────────────────── Tests ───────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryMessageStore;
    use crate::permission::{AllowAll, StaticPolicy};
    use crate::session::SessionRegistry;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use strand_core::events::ToolStatus;
    use strand_core::ids::ToolCallId;
    use strand_core::messages::Role;
    use strand_core::tools::ToolOutput;
    use strand_llm::{ProviderResult, StopReason};
    use strand_tools::{Tool, ToolError};

    struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResult<ProviderResponse>>>,
        delay: Duration,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResult<ProviderResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        async fn send(
            &self,
            _system: &str,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _options: &SendOptions,
        ) -> ProviderResult<ProviderResponse> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses.lock().pop_front().unwrap_or_else(|| {
                Err(ProviderError::Other {
                    message: "script exhausted".into(),
                })
            })
        }
    }

    fn text_response(content: &str) -> ProviderResult<ProviderResponse> {
        Ok(ProviderResponse {
            content: content.into(),
            tool_calls: Vec::new(),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            stop_reason: StopReason::EndTurn,
        })
    }

    fn tool_response(name: &str, arguments: Value) -> ProviderResult<ProviderResponse> {
        Ok(ProviderResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: ToolCallId::new(),
                name: name.into(),
                arguments,
            }],
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            stop_reason: StopReason::ToolUse,
        })
    }

    struct EchoTool {
        executions: AtomicU32,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                executions: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("echo", "Echo the input back", json!({"type": "object"}))
        }

        async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            let _ = self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput::text(params["text"].as_str().unwrap_or("")))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "broken"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("broken", "Always fails", json!({"type": "object"}))
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            Err(ToolError::Internal {
                message: "disk on fire".into(),
            })
        }
    }

    struct Harness {
        coordinator: Arc<RunCoordinator>,
        registry: Arc<SessionRegistry>,
        hub: Arc<StreamHub>,
        store: Arc<MemoryMessageStore>,
    }

    fn harness_with(
        provider: ScriptedProvider,
        tools: ToolRegistry,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Harness {
        let hub = Arc::new(StreamHub::new());
        let store = Arc::new(MemoryMessageStore::new());
        let coordinator = Arc::new(RunCoordinator::new(
            Arc::new(provider),
            Arc::new(tools),
            store.clone(),
            permissions,
            hub.clone(),
            RunConfig::default(),
        ));
        Harness {
            coordinator,
            registry: Arc::new(SessionRegistry::new()),
            hub,
            store,
        }
    }

    fn harness(provider: ScriptedProvider, tools: ToolRegistry) -> Harness {
        harness_with(provider, tools, Arc::new(AllowAll))
    }

    fn drain(sub: &mut crate::hub::Subscriber) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = sub.try_recv() {
            events.push(event);
        }
        events
    }

    async fn run_to_outcome(h: &Harness, entry: &Arc<SessionEntry>, content: &str) -> RunOutcome {
        let (generation, cancel) = entry.begin_run(RunId::new()).unwrap();
        let handle = h
            .coordinator
            .start(entry.clone(), generation, cancel, content.into());
        let outcome = handle.outcome().await;
        entry.finish_run(generation);
        outcome
    }

    #[tokio::test]
    async fn plain_text_run_completes() {
        let h = harness(
            ScriptedProvider::new(vec![text_response("hello there")]),
            ToolRegistry::new(),
        );
        let entry = h.registry.create();
        let mut sub = h.hub.attach(&entry.id);

        let outcome = run_to_outcome(&h, &entry, "hi").await;

        assert_matches!(&outcome, RunOutcome::Completed { content, .. } if content == "hello there");
        assert_eq!(entry.usage().total(), 15);

        let events = drain(&mut sub);
        assert_eq!(events[0].event_name(), "connected");
        assert_eq!(events[1].event_name(), "complete");

        let transcript = h.store.list(&entry.id).await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn tool_loop_feeds_results_back() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool::new()));
        let h = harness(
            ScriptedProvider::new(vec![
                tool_response("echo", json!({"text": "pong"})),
                text_response("done"),
            ]),
            tools,
        );
        let entry = h.registry.create();
        let mut sub = h.hub.attach(&entry.id);

        let outcome = run_to_outcome(&h, &entry, "ping").await;
        assert!(outcome.is_completed());

        let statuses: Vec<ToolStatus> = drain(&mut sub)
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Tool { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            [ToolStatus::Pending, ToolStatus::Running, ToolStatus::Completed]
        );

        let transcript = h.store.list(&entry.id).await.unwrap();
        // user, assistant (tool call), tool results, final assistant
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[2].role, Role::Tool);
        assert_eq!(transcript[2].tool_results[0].content, "pong");
        assert!(!transcript[2].tool_results[0].is_error);

        // Two model calls, both counted
        assert_eq!(entry.usage().total(), 30);
    }

    struct RendezvousTool {
        barrier: Arc<tokio::sync::Barrier>,
    }

    #[async_trait]
    impl Tool for RendezvousTool {
        fn name(&self) -> &str {
            "pair"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("pair", "Waits for its partner", json!({"type": "object"}))
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            let _ = self.barrier.wait().await;
            Ok(ToolOutput::text("met"))
        }
    }

    #[tokio::test]
    async fn independent_tool_calls_in_one_turn_run_concurrently() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(RendezvousTool {
            barrier: Arc::new(tokio::sync::Barrier::new(2)),
        }));
        let two_calls = Ok(ProviderResponse {
            content: String::new(),
            tool_calls: vec![
                ToolCall {
                    id: ToolCallId::new(),
                    name: "pair".into(),
                    arguments: json!({}),
                },
                ToolCall {
                    id: ToolCallId::new(),
                    name: "pair".into(),
                    arguments: json!({}),
                },
            ],
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            stop_reason: StopReason::ToolUse,
        });
        let h = harness(
            ScriptedProvider::new(vec![two_calls, text_response("done")]),
            tools,
        );
        let entry = h.registry.create();
        let mut sub = h.hub.attach(&entry.id);

        // Each call blocks until the other arrives; completion within
        // the timeout proves the batch ran concurrently
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            run_to_outcome(&h, &entry, "go"),
        )
        .await
        .expect("tool batch deadlocked");
        assert!(outcome.is_completed());

        let statuses: Vec<ToolStatus> = drain(&mut sub)
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Tool { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        let first_completed = statuses
            .iter()
            .position(|s| *s == ToolStatus::Completed)
            .unwrap();
        let running_before = statuses[..first_completed]
            .iter()
            .filter(|s| **s == ToolStatus::Running)
            .count();
        assert_eq!(running_before, 2);
    }

    #[tokio::test]
    async fn tool_error_is_a_result_not_a_run_failure() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FailingTool));
        let h = harness(
            ScriptedProvider::new(vec![
                tool_response("broken", json!({})),
                text_response("recovered"),
            ]),
            tools,
        );
        let entry = h.registry.create();
        let mut sub = h.hub.attach(&entry.id);

        let outcome = run_to_outcome(&h, &entry, "go").await;
        assert!(outcome.is_completed());

        let events = drain(&mut sub);
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Tool { status: ToolStatus::Error, .. }
        )));

        let transcript = h.store.list(&entry.id).await.unwrap();
        assert!(transcript[2].tool_results[0].is_error);
        assert!(transcript[2].tool_results[0].content.contains("disk on fire"));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let h = harness(
            ScriptedProvider::new(vec![
                tool_response("missing", json!({})),
                text_response("ok"),
            ]),
            ToolRegistry::new(),
        );
        let entry = h.registry.create();

        let outcome = run_to_outcome(&h, &entry, "go").await;
        assert!(outcome.is_completed());

        let transcript = h.store.list(&entry.id).await.unwrap();
        assert!(transcript[2].tool_results[0].content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn denied_tool_never_executes() {
        let echo = Arc::new(EchoTool::new());
        let mut tools = ToolRegistry::new();
        tools.register(echo.clone());
        let h = harness_with(
            ScriptedProvider::new(vec![
                tool_response("echo", json!({"text": "x"})),
                text_response("ok"),
            ]),
            tools,
            Arc::new(StaticPolicy::new(vec!["echo".into()], Vec::new())),
        );
        let entry = h.registry.create();
        let mut sub = h.hub.attach(&entry.id);

        let outcome = run_to_outcome(&h, &entry, "go").await;
        assert!(outcome.is_completed());
        assert_eq!(echo.executions.load(Ordering::SeqCst), 0);

        let events = drain(&mut sub);
        // pending then straight to error, never running
        let statuses: Vec<ToolStatus> = events
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Tool { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, [ToolStatus::Pending, ToolStatus::Error]);

        let transcript = h.store.list(&entry.id).await.unwrap();
        assert!(transcript[2].tool_results[0].content.contains("denied by policy"));
    }

    #[tokio::test]
    async fn cancelled_run_emits_one_cancelled_and_marker() {
        let h = harness(
            ScriptedProvider::new(vec![text_response("never delivered")])
                .with_delay(Duration::from_millis(200)),
            ToolRegistry::new(),
        );
        let entry = h.registry.create();
        let mut sub = h.hub.attach(&entry.id);

        let (generation, cancel) = entry.begin_run(RunId::new()).unwrap();
        let handle = h
            .coordinator
            .start(entry.clone(), generation, cancel.clone(), "hi".into());

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let outcome = handle.outcome().await;
        entry.finish_run(generation);
        assert_eq!(outcome, RunOutcome::Cancelled);

        let events = drain(&mut sub);
        let cancelled = events
            .iter()
            .filter(|event| matches!(event, SessionEvent::Cancelled))
            .count();
        assert_eq!(cancelled, 1);
        assert!(!events
            .iter()
            .any(|event| matches!(event, SessionEvent::Complete { .. })));

        let transcript = h.store.list(&entry.id).await.unwrap();
        let last = transcript.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, INTERRUPTION_MARKER);
    }

    #[tokio::test]
    async fn stale_completion_is_discarded() {
        let h = harness(
            ScriptedProvider::new(vec![text_response("late")])
                .with_delay(Duration::from_millis(100)),
            ToolRegistry::new(),
        );
        let entry = h.registry.create();
        let mut sub = h.hub.attach(&entry.id);

        let (generation, cancel) = entry.begin_run(RunId::new()).unwrap();
        let handle = h
            .coordinator
            .start(entry.clone(), generation, cancel, "hi".into());

        tokio::time::sleep(Duration::from_millis(20)).await;
        entry.invalidate();

        let outcome = handle.outcome().await;
        // The run itself finished, but nothing was applied
        assert!(outcome.is_completed());
        assert_eq!(entry.usage().total(), 0);

        let events = drain(&mut sub);
        assert!(events
            .iter()
            .all(|event| event.event_name() == "connected"));
    }

    #[tokio::test]
    async fn terminal_provider_error_fails_the_run() {
        let h = harness(
            ScriptedProvider::new(vec![Err(ProviderError::Auth {
                message: "bad key".into(),
            })]),
            ToolRegistry::new(),
        );
        let entry = h.registry.create();
        let mut sub = h.hub.attach(&entry.id);

        let outcome = run_to_outcome(&h, &entry, "hi").await;
        assert_matches!(&outcome, RunOutcome::Failed { error } if error.contains("bad key"));

        let events = drain(&mut sub);
        assert!(events
            .iter()
            .any(|event| matches!(event, SessionEvent::Error { .. })));
    }

    #[tokio::test]
    async fn turn_limit_fails_the_run() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool::new()));
        let responses: Vec<ProviderResult<ProviderResponse>> = (0..5)
            .map(|_| tool_response("echo", json!({"text": "again"})))
            .collect();
        let hub = Arc::new(StreamHub::new());
        let store = Arc::new(MemoryMessageStore::new());
        let coordinator = Arc::new(RunCoordinator::new(
            Arc::new(ScriptedProvider::new(responses)),
            Arc::new(tools),
            store.clone(),
            Arc::new(AllowAll),
            hub.clone(),
            RunConfig {
                max_turns: 2,
                ..RunConfig::default()
            },
        ));
        let h = Harness {
            coordinator,
            registry: Arc::new(SessionRegistry::new()),
            hub,
            store,
        };
        let entry = h.registry.create();

        let outcome = run_to_outcome(&h, &entry, "loop forever").await;
        assert_matches!(&outcome, RunOutcome::Failed { error } if error.contains("max turns"));
    }
}
