//! The orchestrator pipeline: one user message in, one streamed
//! assistant turn out.

use std::sync::Arc;

use cortex_llm::AdapterSource;
use cortex_memory::MemoryExtractor;
use cortex_store::{AgentStore, ConversationStore, StatsDelta, Store};
use cortex_tool::ToolRouter;
use cortex_types::{
    AgentDoc, ChatRequest, Chunk, ChunkStream, LlmAdapter, LlmTriple, MessageDoc, TokenUsage,
    ToolCall,
};
use futures::StreamExt;

use crate::context::ContextBuilder;

/// Main agent orchestration: context build, adapter selection with
/// fallback, streaming fan-out, tool dispatch, durable appends, and
/// background extraction.
///
/// One LLM turn runs per user message by design — tool results are
/// persisted and flow into the next turn's context rather than feeding an
/// auto-continue loop.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    context: Arc<ContextBuilder>,
    llm: Arc<dyn AdapterSource>,
    tools: Option<Arc<ToolRouter>>,
    extractor: Option<Arc<MemoryExtractor>>,
}

impl Orchestrator {
    /// Wire an orchestrator from its collaborators. `tools` and
    /// `extractor` are optional capabilities; without them tool calls and
    /// auto-extraction are skipped.
    pub fn new(
        store: Arc<dyn Store>,
        context: Arc<ContextBuilder>,
        llm: Arc<dyn AdapterSource>,
        tools: Option<Arc<ToolRouter>>,
        extractor: Option<Arc<MemoryExtractor>>,
    ) -> Self {
        Self {
            store,
            context,
            llm,
            tools,
            extractor,
        }
    }

    /// Process a user message, streaming the reply.
    ///
    /// The user message is persisted before the LLM call, so it survives
    /// an LLM failure. Failures surface as a terminal `error` chunk, never
    /// as a stream panic.
    pub fn process_message(
        &self,
        conversation_id: impl Into<String>,
        user_text: impl Into<String>,
    ) -> ChunkStream {
        let conversation_id = conversation_id.into();
        let user_text = user_text.into();
        let store = self.store.clone();
        let context = self.context.clone();
        let llm = self.llm.clone();
        let tools = self.tools.clone();
        let extractor = self.extractor.clone();

        ChunkStream::new(async_stream::stream! {
            // 1. Load conversation.
            let conversation = match store.conversation(&conversation_id).await {
                Ok(Some(conversation)) => conversation,
                Ok(None) => {
                    yield Chunk::error("Conversation not found");
                    return;
                }
                Err(e) => {
                    yield Chunk::error(format!("Store error: {e}"));
                    return;
                }
            };

            // 2. Load agent.
            let agent = match store.agent(&conversation.agent_id).await {
                Ok(Some(agent)) => agent,
                Ok(None) => {
                    yield Chunk::error("Agent not found");
                    return;
                }
                Err(e) => {
                    yield Chunk::error(format!("Store error: {e}"));
                    return;
                }
            };

            // 3. Build the message list (memories + recent turns).
            let messages = match context.build(&conversation_id, &user_text, &agent).await {
                Ok(messages) => messages,
                Err(e) => {
                    yield Chunk::error(format!("Context build failed: {e}"));
                    return;
                }
            };

            // 4. Persist the user turn before the LLM call.
            if let Err(e) = store
                .append_message(&conversation_id, MessageDoc::user(&user_text), StatsDelta::default())
                .await
            {
                yield Chunk::error(format!("Store error: {e}"));
                return;
            }

            // 5. Acquire an adapter: primary first, then the chain.
            let (mut adapter, mut triple, used_fallback) =
                match select_adapter(llm.as_ref(), &agent).await {
                    Ok(selection) => selection,
                    Err(e) => {
                        yield Chunk::error(format!("No LLM available: {e}"));
                        return;
                    }
                };
            let mut fallback_exhausted = used_fallback;
            if used_fallback {
                yield Chunk::text(fallback_notice(&triple));
            }

            // 6. Tool surface, gated by capability and allowlist.
            let tool_specs = match (&tools, agent.capabilities.tools_enabled) {
                (Some(router), true) => router
                    .definitions(Some(&agent.enabled_tools))
                    .iter()
                    .map(|d| d.to_spec())
                    .collect(),
                _ => Vec::new(),
            };

            // 7. Stream the adapter, forwarding chunks. An error before the
            // first text chunk triggers one fallback-chain walk; after text
            // has reached the client there is no retry.
            let mut content = String::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();
            let mut usage = TokenUsage::default();
            let mut text_started = false;

            'attempts: loop {
                let request = ChatRequest::new(messages.clone())
                    .with_tools(tool_specs.clone())
                    .with_temperature(triple.temperature)
                    .with_max_tokens(triple.max_tokens);

                let mut stream = match adapter.stream(request).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        let next = if fallback_exhausted {
                            None
                        } else {
                            fallback_adapter(llm.as_ref(), &agent).await.ok().flatten()
                        };
                        match next {
                            Some((next_adapter, next_triple)) => {
                                tracing::warn!(error = %e, "primary LLM failed, walking fallback chain");
                                fallback_exhausted = true;
                                adapter = next_adapter;
                                triple = next_triple;
                                yield Chunk::text(fallback_notice(&triple));
                                continue 'attempts;
                            }
                            None => {
                                yield Chunk::error(format!("LLM error: {e}"));
                                return;
                            }
                        }
                    }
                };

                let mut retry = false;
                while let Some(chunk) = stream.receiver.next().await {
                    match chunk {
                        Chunk::Text { content: text } => {
                            text_started = true;
                            content.push_str(&text);
                            yield Chunk::Text { content: text };
                        }
                        Chunk::ToolCall { tool_call } => {
                            tool_calls.push(tool_call.clone());
                            yield Chunk::ToolCall { tool_call };
                        }
                        Chunk::Done { usage: turn_usage } => {
                            usage = turn_usage;
                            yield Chunk::Done { usage: turn_usage };
                        }
                        Chunk::Error { error } => {
                            let next = if text_started || fallback_exhausted {
                                None
                            } else {
                                fallback_adapter(llm.as_ref(), &agent).await.ok().flatten()
                            };
                            match next {
                                Some((next_adapter, next_triple)) => {
                                    tracing::warn!(error = %error, "stream failed before first text, walking fallback chain");
                                    fallback_exhausted = true;
                                    adapter = next_adapter;
                                    triple = next_triple;
                                    tool_calls.clear();
                                    retry = true;
                                    yield Chunk::text(fallback_notice(&triple));
                                    break;
                                }
                                None => {
                                    yield Chunk::Error { error };
                                    return;
                                }
                            }
                        }
                    }
                }

                if retry {
                    continue 'attempts;
                }
                break;
            }

            // 8. Persist the assistant turn with usage and tool calls.
            let assistant =
                MessageDoc::assistant(&content, &triple.model, tool_calls.clone(), usage);
            let delta = StatsDelta {
                total_tokens: usage.total(),
                tool_calls: tool_calls.len() as u64,
            };
            if let Err(e) = store.append_message(&conversation_id, assistant, delta).await {
                yield Chunk::error(format!("Store error: {e}"));
                return;
            }

            // 9. Dispatch tool calls sequentially, persisting each result
            // before the next begins.
            if let Some(router) = &tools {
                for tool_call in &tool_calls {
                    let result = router
                        .execute(&tool_call.name, tool_call.arguments.clone(), None)
                        .await;

                    let message = MessageDoc::tool(
                        &tool_call.id,
                        &tool_call.name,
                        result.status.as_str(),
                        result.content_string(),
                    );
                    if let Err(e) = store
                        .append_message(&conversation_id, message, StatsDelta::default())
                        .await
                    {
                        tracing::error!(error = %e, tool = %tool_call.name, "failed to persist tool result");
                    }

                    yield Chunk::text(format!(
                        "\n[Tool {}: {}]\n",
                        tool_call.name,
                        result.status.as_str()
                    ));
                }
            }

            // 10. Background extraction, never blocking stream close.
            if agent.memory_config.auto_extract {
                if let Some(extractor) = extractor {
                    let conversation_id = conversation_id.clone();
                    let adapter = adapter.clone();
                    tokio::spawn(async move {
                        let created = extractor.extract(&conversation_id, adapter).await;
                        if created > 0 {
                            tracing::info!(created, conversation_id = %conversation_id, "extracted memories");
                        }
                    });
                }
            }
        })
    }
}

fn fallback_notice(triple: &LlmTriple) -> String {
    format!(
        "\n[Using fallback LLM: {}/{}]\n\n",
        triple.backend, triple.model
    )
}

/// Try the primary triple, then the chain. Returns the adapter, the
/// triple it came from, and whether a fallback was used.
async fn select_adapter(
    llm: &dyn AdapterSource,
    agent: &AgentDoc,
) -> Result<(Arc<dyn LlmAdapter>, LlmTriple, bool), cortex_llm::ConfigError> {
    let primary_err = match llm.adapter(agent.llm.backend, &agent.llm.model).await {
        Ok(adapter) => return Ok((adapter, agent.llm.clone(), false)),
        Err(e) => e,
    };

    match fallback_adapter(llm, agent).await? {
        Some((adapter, triple)) => Ok((adapter, triple, true)),
        None => Err(primary_err),
    }
}

/// First constructible entry of the fallback chain whose `on_error`
/// condition holds.
async fn fallback_adapter(
    llm: &dyn AdapterSource,
    agent: &AgentDoc,
) -> Result<Option<(Arc<dyn LlmAdapter>, LlmTriple)>, cortex_llm::ConfigError> {
    for entry in &agent.fallback_chain {
        if !entry.conditions.on_error {
            continue;
        }
        match llm.adapter(entry.llm.backend, &entry.llm.model).await {
            Ok(adapter) => return Ok(Some((adapter, entry.llm.clone()))),
            Err(e) => {
                tracing::debug!(error = %e, backend = %entry.llm.backend, "fallback entry not constructible");
            }
        }
    }
    Ok(None)
}
