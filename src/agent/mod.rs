pub mod providers;

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::AstralConfig;
use crate::context::{AssembledPrompt, ContextAssembler};
use crate::error::{ChatError, ConfigError, ValidationError};
use crate::memory::MemoryStore;
use crate::relevance::{ConnectivityProbe, HttpProbe, StaticProbe, needs_web_augmentation};
use crate::search::SearchAggregator;
use crate::types::{ChatReply, ChatRequest, Role, SearchResult, truncate_chars};
use providers::{CompletionClient, CompletionRequest};

/// Knobs for a single chat turn that are not part of prompt layout.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_web_results: usize,
    pub memory_limit: usize,
    pub max_query_chars: usize,
    /// Search on every turn, even when the heuristic says no. Results are
    /// still only shown to the model when augmentation was triggered.
    pub always_fetch_web_results: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_web_results: 4,
            memory_limit: 5,
            max_query_chars: 800,
            always_fetch_web_results: false,
        }
    }
}

/// Runs one chat turn: decide on augmentation, gather memory and web
/// context, assemble the prompt, call the model, remember the exchange.
///
/// Search and connectivity problems only shrink the context. A completion
/// failure fails the turn and nothing is remembered.
pub struct ChatPipeline {
    memory: Arc<MemoryStore>,
    search: Arc<SearchAggregator>,
    probe: Arc<dyn ConnectivityProbe>,
    completion: Arc<dyn CompletionClient>,
    assembler: ContextAssembler,
    options: PipelineOptions,
}

impl ChatPipeline {
    pub fn new(
        memory: Arc<MemoryStore>,
        search: Arc<SearchAggregator>,
        probe: Arc<dyn ConnectivityProbe>,
        completion: Arc<dyn CompletionClient>,
        assembler: ContextAssembler,
        options: PipelineOptions,
    ) -> Self {
        Self {
            memory,
            search,
            probe,
            completion,
            assembler,
            options,
        }
    }

    /// Wire up the production pipeline. Fails when the completion key is missing.
    pub fn from_config(config: &AstralConfig) -> Result<Self, ConfigError> {
        let completion = providers::from_config(&config.completion)?;

        let memory = match config.memory.path.as_deref() {
            Some(path) => MemoryStore::with_backing(config.memory.capacity, path),
            None => MemoryStore::new(config.memory.capacity),
        };

        let probe: Arc<dyn ConnectivityProbe> = if config.search.probe_url.is_empty() {
            Arc::new(StaticProbe(true))
        } else {
            Arc::new(HttpProbe::new(
                config.search.probe_url.clone(),
                Duration::from_secs(config.search.probe_timeout_secs),
            )?)
        };

        let assembler = ContextAssembler::new(
            config.completion.system_instructions(),
            config.completion.limits(),
        )
        .with_assistant_name(config.completion.assistant_name.clone());

        let options = PipelineOptions {
            temperature: config.completion.temperature,
            top_p: config.completion.top_p,
            max_web_results: config.search.max_results,
            memory_limit: config.memory.retrieve_limit,
            max_query_chars: config.search.max_query_chars,
            always_fetch_web_results: config.search.always_fetch_web_results,
        };

        info!(
            provider = completion.name(),
            model = %config.completion.model,
            always_fetch = options.always_fetch_web_results,
            "chat pipeline ready"
        );

        Ok(Self::new(
            Arc::new(memory),
            Arc::new(SearchAggregator::from_config(&config.search)?),
            probe,
            completion,
            assembler,
            options,
        ))
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Build the prompt for a request without calling the model.
    pub async fn prepare(&self, request: &ChatRequest) -> Result<AssembledPrompt, ValidationError> {
        if request.text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }

        let web_triggered = request.use_web || needs_web_augmentation(&request.text);
        let should_search = web_triggered || self.options.always_fetch_web_results;

        let results = if should_search {
            self.gather_web(request).await
        } else {
            Vec::new()
        };

        let memories = self
            .memory
            .retrieve_relevant(&request.text, self.options.memory_limit);

        let prompt = self
            .assembler
            .assemble(request, &memories, &results, web_triggered);

        debug!(
            web_triggered,
            fetched = results.len(),
            web_used = prompt.web_count,
            memories = prompt.memory_count,
            prompt_tokens = prompt.estimated_prompt_tokens,
            reply_budget = prompt.reply_token_budget,
            "prompt assembled"
        );
        Ok(prompt)
    }

    async fn gather_web(&self, request: &ChatRequest) -> Vec<SearchResult> {
        if !self.probe.is_online().await {
            warn!("offline, answering from memory only");
            return Vec::new();
        }
        let query = request
            .web_query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(&request.text);
        let query = truncate_chars(query, self.options.max_query_chars);
        self.search.search(query, self.options.max_web_results).await
    }

    /// Run a full chat turn.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("chat", %request_id);

        async move {
            let prompt = self.prepare(&request).await?;

            let completion_request = CompletionRequest {
                system: prompt.system_instructions,
                user: prompt.user_content,
                max_tokens: prompt.reply_token_budget,
                temperature: self.options.temperature,
                top_p: self.options.top_p,
                stop: prompt.stop_sequences,
            };

            let reply = match self.completion.complete(&completion_request).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(provider = e.provider(), "completion failed: {e}");
                    return Err(ChatError::Provider(e));
                }
            };

            self.memory.append(Role::User, request.text);
            self.memory.append(Role::Assistant, reply.clone());

            info!(
                web = prompt.web_augmented,
                reply_chars = reply.len(),
                "chat turn completed"
            );
            Ok(ChatReply { reply })
        }
        .instrument(span)
        .await
    }
}
