//! The interaction handler: everything one user action can do.
//!
//! A `ChatSession` owns the open documents, their chat history and the model
//! client. Each upload or query runs to completion before the next starts.

pub mod chat;
pub mod documents;

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::context::ContextBuilder;
use crate::db::SessionStore;
use crate::doc_processor::ExtractedContent;
use crate::error::ChatError;
use crate::llm::{ChatModel, ChatRequest, SamplingParams};
use crate::plot::{PlotExecutor, SandboxConfig};
use crate::router::QueryRouter;

pub use chat::Reply;
pub use documents::OpenedDocument;

pub struct ChatSession<M> {
    model: M,
    model_id: String,
    sampling: SamplingParams,
    store: SessionStore,
    documents: BTreeMap<String, ExtractedContent>,
    context: ContextBuilder,
    router: QueryRouter,
    plots: PlotExecutor,
    chart_dir: PathBuf,
    max_upload_bytes: u64,
    preview_chars: usize,
    describe_images: bool,
}

impl<M: ChatModel> ChatSession<M> {
    pub fn new(model: M, config: &AppConfig) -> Result<Self, ChatError> {
        Ok(Self {
            model,
            model_id: config.llm.model.clone(),
            sampling: config.llm.sampling(),
            store: SessionStore::in_memory()?,
            documents: BTreeMap::new(),
            context: ContextBuilder::new(
                config.session.max_history_turns,
                config.session.max_context_chars,
            ),
            router: QueryRouter::new(config.plot.required_column.clone()),
            plots: PlotExecutor::new(SandboxConfig::from(&config.plot)),
            chart_dir: config.plot.output_dir.clone(),
            max_upload_bytes: config.session.max_upload_bytes,
            preview_chars: config.session.preview_chars,
            describe_images: config.llm.describe_images,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Open documents by name, with the number of recorded turns for each.
    pub fn documents(&self) -> Result<Vec<(&str, &ExtractedContent, usize)>, ChatError> {
        self.documents
            .iter()
            .map(|(name, content)| Ok((name.as_str(), content, self.store.turn_count(name)?)))
            .collect()
    }

    pub fn document(&self, name: &str) -> Result<&ExtractedContent, ChatError> {
        self.documents
            .get(name)
            .ok_or_else(|| ChatError::DocumentNotFound(name.to_string()))
    }

    fn request(&self, messages: Vec<crate::llm::ChatMessage>) -> ChatRequest {
        ChatRequest {
            messages,
            model: self.model_id.clone(),
            sampling: self.sampling.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays canned replies and counts calls.
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        pub calls: AtomicUsize,
        pub requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_user_message(&self) -> String {
            let requests = self.requests.lock().unwrap();
            let request = requests.last().expect("model was called");
            request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == "user")
                .map(|m| m.content.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("default reply".to_string()))
        }
    }

    pub fn test_config(chart_dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.plot.output_dir = chart_dir.to_path_buf();
        config
    }
}
