//! In-memory wiring shared by unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::admin::AdminStore;
use crate::agent::{
    Backends, ChatError, LLMProvider, LLMResponse, Message, ModelBackend, ToolSchema, TurnRequest,
    VisionAdapter,
};
use crate::bot::ChatBot;
use crate::chat::TurnOrchestrator;
use crate::config::{Config, SharedConfig};
use crate::history::{HistoryStore, Turn};
use crate::moderation::ModerationStore;
use crate::session::ContinuousSessions;
use crate::store::MemoryDataStore;

pub const ROOT: &str = "1000";

/// Owned copy of a [`TurnRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct SeenRequest {
    pub system_prompt: String,
    pub history: Vec<Turn>,
    pub input: String,
    pub cleanup: Vec<String>,
}

/// Scripted backend recording every request it receives.
#[derive(Default)]
pub struct FakeBackend {
    replies: Mutex<VecDeque<Result<String, ChatError>>>,
    requests: Mutex<Vec<SeenRequest>>,
}

impl FakeBackend {
    pub fn replying(replies: Vec<Result<String, ChatError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        })
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.input).collect()
    }
}

#[async_trait]
impl ModelBackend for FakeBackend {
    async fn respond(&self, request: &TurnRequest<'_>) -> Result<String, ChatError> {
        self.requests.lock().unwrap().push(SeenRequest {
            system_prompt: request.system_prompt.to_string(),
            history: request.history.to_vec(),
            input: request.input.to_string(),
            cleanup: request.cleanup.to_vec(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("echo: {}", request.input)))
    }
}

/// Vision model that always says the same thing.
pub struct FixedVision(pub &'static str);

#[async_trait]
impl LLMProvider for FixedVision {
    async fn chat(
        &self,
        _messages: &[Message],
        _tools: Option<&[ToolSchema]>,
    ) -> anyhow::Result<LLMResponse> {
        Ok(LLMResponse::text(self.0))
    }

    fn model(&self) -> &str {
        "fixed-vision"
    }
}

pub struct Fixture {
    pub config: SharedConfig,
    pub moderation: Arc<ModerationStore>,
    pub admin: Arc<AdminStore>,
    pub history: Arc<HistoryStore>,
    pub plain: Arc<FakeBackend>,
    pub tools: Arc<FakeBackend>,
    pub chat: Arc<TurnOrchestrator>,
    /// A readable image file
    pub image: String,
    _tmp: tempfile::TempDir,
}

impl Fixture {
    /// `root` is set to [`ROOT`] unless the config already names one.
    pub fn new(mut config: Config, replies: Vec<Result<String, ChatError>>, vision: &'static str) -> Self {
        if config.root.is_empty() {
            config.root = ROOT.to_string();
        }
        let config = SharedConfig::in_memory(config);
        let store = Arc::new(MemoryDataStore::default());
        let moderation = Arc::new(ModerationStore::new(store.clone()));
        let admin = Arc::new(AdminStore::new(store, config.clone()));
        let history = Arc::new(HistoryStore::in_memory());
        let plain = FakeBackend::replying(replies);
        let tools = FakeBackend::replying(vec![Ok("from tools".into())]);
        let vision = Arc::new(
            VisionAdapter::new(Arc::new(FixedVision(vision)), Duration::from_secs(5)).unwrap(),
        );

        let tmp = tempfile::tempdir().unwrap();
        let image = tmp.path().join("pic.png");
        std::fs::write(&image, b"png").unwrap();

        let chat = Arc::new(TurnOrchestrator::new(
            config.clone(),
            moderation.clone(),
            admin.clone(),
            history.clone(),
            Backends {
                plain: plain.clone(),
                tools: tools.clone(),
            },
            vision,
        ));

        Self {
            config,
            moderation,
            admin,
            history,
            plain,
            tools,
            chat,
            image: image.to_string_lossy().into_owned(),
            _tmp: tmp,
        }
    }

    pub fn with_replies(replies: Vec<Result<String, ChatError>>) -> Self {
        Self::new(Config::default(), replies, "")
    }

    pub fn bot(&self) -> ChatBot {
        ChatBot::new(
            self.config.clone(),
            self.moderation.clone(),
            self.admin.clone(),
            self.history.clone(),
            self.chat.clone(),
            Arc::new(ContinuousSessions::new()),
        )
    }
}
