//! Language-model collaborator contract
//!
//! The core never talks to a provider directly; it depends on the
//! [`LanguageModel`] trait only. The provider manager that implements it
//! (API keys, model selection, retries against the vendor) lives outside
//! this crate. Responses are stable records with explicit optional fields -
//! if a backend lacks a field, it is simply absent.

mod error;

pub use error::LmError;

use async_trait::async_trait;

/// One prior request/response pair, oldest first
#[derive(Debug, Clone, Default)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

impl Exchange {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Token accounting for one reply; fields are absent when the backend
/// does not report them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LmUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// A completed model reply
#[derive(Debug, Clone)]
pub struct LmReply {
    pub text: String,
    pub usage: LmUsage,
}

impl LmReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: LmUsage::default(),
        }
    }
}

/// The contract the core consumes: one blocking ask plus a readiness probe
/// (the auth manager's readiness folds into `is_ready`).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one completion: system prompt, current user message, and prior
    /// history (oldest first).
    async fn ask(&self, system: &str, user: &str, history: &[Exchange]) -> Result<LmReply, LmError>;

    /// Whether the backend is configured and authenticated
    fn is_ready(&self) -> bool;
}

/// Placeholder used when no provider manager is wired in: never ready,
/// every ask fails. Lets the agent run file/process/remote tasks without a
/// model backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredLm;

#[async_trait]
impl LanguageModel for UnconfiguredLm {
    async fn ask(&self, _system: &str, _user: &str, _history: &[Exchange]) -> Result<LmReply, LmError> {
        Err(LmError::NotReady("no language model backend configured".to_string()))
    }

    fn is_ready(&self) -> bool {
        false
    }
}

/// Scripted in-memory model for tests: pops replies in order, records the
/// prompts it was asked.
#[derive(Debug, Default)]
pub struct MockLm {
    replies: std::sync::Mutex<std::collections::VecDeque<String>>,
    pub asked: std::sync::Mutex<Vec<String>>,
}

impl MockLm {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into_iter().map(Into::into).collect()),
            asked: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Number of scripted replies not yet consumed
    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("mock lm poisoned").len()
    }
}

#[async_trait]
impl LanguageModel for MockLm {
    async fn ask(&self, _system: &str, user: &str, _history: &[Exchange]) -> Result<LmReply, LmError> {
        self.asked.lock().expect("mock lm poisoned").push(user.to_string());
        let reply = self
            .replies
            .lock()
            .expect("mock lm poisoned")
            .pop_front()
            .ok_or_else(|| LmError::NotReady("mock exhausted".to_string()))?;
        Ok(LmReply::text(reply))
    }

    fn is_ready(&self) -> bool {
        true
    }
}
