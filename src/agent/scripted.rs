//! Backend-free agents: scripted replies and closures.

use super::traits::{AgentCapability, AgentReply, InvocationRequest};
use crate::conversation::Conversation;
use crate::error::CapabilityError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// Start over from the first reply.
    Cycle,
    /// Fail every invocation past the last reply.
    Fail,
}

#[derive(Debug, Clone)]
enum Script {
    Replies(Vec<AgentReply>),
    Failure(String),
}

/// Replays a fixed list of replies, one per invocation.
#[derive(Debug)]
pub struct ScriptedAgent {
    script: Script,
    exhaustion: Exhaustion,
    delay: Option<Duration>,
    stream_words: bool,
    description: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    /// Plain text replies, cycling once exhausted.
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_replies(texts.into_iter().map(AgentReply::text).collect())
    }

    pub fn from_replies(replies: Vec<AgentReply>) -> Self {
        Self {
            script: Script::Replies(replies),
            exhaustion: Exhaustion::Cycle,
            delay: None,
            stream_words: false,
            description: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// An agent whose every invocation fails with `error`.
    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            script: Script::Failure(error.into()),
            ..Self::from_replies(Vec::new())
        }
    }

    #[must_use]
    pub fn with_exhaustion(mut self, exhaustion: Exhaustion) -> Self {
        self.exhaustion = exhaustion;
        self
    }

    /// Sleep before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Stream each reply word by word as partial output.
    #[must_use]
    pub fn streaming(mut self) -> Self {
        self.stream_words = true;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Number of invocations so far, including failed ones.
    pub fn invocations(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self, call: usize) -> Result<AgentReply, CapabilityError> {
        let replies = match &self.script {
            Script::Failure(error) => return Err(CapabilityError::Script(error.clone())),
            Script::Replies(replies) => replies,
        };
        if replies.is_empty() {
            return Err(CapabilityError::Script("script has no replies".into()));
        }
        let index = match self.exhaustion {
            Exhaustion::Cycle => call % replies.len(),
            Exhaustion::Fail if call < replies.len() => call,
            Exhaustion::Fail => {
                return Err(CapabilityError::Script(format!(
                    "script exhausted after {} replies",
                    replies.len()
                )))
            }
        };
        Ok(replies[index].clone())
    }
}

#[async_trait]
impl AgentCapability for ScriptedAgent {
    async fn invoke(&self, request: InvocationRequest<'_>) -> Result<AgentReply, CapabilityError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.next_reply(call)?;

        if self.stream_words {
            let text = reply.message.text();
            for (i, word) in text.split(' ').enumerate() {
                if i == 0 {
                    request.emit_partial(word);
                } else {
                    request.emit_partial(format!(" {word}"));
                }
            }
        }
        Ok(reply)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

type ReplyFn = dyn Fn(&Conversation) -> anyhow::Result<AgentReply> + Send + Sync;

/// Wraps a synchronous closure over the conversation so far.
pub struct FnAgent {
    f: Box<ReplyFn>,
    description: Option<String>,
}

impl FnAgent {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Conversation) -> anyhow::Result<AgentReply> + Send + Sync + 'static,
    {
        Self {
            f: Box::new(f),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[async_trait]
impl AgentCapability for FnAgent {
    async fn invoke(&self, request: InvocationRequest<'_>) -> Result<AgentReply, CapabilityError> {
        Ok((self.f)(request.conversation)?)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn name(&self) -> &str {
        "fn"
    }
}
