//! Scriptable in-process provider for exercising the resolver without a
//! network.

use crate::error::{FailureKind, ProviderFailure};
use crate::providers::{ProviderOutcome, ProviderRequest, Translation, TranslationProvider};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a [`FakeProvider`] answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Success(String),
    Failure(FailureKind, String),
}

impl Reply {
    pub fn success(text: &str) -> Self {
        Reply::Success(text.to_string())
    }

    pub fn failure(kind: FailureKind) -> Self {
        Reply::Failure(kind, format!("simulated {}", kind))
    }
}

#[derive(Debug)]
pub struct FakeProvider {
    name: String,
    reply: Mutex<Reply>,
    delay_ms: AtomicU64,
    started: AtomicUsize,
    completed: AtomicUsize,
    last_text: Mutex<Option<String>>,
}

impl FakeProvider {
    pub fn new(name: &str, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reply: Mutex::new(reply),
            delay_ms: AtomicU64::new(0),
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            last_text: Mutex::new(None),
        })
    }

    /// Delay every answer by `delay`.
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::Relaxed);
        self
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap_or_else(|e| e.into_inner()) = reply;
    }

    /// Attempts that began.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Attempts that ran to the end (not cancelled mid-flight).
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Text of the most recent request.
    pub fn last_text(&self) -> Option<String> {
        self.last_text
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Convenience for building provider lists.
    pub fn shared(self: &Arc<Self>) -> Arc<dyn TranslationProvider> {
        Arc::clone(self) as Arc<dyn TranslationProvider>
    }
}

#[async_trait]
impl TranslationProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, request: &ProviderRequest) -> ProviderOutcome {
        self.started.fetch_add(1, Ordering::SeqCst);
        *self.last_text.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.text.clone());

        let delay = self.delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let reply = self.reply.lock().unwrap_or_else(|e| e.into_inner()).clone();
        self.completed.fetch_add(1, Ordering::SeqCst);

        match reply {
            Reply::Success(text) => ProviderOutcome::Success(Translation {
                text,
                provider: self.name.clone(),
            }),
            Reply::Failure(kind, message) => {
                ProviderOutcome::Failure(ProviderFailure::new(self.name.clone(), kind, message))
            }
        }
    }
}
