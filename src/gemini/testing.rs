use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{ChatRequest, FragmentStream, GenerateRequest, GenerationError, GenerativeService};

/// Canned analysis outcome
pub(crate) enum Scripted {
    Text(String),
    Fail,
    /// Wait for the gate, then answer
    Gated(Arc<Notify>, String),
    /// Never answers
    Hang,
}

/// One scripted chat reply: `Err(())` injects a transport failure at that point
pub(crate) type ScriptedReply = Vec<Result<&'static str, ()>>;

struct QueuedReply {
    fragments: ScriptedReply,
    /// Stream stays open without sending anything after the fragments
    stall: bool,
}

#[derive(Default)]
pub(crate) struct FakeService {
    /// Keyed by a substring expected in the prompt (the region name)
    analyses: Mutex<HashMap<String, Scripted>>,
    replies: Mutex<VecDeque<QueuedReply>>,
    pub(crate) chat_requests: Mutex<Vec<ChatRequest>>,
    pub(crate) generate_calls: AtomicUsize,
}

impl FakeService {
    pub(crate) fn with_analysis(self, region: &str, outcome: Scripted) -> Self {
        self.analyses
            .lock()
            .unwrap()
            .insert(region.to_string(), outcome);
        self
    }

    pub(crate) fn with_reply(self, fragments: ScriptedReply) -> Self {
        self.queue_reply(fragments, false)
    }

    /// Reply that sends its fragments and then never finishes
    pub(crate) fn with_stalled_reply(self, fragments: ScriptedReply) -> Self {
        self.queue_reply(fragments, true)
    }

    fn queue_reply(self, fragments: ScriptedReply, stall: bool) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(QueuedReply { fragments, stall });
        self
    }

    pub(crate) fn generate_count(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    fn take_analysis(&self, prompt: &str) -> Option<Scripted> {
        let mut analyses = self.analyses.lock().unwrap();
        let key = analyses.keys().find(|k| prompt.contains(k.as_str()))?.clone();
        analyses.remove(&key)
    }
}

impl GenerativeService for FakeService {
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> BoxFuture<'a, Result<String, GenerationError>> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.take_analysis(&request.prompt);
        Box::pin(async move {
            match scripted {
                Some(Scripted::Text(text)) => Ok(text),
                Some(Scripted::Gated(gate, text)) => {
                    gate.notified().await;
                    Ok(text)
                }
                Some(Scripted::Hang) => std::future::pending().await,
                Some(Scripted::Fail) | None => {
                    Err(GenerationError::Service("scripted failure".into()))
                }
            }
        })
    }

    fn stream_chat<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> BoxFuture<'a, Result<FragmentStream, GenerationError>> {
        self.chat_requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        Box::pin(async move {
            let reply = reply.ok_or_else(|| GenerationError::Service("no scripted reply".into()))?;
            let items = stream::iter(reply.fragments.into_iter().map(|item| {
                item.map(str::to_string)
                    .map_err(|()| GenerationError::Service("stream interrupted".into()))
            }));
            if reply.stall {
                Ok(Box::pin(items.chain(stream::pending())) as FragmentStream)
            } else {
                Ok(Box::pin(items) as FragmentStream)
            }
        })
    }
}
