//! Scripted adapters for exercising the dispatcher and HTTP layer without
//! network access.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use streamgate_core::{GatewayError, NormalizedEvent, RequestId, Usage};

use crate::provider::{EventStream, StreamAdapter};

/// One scripted adapter output.
#[derive(Debug, Clone)]
pub enum Step {
    Delta(String),
    Done(Option<Usage>),
    /// Yield an upstream failure
    Fail(String),
    /// Never produce another item
    Pending,
}

impl Step {
    pub fn delta(text: &str) -> Self {
        Step::Delta(text.to_string())
    }

    pub fn fail(message: &str) -> Self {
        Step::Fail(message.to_string())
    }
}

/// Adapter that replays a fixed script and records how it was used.
pub struct ScriptedAdapter {
    name: String,
    steps: Vec<Step>,
    calls: Arc<AtomicUsize>,
    last_model: Arc<Mutex<Option<String>>>,
    dropped: Arc<AtomicBool>,
}

impl ScriptedAdapter {
    pub fn new(name: &str, steps: Vec<Step>) -> Self {
        Self {
            name: name.to_string(),
            steps,
            calls: Arc::new(AtomicUsize::new(0)),
            last_model: Arc::new(Mutex::new(None)),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set once a stream handed out by this adapter has been dropped.
    pub fn dropped_flag(&self) -> Arc<AtomicBool> {
        self.dropped.clone()
    }

    /// Number of `stream` calls so far.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Model passed to the most recent `stream` call.
    pub fn last_model(&self) -> Arc<Mutex<Option<String>>> {
        self.last_model.clone()
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl StreamAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn stream(&self, model: &str, _prompt: &str, _request_id: &RequestId) -> EventStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_model.lock() {
            *last = Some(model.to_string());
        }

        let steps = self.steps.clone();
        let guard = DropFlag(self.dropped.clone());

        Box::pin(async_stream::stream! {
            let _guard = guard;
            for step in steps {
                match step {
                    Step::Delta(text) => yield Ok(NormalizedEvent::Delta { text }),
                    Step::Done(usage) => yield Ok(NormalizedEvent::Done { usage }),
                    Step::Fail(message) => yield Err(GatewayError::Provider(message)),
                    Step::Pending => futures::future::pending::<()>().await,
                }
            }
        })
    }
}
