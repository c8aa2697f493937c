#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::stream;
use relay_llm::Context;
use relay_llm::error::LLMError;
use relay_llm::http::{HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};
use relay_llm::tool::{ParamProperty, ParamsSchema, Tool, ToolError, required_str};
use serde_json::{Map, Value, json};

/// Canned reply served by [`MockTransport`] in FIFO order.
pub enum Canned {
    Json { status: u16, body: Value },
    Sse {
        status: u16,
        chunks: Vec<String>,
        /// Keep the body open after the last chunk.
        hang: bool,
    },
    /// Never resolves.
    Hang,
}

impl Canned {
    pub fn json(body: Value) -> Self {
        Self::Json { status: 200, body }
    }

    pub fn error(status: u16, body: Value) -> Self {
        Self::Json { status, body }
    }

    pub fn sse(chunks: Vec<String>) -> Self {
        Self::Sse {
            status: 200,
            chunks,
            hang: false,
        }
    }

    pub fn sse_then_hang(chunks: Vec<String>) -> Self {
        Self::Sse {
            status: 200,
            chunks,
            hang: true,
        }
    }
}

/// In-memory transport recording every request it receives.
#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<HttpRequest>>,
    replies: Mutex<VecDeque<Canned>>,
    body_dropped: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(replies: Vec<Canned>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn last_body(&self) -> Value {
        self.requests()
            .last()
            .and_then(HttpRequest::json_body)
            .expect("recorded JSON body")
    }

    /// Whether the most recent streaming body has been released.
    pub fn body_dropped(&self) -> bool {
        self.body_dropped.load(Ordering::SeqCst)
    }

    pub async fn wait_for_body_drop(&self) -> bool {
        for _ in 0..100 {
            if self.body_dropped() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn next_reply(&self, request: HttpRequest) -> Canned {
        self.requests.lock().expect("requests lock").push(request);
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .expect("unexpected request: no canned reply left")
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        match self.next_reply(request) {
            Canned::Json { status, body } => Ok(HttpResponse {
                status,
                headers: HashMap::new(),
                body: serde_json::to_vec(&body).expect("serialize canned body"),
            }),
            Canned::Hang => std::future::pending().await,
            Canned::Sse { .. } => panic!("streaming reply queued for a buffered request"),
        }
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
        match self.next_reply(request) {
            Canned::Sse {
                status,
                chunks,
                hang,
            } => {
                self.body_dropped.store(false, Ordering::SeqCst);
                let items = stream::iter(
                    chunks
                        .into_iter()
                        .map(|chunk| Ok::<_, LLMError>(chunk.into_bytes()))
                        .collect::<Vec<_>>(),
                );
                let inner: Pin<Box<dyn Stream<Item = Result<Vec<u8>, LLMError>> + Send>> =
                    if hang {
                        Box::pin(futures_util::StreamExt::chain(items, stream::pending()))
                    } else {
                        Box::pin(items)
                    };
                Ok(HttpStreamResponse {
                    status,
                    headers: HashMap::new(),
                    body: Box::pin(DropGuard {
                        inner,
                        dropped: self.body_dropped.clone(),
                    }),
                })
            }
            Canned::Json { status, body } => Ok(HttpStreamResponse {
                status,
                headers: HashMap::new(),
                body: Box::pin(stream::iter(vec![Ok::<_, LLMError>(
                    serde_json::to_vec(&body).expect("serialize canned body"),
                )])),
            }),
            Canned::Hang => std::future::pending().await,
        }
    }
}

struct DropGuard {
    inner: Pin<Box<dyn Stream<Item = Result<Vec<u8>, LLMError>> + Send>>,
    dropped: Arc<AtomicBool>,
}

impl Stream for DropGuard {
    type Item = Result<Vec<u8>, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

/// `get_weather(location, day)` returning a fixed sentence.
pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the weather for a location on a given day"
    }

    fn params(&self) -> ParamsSchema {
        ParamsSchema::new()
            .required_property("location", ParamProperty::string("City name"))
            .required_property("day", ParamProperty::string("Day of the week"))
    }

    async fn call(&self, _ctx: &Context, args: Map<String, Value>) -> Result<Value, ToolError> {
        let location = required_str(&args, "location")?;
        let day = required_str(&args, "day")?;
        Ok(json!(format!("The weather in {location} on {day} is fine")))
    }
}

pub fn sse_data(value: Value) -> String {
    format!("data: {value}\n\n")
}

pub fn sse_event(name: &str, value: Value) -> String {
    format!("event: {name}\ndata: {value}\n\n")
}

/// Routes `tracing` output to the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn load_env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
