#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use runbook_core::{parse_runbook_str, Runbook};
use runbook_exec::events::{Event, EventSink};
use runbook_exec::runner::http::{HttpClient, HttpError, HttpRequestParts, HttpResponseParts};
use serde_json::Value;

/// Replays queued responses in order, then repeats the fallback.
pub struct MockHttpClient {
    queue: Mutex<VecDeque<Result<HttpResponseParts, HttpError>>>,
    fallback: HttpResponseParts,
    requests: Mutex<Vec<HttpRequestParts>>,
}

impl MockHttpClient {
    pub fn always(response: HttpResponseParts) -> Arc<Self> {
        Self::sequence(Vec::new(), response)
    }

    pub fn sequence(
        queued: Vec<Result<HttpResponseParts, HttpError>>,
        fallback: HttpResponseParts,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(queued.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequestParts> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| match r.url.query() {
                Some(q) => format!("{}?{q}", r.url.path()),
                None => r.url.path().to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, req: HttpRequestParts) -> Result<HttpResponseParts, HttpError> {
        self.requests.lock().unwrap().push(req);
        match self.queue.lock().unwrap().pop_front() {
            Some(next) => next,
            None => Ok(self.fallback.clone()),
        }
    }
}

pub fn json_response(status: u16, body: Value) -> HttpResponseParts {
    let mut headers = BTreeMap::new();
    headers.insert(
        "content-type".to_string(),
        vec!["application/json".to_string()],
    );
    HttpResponseParts {
        status,
        headers,
        body: serde_json::to_vec(&body).unwrap(),
    }
}

pub fn text_response(status: u16, content_type: &str, body: &str) -> HttpResponseParts {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), vec![content_type.to_string()]);
    HttpResponseParts {
        status,
        headers,
        body: body.as_bytes().to_vec(),
    }
}

#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(Event::type_name).collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn book(yaml: &str) -> Runbook {
    parse_runbook_str(yaml, ".").unwrap()
}

pub fn book_in(yaml: &str, root: &Path) -> Runbook {
    parse_runbook_str(yaml, root).unwrap()
}

pub fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
