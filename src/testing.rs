//! In-memory collaborators shared by the unit tests.

use crate::dom::PageAutomation;
use crate::error::RequestError;
use crate::request::{RemoteFetch, RemoteRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Scripted answer of [`FakeRemote`].
#[derive(Debug, Clone)]
pub enum FakeReply {
    Body(String),
    Status(u16),
    Exhausted,
}

impl FakeReply {
    fn into_result(self, label: &str, url: &str) -> Result<String, RequestError> {
        match self {
            FakeReply::Body(body) => Ok(body),
            FakeReply::Status(status) => Err(RequestError::Status {
                label: label.to_string(),
                url: url.to_string(),
                status,
            }),
            FakeReply::Exhausted => Err(RequestError::Exhausted {
                label: label.to_string(),
                attempts: 3,
                last: "HTTP 503".to_string(),
            }),
        }
    }
}

/// Remote site stub. Unknown GETs answer 404, unknown POSTs an empty body.
#[derive(Default)]
pub struct FakeRemote {
    gets: HashMap<String, FakeReply>,
    posts: Vec<(String, String, String, FakeReply)>,
    calls: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, body: &str) -> Self {
        self.reply(url, FakeReply::Body(body.to_string()))
    }

    pub fn reply(mut self, url: &str, reply: FakeReply) -> Self {
        self.gets.insert(url.to_string(), reply);
        self
    }

    /// Answers POSTs to `url` whose form field `name` equals `value`.
    pub fn form(mut self, url: &str, name: &str, value: &str, reply: FakeReply) -> Self {
        self.posts
            .push((url.to_string(), name.to_string(), value.to_string(), reply));
        self
    }

    /// Requests seen so far, as `GET url` or `POST url field=value&...`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteFetch for FakeRemote {
    async fn fetch_text(
        &self,
        request: RemoteRequest,
        label: &str,
    ) -> Result<String, RequestError> {
        match &request {
            RemoteRequest::Get { url } => {
                self.calls.lock().unwrap().push(format!("GET {}", url));
                self.gets
                    .get(url)
                    .cloned()
                    .unwrap_or(FakeReply::Status(404))
                    .into_result(label, url)
            }
            RemoteRequest::PostForm { url, form } => {
                let fields: Vec<String> = form.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                self.calls
                    .lock()
                    .unwrap()
                    .push(format!("POST {} {}", url, fields.join("&")));

                self.posts
                    .iter()
                    .find(|(post_url, name, value, _)| {
                        post_url == url && request.form_value(name) == Some(value.as_str())
                    })
                    .map(|(_, _, _, reply)| reply.clone())
                    .unwrap_or(FakeReply::Body(String::new()))
                    .into_result(label, url)
            }
        }
    }
}

/// A form page held in memory.
#[derive(Default)]
pub struct FakePage {
    state: Mutex<PageState>,
}

#[derive(Default)]
struct PageState {
    inputs: HashMap<String, String>,
    /// Options that appear once something is typed into the keyed input.
    dropdowns: HashMap<String, Vec<String>>,
    visible_options: Vec<String>,
    /// Companion input filled when an option is chosen, by typed-into input.
    companions: HashMap<String, String>,
    last_typed: Option<String>,
    regions: HashMap<String, String>,
    page_text: String,
}

impl FakePage {
    /// A page with the given (empty) inputs.
    pub fn with_inputs(selectors: &[&str]) -> Self {
        let page = Self::default();
        {
            let mut state = page.state.lock().unwrap();
            for selector in selectors {
                state.inputs.insert(selector.to_string(), String::new());
            }
        }
        page
    }

    /// Typing into `input` shows `options`; choosing one fills `companion`.
    pub fn dropdown(self, input: &str, companion: &str, options: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.inputs.entry(input.to_string()).or_default();
            state.inputs.entry(companion.to_string()).or_default();
            state.dropdowns.insert(
                input.to_string(),
                options.iter().map(|o| o.to_string()).collect(),
            );
            state
                .companions
                .insert(input.to_string(), companion.to_string());
        }
        self
    }

    pub fn set_value(&self, selector: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .inputs
            .insert(selector.to_string(), value.to_string());
    }

    pub fn value(&self, selector: &str) -> Option<String> {
        self.state.lock().unwrap().inputs.get(selector).cloned()
    }

    pub fn set_region(&self, selector: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .regions
            .insert(selector.to_string(), text.to_string());
    }

    pub fn set_page_text(&self, text: &str) {
        self.state.lock().unwrap().page_text = text.to_string();
    }
}

#[async_trait]
impl PageAutomation for FakePage {
    async fn fill_input(&self, selector: &str, value: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.inputs.get_mut(selector) {
            Some(current) => {
                *current = value.to_string();
                true
            }
            None => false,
        }
    }

    async fn exists(&self, selector: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.inputs.contains_key(selector) || state.regions.contains_key(selector)
    }

    async fn type_into(&self, selector: &str, text: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.inputs.contains_key(selector) {
            return false;
        }
        state.inputs.insert(selector.to_string(), text.to_string());
        state.visible_options = state.dropdowns.get(selector).cloned().unwrap_or_default();
        state.last_typed = Some(selector.to_string());
        true
    }

    async fn option_texts(&self, _selector: &str) -> Vec<String> {
        self.state.lock().unwrap().visible_options.clone()
    }

    async fn choose_option(&self, _selector: &str, index: usize) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(option) = state.visible_options.get(index).cloned() else {
            return false;
        };
        let Some(input) = state.last_typed.clone() else {
            return false;
        };
        state.inputs.insert(input.clone(), option.clone());
        if let Some(companion) = state.companions.get(&input).cloned() {
            state.inputs.insert(companion, format!("id-{}", index + 1));
        }
        state.visible_options.clear();
        true
    }

    async fn input_value(&self, selector: &str) -> Option<String> {
        self.state.lock().unwrap().inputs.get(selector).cloned()
    }

    async fn region_texts(&self, selectors: &[String]) -> Vec<String> {
        let state = self.state.lock().unwrap();
        selectors
            .iter()
            .filter_map(|s| state.regions.get(s).cloned())
            .collect()
    }

    async fn page_text(&self) -> String {
        self.state.lock().unwrap().page_text.clone()
    }
}
