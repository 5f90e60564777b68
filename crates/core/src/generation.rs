use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Answer used whenever the model gives nothing usable.
pub const NO_ANSWER_SENTINEL: &str = "উত্তর পাওয়া যায়নি";

/// What came back from the model, classified once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Answer(String),
    MissingField,
}

impl Generation {
    /// Reads `message.content` (chat shape) or `response` (completion shape).
    /// Anything else, including a body that is not JSON, is `MissingField`.
    pub fn from_body(body: &str) -> Self {
        let Ok(parsed) = serde_json::from_str::<Value>(body) else {
            return Self::MissingField;
        };

        parsed
            .pointer("/message/content")
            .and_then(Value::as_str)
            .or_else(|| parsed.get("response").and_then(Value::as_str))
            .map(|text| Self::Answer(text.trim().to_string()))
            .unwrap_or(Self::MissingField)
    }

    pub fn into_answer(self) -> String {
        match self {
            Self::Answer(text) => text,
            Self::MissingField => NO_ANSWER_SENTINEL.to_string(),
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError>;
}

#[async_trait]
impl Generator for Box<dyn Generator> {
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError> {
        (**self).generate(prompt).await
    }
}

pub fn build_prompt(query: &str, contexts: &[String]) -> String {
    let context = contexts.join("\n\n");
    format!(
        r#"
তুমি একজন দক্ষ বাংলা সহকারী, HSC বই থেকে প্রশ্নের উত্তর দিচ্ছ।

প্রশ্ন: অনুপমের ভাষায় সুপুরুষ কাকে বলা হয়েছে?
নিচের context:
... কন্যার পিতা শুম্ভুনাথবাবু ... সুপুরুষ বটে ...
শুধুমাত্র যদি context-এ প্রশ্নের সরাসরি উত্তর পাও, তাহলে শুধু "শুম্ভুনাথবাবু" লিখো।

প্রশ্ন: কাকে অনুপমের ভাগ্যদেবতা বলে উল্লেখ করা হয়েছে?
নিচের context:
... মামা, যিনি পৃথিবীতে আমার ভাগ্যদেবতার প্রধান এজেন্ট ...
উত্তর: "মামা"

এবারের প্রশ্ন:
প্রশ্ন: {query}

নিম্নোক্ত প্রাসঙ্গিক তথ্য (context) খুব মনোযোগ দিয়ে পড়ো:
{context}

শুধুমাত্র যদি উপরের context-এ প্রশ্নের সরাসরি, স্পষ্ট উত্তর (নাম, ব্যক্তি, সংখ্যা) পাওয়া যায়,
তাহলে সেটাই বাংলায় সংক্ষেপে (১-২ শব্দে) উত্তর দাও।
শুধু নির্দিষ্ট বাংলা শব্দ/নাম (যেমন: মামা, শুম্ভুনাথবাবু, কল্যাণী, ইত্যাদি) লিখো।

কোনোভাবেই ইংরেজি, প্রশ্নের শব্দ, অথবা মূল চরিত্রের নাম ("অনুপম" বা "আমার") উত্তর হিসেবে দেবে না।
ব্যাখ্যা, অনুবাদ, অতিরিক্ত বাক্য, সংখ্যা, বা প্রশ্নের পুনরাবৃত্তি করবে না।
যদি context-এ স্পষ্ট উত্তর না পাও, তাহলে লিখবে: {NO_ANSWER_SENTINEL}

উত্তরঃ
"#
    )
}

/// Chat completion against an Ollama server (`POST /api/chat`, non-streaming).
pub struct OllamaGenerator {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OllamaGenerator {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: crate::http::endpoint(endpoint, "api/chat")?,
            model: model.into(),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "stream": false,
            }))
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            return Err(GenerationError::Status {
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(classify_transport_error)?;
        let generation = Generation::from_body(&body);
        match &generation {
            Generation::Answer(text) => debug!(model = %self.model, chars = text.chars().count(), "generated answer"),
            Generation::MissingField => warn!(model = %self.model, "generation response had no answer field"),
        }
        Ok(generation)
    }
}

fn classify_transport_error(error: reqwest::Error) -> GenerationError {
    if error.is_timeout() {
        GenerationError::Timeout(error.to_string())
    } else {
        GenerationError::Http(error)
    }
}
