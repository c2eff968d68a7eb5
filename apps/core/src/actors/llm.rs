use crate::actors::messages::{ActorError, AppError, LlmMessage};
use crate::actors::traits::{LlmActor, ThoughtGenerator, ThoughtRequest};
use crate::config::LlmConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// A handle to the `LlmActor`.
///
/// This struct provides a public, cloneable interface for sending messages to the
/// running LLM actor. It abstracts away the `mpsc::Sender`.
#[derive(Clone)]
pub struct LlmActorHandle {
    sender: mpsc::Sender<LlmMessage>,
}

impl LlmActorHandle {
    /// Creates a new `LlmActor` talking to an already running completion server
    /// and returns a handle to it.
    ///
    /// This will spawn the `LlmActorRunner` in a new Tokio task.
    pub fn new(config: LlmConfig) -> Self {
        let (sender, receiver) = mpsc::channel(32);
        let actor = LlmActorRunner::new(receiver, config);
        tokio::spawn(async move { actor.run().await });
        Self { sender }
    }

    /// A convenience method for generating text with default parameters.
    pub async fn generate(&self, prompt: String) -> Result<String, AppError> {
        self.generate_with_params(prompt, None, None).await
    }
}

#[async_trait]
impl LlmActor for LlmActorHandle {
    async fn generate_with_params(
        &self,
        prompt: String,
        system_prompt: Option<String>,
        temperature: Option<f32>,
    ) -> Result<String, AppError> {
        let (send, recv) = oneshot::channel();
        let msg = LlmMessage::Generate {
            prompt,
            system_prompt,
            temperature,
            responder: send,
        };

        self.sender
            .send(msg)
            .await
            .map_err(|_| AppError::Actor(ActorError::Closed("LLM Actor closed".to_string())))?;
        timeout(HANDLE_TIMEOUT, recv)
            .await?
            .map_err(|_| AppError::Actor(ActorError::Internal("LLM Actor failed to respond".to_string())))?
    }
}

// --- Constants ---
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);
const HANDLE_TIMEOUT: Duration = Duration::from_secs(150);

// --- Actor Runner (Internal Logic) ---
struct LlmActorRunner {
    receiver: mpsc::Receiver<LlmMessage>,
    config: LlmConfig,
    client: Client,
}

impl LlmActorRunner {
    fn new(receiver: mpsc::Receiver<LlmMessage>, config: LlmConfig) -> Self {
        Self {
            receiver,
            config,
            client: Client::new(),
        }
    }

    async fn run(mut self) {
        info!("LlmActor started against {}", self.config.server_url);
        if self.config.auth_token.is_none() {
            warn!("LLAMA_AUTH_TOKEN is not set; completion requests are sent unauthenticated");
        }

        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg).await;
        }

        info!("LlmActor stopped");
    }

    fn build_request(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<reqwest::RequestBuilder, AppError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.config.auth_token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| AppError::Config(format!("Invalid auth token: {}", e)))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(self
            .client
            .post(format!("{}/{}", self.config.server_url.trim_end_matches('/'), endpoint))
            .headers(headers)
            .json(payload))
    }

    async fn handle_message(&mut self, msg: LlmMessage) {
        match msg {
            LlmMessage::Generate {
                prompt,
                system_prompt,
                temperature,
                responder,
            } => {
                let result = self
                    .generate_completion(prompt, system_prompt, temperature)
                    .await;
                if let Err(e) = &result {
                    error!("Completion failed: {}", e);
                }
                let _ = responder.send(result);
            }
        }
    }

    async fn generate_completion(
        &self,
        prompt: String,
        system_prompt: Option<String>,
        temperature: Option<f32>,
    ) -> Result<String, AppError> {
        debug!("LLM Generating for prompt: {}", prompt);

        let mut payload = serde_json::json!({
            "prompt": prompt,
            "stream": false,
            "n_predict": self.config.max_tokens,
            "temperature": temperature.unwrap_or(self.config.temperature),
        });

        if let Some(system) = system_prompt {
            payload["system_prompt"] = serde_json::Value::String(system);
        }

        let request_future = self.build_request("completion", &payload)?.send();

        let res = timeout(COMPLETION_TIMEOUT, request_future).await??;

        let status = res.status();

        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Actor(ActorError::LlmError(format!(
                "Completion request failed with status {}: {}",
                status, body
            ))));
        }

        let json: serde_json::Value = res
            .json()
            .await
            .map_err(|e| AppError::Actor(ActorError::LlmError(e.to_string())))?;

        let content = json["content"].as_str().unwrap_or("").trim().to_string();
        if content.is_empty() {
            return Err(AppError::Generation("Completion returned no content".to_string()));
        }
        Ok(content)
    }
}

/// Generates hidden thoughts by prompting any `LlmActor`.
pub struct LlmThoughtGenerator {
    llm: Arc<dyn LlmActor>,
}

impl LlmThoughtGenerator {
    pub fn new(llm: Arc<dyn LlmActor>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ThoughtGenerator for LlmThoughtGenerator {
    async fn generate_thought(&self, request: ThoughtRequest) -> Result<String, AppError> {
        let prompt = build_thought_prompt(&request);
        let raw = self.llm.generate_with_params(prompt, None, None).await?;
        first_line(&raw).ok_or_else(|| {
            AppError::Generation(format!("Empty thought for {}", request.character_name))
        })
    }
}

fn build_thought_prompt(request: &ThoughtRequest) -> String {
    format!(
        "Generate a brief hidden thought for {name}, considering:\n\
         Personality: {traits}\n\
         Hidden Motive: {motive}\n\
         Current Scene: {scene}\n\
         Recent Events: {history}\n\n\
         Return a single line of internal monologue that reveals their true feelings or plans.",
        name = request.character_name,
        traits = request.trait_summary,
        motive = request.hidden_motive,
        scene = request.scene,
        history = request.recent_history,
    )
}

/// First non-blank line, trimmed.
fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
