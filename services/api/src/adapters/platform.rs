//! services/api/src/adapters/platform.rs
//!
//! The HTTP adapter for the agent platform: the concrete implementation of the
//! `AgentPlatform` port, using `reqwest` with JSON bodies.
//!
//! Responses outside 2xx become `PortError::Platform` carrying the status code, except
//! that a 401/403 to a request sent without a bearer token is `PortError::AuthMissing`.
//! Failures to reach the platform at all (connect errors, timeouts, unreadable bodies)
//! become `PortError::Network`.

use async_trait::async_trait;
use classroom_agent_core::domain::HealthReport;
use classroom_agent_core::ports::{
    AgentPlatform, AgentReply, AgentRequest, ContextLookup, ContextPush, ContextPushReply,
    EndpointTier, PortError, PortResult, TitleReply, TitleRequest,
};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct HttpAgentPlatform {
    client: Client,
    base_url: String,
}

impl HttpAgentPlatform {
    /// Creates a new adapter for the platform rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PortResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str, bearer: Option<&str>) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post_json<B, R>(&self, path: &str, bearer: Option<&str>, body: &B) -> PortResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(path, authenticated = bearer.is_some(), "POST to agent platform.");
        let request = self.request(Method::POST, path, bearer).json(body);
        send(path, bearer.is_some(), request).await
    }

    async fn get_json<R>(&self, path: &str, bearer: Option<&str>) -> PortResult<R>
    where
        R: DeserializeOwned,
    {
        debug!(path, authenticated = bearer.is_some(), "GET from agent platform.");
        send(path, bearer.is_some(), self.request(Method::GET, path, bearer)).await
    }
}

fn process_path(tier: EndpointTier) -> &'static str {
    match tier {
        EndpointTier::Primary => "/agent/process",
        EndpointTier::Test => "/agent/test",
    }
}

fn title_path(tier: EndpointTier) -> &'static str {
    match tier {
        EndpointTier::Primary => "/agent/generate-thread-title",
        EndpointTier::Test => "/agent/test/generate-thread-title",
    }
}

/// Sends the request and decodes a 2xx JSON body.
async fn send<R: DeserializeOwned>(
    path: &str,
    authenticated: bool,
    request: RequestBuilder,
) -> PortResult<R> {
    let response = request.send().await.map_err(|e| {
        warn!(path, error = %e, "Agent platform request failed in transport.");
        PortError::Network(e.to_string())
    })?;

    let status = response.status();
    if !authenticated
        && (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN)
    {
        warn!(path, status = status.as_u16(), "Agent platform requires a bearer token.");
        return Err(PortError::AuthMissing);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        warn!(path, status = status.as_u16(), "Agent platform returned an error status.");
        return Err(PortError::Platform {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<R>()
        .await
        .map_err(|e| PortError::Network(format!("Unreadable response from {}: {}", path, e)))
}

//=========================================================================================
// `AgentPlatform` Trait Implementation
//=========================================================================================

#[async_trait]
impl AgentPlatform for HttpAgentPlatform {
    async fn process(
        &self,
        tier: EndpointTier,
        bearer: Option<&str>,
        request: &AgentRequest,
    ) -> PortResult<AgentReply> {
        self.post_json(process_path(tier), bearer, request).await
    }

    async fn generate_title(
        &self,
        tier: EndpointTier,
        bearer: Option<&str>,
        request: &TitleRequest,
    ) -> PortResult<TitleReply> {
        self.post_json(title_path(tier), bearer, request).await
    }

    async fn update_context(
        &self,
        bearer: Option<&str>,
        push: &ContextPush,
    ) -> PortResult<ContextPushReply> {
        self.post_json("/voice-agent/update-context", bearer, push)
            .await
    }

    async fn fetch_context(
        &self,
        bearer: Option<&str>,
        student_id: Uuid,
        course_id: Uuid,
    ) -> PortResult<ContextLookup> {
        let path = format!("/voice-agent/context/{}/{}", student_id, course_id);
        self.get_json(&path, bearer).await
    }

    async fn health(&self) -> PortResult<HealthReport> {
        self.get_json("/health", None).await
    }

    async fn voice_health(&self) -> PortResult<HealthReport> {
        self.get_json("/voice-agent/health", None).await
    }
}
