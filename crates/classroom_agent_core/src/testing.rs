//! Scripted stand-ins for the agent platform, shared by the unit tests of this crate.

use crate::domain::{HealthReport, HealthStatus};
use crate::ports::{
    AgentPlatform, AgentReply, AgentRequest, ContextLookup, ContextPush, ContextPushReply,
    EndpointTier, PortError, PortResult, TitleReply, TitleRequest,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use uuid::Uuid;

pub fn agent_reply(response: &str, success: bool, action: Option<&str>) -> AgentReply {
    AgentReply {
        response: response.to_string(),
        success,
        action_taken: action.map(str::to_string),
        thread_id: None,
        thread_title: None,
        data: None,
    }
}

pub fn healthy() -> HealthReport {
    HealthReport {
        status: HealthStatus::Healthy,
        available: true,
        message: "ok".to_string(),
    }
}

#[derive(Default)]
pub struct FakePlatform {
    primary: Mutex<VecDeque<PortResult<AgentReply>>>,
    test: Mutex<VecDeque<PortResult<AgentReply>>>,
    primary_title: Mutex<Option<PortResult<TitleReply>>>,
    test_title: Mutex<Option<PortResult<TitleReply>>>,
    push_results: Mutex<VecDeque<PortResult<ContextPushReply>>>,
    health: Mutex<Option<PortResult<HealthReport>>>,
    voice_health: Mutex<Option<PortResult<HealthReport>>>,
    /// When set, every `process` call waits for one permit after being recorded.
    hold: Mutex<Option<Arc<Semaphore>>>,

    pub calls: Mutex<Vec<(EndpointTier, AgentRequest, Option<String>)>>,
    pub title_calls: Mutex<Vec<EndpointTier>>,
    pub pushes: Mutex<Vec<ContextPush>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, tier: EndpointTier, result: PortResult<AgentReply>) {
        match tier {
            EndpointTier::Primary => self.primary.lock().unwrap().push_back(result),
            EndpointTier::Test => self.test.lock().unwrap().push_back(result),
        }
    }

    pub fn set_title(&self, tier: EndpointTier, result: PortResult<TitleReply>) {
        match tier {
            EndpointTier::Primary => *self.primary_title.lock().unwrap() = Some(result),
            EndpointTier::Test => *self.test_title.lock().unwrap() = Some(result),
        }
    }

    pub fn queue_push(&self, result: PortResult<ContextPushReply>) {
        self.push_results.lock().unwrap().push_back(result);
    }

    pub fn set_health(&self, result: PortResult<HealthReport>) {
        *self.health.lock().unwrap() = Some(result);
    }

    pub fn set_voice_health(&self, result: PortResult<HealthReport>) {
        *self.voice_health.lock().unwrap() = Some(result);
    }

    /// Makes `process` calls block until the returned semaphore hands out permits.
    pub fn hold_calls(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.hold.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn tiers_called(&self) -> Vec<EndpointTier> {
        self.calls.lock().unwrap().iter().map(|(tier, _, _)| *tier).collect()
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentPlatform for FakePlatform {
    async fn process(
        &self,
        tier: EndpointTier,
        bearer: Option<&str>,
        request: &AgentRequest,
    ) -> PortResult<AgentReply> {
        self.calls
            .lock()
            .unwrap()
            .push((tier, request.clone(), bearer.map(str::to_string)));
        let hold = self.hold.lock().unwrap().clone();
        if let Some(gate) = hold {
            gate.acquire().await.unwrap().forget();
        }
        let queue = match tier {
            EndpointTier::Primary => &self.primary,
            EndpointTier::Test => &self.test,
        };
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(agent_reply("default answer", true, Some("conversation"))))
    }

    async fn generate_title(
        &self,
        tier: EndpointTier,
        _bearer: Option<&str>,
        _request: &TitleRequest,
    ) -> PortResult<TitleReply> {
        self.title_calls.lock().unwrap().push(tier);
        let slot = match tier {
            EndpointTier::Primary => &self.primary_title,
            EndpointTier::Test => &self.test_title,
        };
        slot.lock().unwrap().clone().unwrap_or_else(|| {
            Err(PortError::Network("title endpoint not scripted".to_string()))
        })
    }

    async fn update_context(
        &self,
        _bearer: Option<&str>,
        push: &ContextPush,
    ) -> PortResult<ContextPushReply> {
        self.pushes.lock().unwrap().push(push.clone());
        self.push_results.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ContextPushReply {
                success: true,
                message: "updated".to_string(),
                context: None,
                agent_id: push.agent_id.clone(),
                knowledge_base_updated: true,
            })
        })
    }

    async fn fetch_context(
        &self,
        _bearer: Option<&str>,
        _student_id: Uuid,
        _course_id: Uuid,
    ) -> PortResult<ContextLookup> {
        Ok(ContextLookup {
            success: true,
            context: None,
            message: "ok".to_string(),
        })
    }

    async fn health(&self) -> PortResult<HealthReport> {
        self.health.lock().unwrap().clone().unwrap_or_else(|| Ok(healthy()))
    }

    async fn voice_health(&self) -> PortResult<HealthReport> {
        self.voice_health
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(healthy()))
    }
}
