//! crates/classroom_agent_core/src/health.rs
//!
//! Advisory availability checks of the agent platform. Nothing here gates sending:
//! the send pipeline always makes its own call and relies on its own outcome.

use crate::domain::{HealthReport, HealthStatus, Readiness};
use crate::ports::{AgentPlatform, PortError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct HealthMonitor {
    platform: Arc<dyn AgentPlatform>,
}

impl HealthMonitor {
    pub fn new(platform: Arc<dyn AgentPlatform>) -> Self {
        Self { platform }
    }

    /// Checks the main health endpoint. Transport failures become an unhealthy,
    /// unavailable report rather than an error.
    pub async fn check_health(&self) -> HealthReport {
        match self.platform.health().await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Agent platform health check failed.");
                HealthReport {
                    status: HealthStatus::Unhealthy,
                    available: false,
                    message: format!("Agent platform unreachable: {}", e),
                }
            }
        }
    }

    /// ready: healthy and available, voice agent included.
    /// degraded: reachable, but something reports trouble.
    /// unreachable: no response at all.
    pub async fn classify(&self) -> Readiness {
        let report = match self.platform.health().await {
            Ok(report) => report,
            Err(PortError::Network(e)) => {
                debug!(error = %e, "Agent platform unreachable.");
                return Readiness::Unreachable;
            }
            Err(e) => {
                debug!(error = %e, "Agent platform answered with an error status.");
                return Readiness::Degraded;
            }
        };
        if !is_up(&report) {
            return Readiness::Degraded;
        }

        match self.platform.voice_health().await {
            Ok(voice) if is_up(&voice) => Readiness::Ready,
            Ok(_) | Err(_) => Readiness::Degraded,
        }
    }

    /// Re-classifies the platform every `interval` until `cancel` fires. The first
    /// check runs immediately; until it completes the platform counts as unreachable.
    pub fn spawn_polling(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> (watch::Receiver<Readiness>, JoinHandle<()>) {
        let (sender, receiver) = watch::channel(Readiness::Unreachable);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Health polling stopped.");
                        break;
                    }
                    _ = ticker.tick() => {
                        let readiness = self.classify().await;
                        sender.send_if_modified(|current| {
                            if *current != readiness {
                                info!(from = ?current, to = ?readiness, "Agent platform readiness changed.");
                                *current = readiness;
                                true
                            } else {
                                false
                            }
                        });
                    }
                }
            }
        });
        (receiver, handle)
    }
}

fn is_up(report: &HealthReport) -> bool {
    report.status == HealthStatus::Healthy && report.available
}
