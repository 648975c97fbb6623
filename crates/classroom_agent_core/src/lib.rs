pub mod cache;
pub mod document;
pub mod domain;
pub mod health;
pub mod memory;
pub mod orchestrator;
pub mod outcome;
pub mod ports;
pub mod profile;
pub mod sync;
pub mod synced_store;
pub mod title;

#[cfg(test)]
mod testing;

pub use cache::{ContextCache, EntryState};
pub use domain::{
    AgentCallStatus, ContextSnapshot, HealthReport, HealthStatus, Message, Readiness, Session,
    SyncSubject, Thread, User,
};
pub use health::HealthMonitor;
pub use orchestrator::{ConversationOrchestrator, SendReport};
pub use ports::{
    AgentPlatform, ClassroomStore, ConversationStore, EndpointTier, MutationObserver, PortError,
    PortResult,
};
pub use profile::ProfileService;
pub use sync::{ContextSynchronizer, SyncConfig, SyncFailure, SyncPolicy};
pub use synced_store::SyncedClassroomStore;
pub use title::TitleChain;
