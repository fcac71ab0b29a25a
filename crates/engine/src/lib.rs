//! Notification engine: orchestration, scheduling, preferences and the
//! service facade the rest of the marketplace consumes.

pub mod metrics;
pub mod orchestrator;
pub mod preferences;
pub mod scheduler;
pub mod service;

pub use metrics::{ChannelPerformance, DeliveryMetrics, MetricsFilter, MetricsStore};
pub use orchestrator::Orchestrator;
pub use preferences::PreferenceResolver;
pub use scheduler::Dispatcher;
pub use service::NotificationService;
