//! Liveness report built from named health checks

use crate::monitoring::{QueueHealth, MAX_ACTIVE_JOBS};
use crate::queues::Queues;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Health status of a component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy { reason: String },
    Degraded { reason: String },
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self::Healthy
    }

    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::Unhealthy {
            reason: reason.into(),
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::Degraded {
            reason: reason.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Overall health check result
#[derive(Debug, Serialize)]
pub struct HealthCheckResult {
    #[serde(flatten)]
    pub status: HealthStatus,
    pub checks: BTreeMap<String, HealthStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub type HealthCheckFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = HealthStatus> + Send>> + Send + Sync>;

#[derive(Clone)]
pub struct HealthCheck {
    checks: BTreeMap<String, HealthCheckFn>,
    version: Option<String>,
}

impl HealthCheck {
    /// Run every check concurrently and fold the results into one status
    pub async fn execute(&self) -> HealthCheckResult {
        let runs = self
            .checks
            .iter()
            .map(|(name, check)| async move { (name.clone(), check().await) });
        let results: BTreeMap<String, HealthStatus> = join_all(runs).await.into_iter().collect();

        let status = if results.values().any(HealthStatus::is_unhealthy) {
            HealthStatus::unhealthy("one or more checks failed")
        } else if results.values().any(HealthStatus::is_degraded) {
            HealthStatus::degraded("one or more checks degraded")
        } else {
            HealthStatus::Healthy
        };

        HealthCheckResult {
            status,
            checks: results,
            version: self.version.clone(),
            timestamp: Utc::now(),
        }
    }
}

pub struct HealthCheckBuilder {
    checks: BTreeMap<String, HealthCheckFn>,
    version: Option<String>,
}

impl HealthCheckBuilder {
    pub fn new() -> Self {
        Self {
            checks: BTreeMap::new(),
            version: None,
        }
    }

    pub fn add_check<F, Fut>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HealthStatus> + Send + 'static,
    {
        let check_fn: HealthCheckFn = Arc::new(move || {
            Box::pin(check()) as Pin<Box<dyn Future<Output = HealthStatus> + Send>>
        });
        self.checks.insert(name.into(), check_fn);
        self
    }

    /// One check per named queue: paused or overloaded is degraded, an
    /// unreachable backend is unhealthy.
    pub fn add_queue_checks(mut self, queues: &Queues) -> Self {
        for (name, queue) in queues.iter() {
            let queue = queue.clone();
            self = self.add_check(format!("queue:{}", name), move || {
                let queue = queue.clone();
                async move {
                    match QueueHealth::read(&queue).await {
                        Ok(health) => queue_status(&health),
                        Err(e) => HealthStatus::unhealthy(e.to_string()),
                    }
                }
            });
        }
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn build(self) -> HealthCheck {
        HealthCheck {
            checks: self.checks,
            version: self.version,
        }
    }
}

impl Default for HealthCheckBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn queue_status(health: &QueueHealth) -> HealthStatus {
    if health.paused {
        HealthStatus::degraded("paused")
    } else if health.active >= MAX_ACTIVE_JOBS {
        HealthStatus::degraded(format!("{} active jobs", health.active))
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_queues_are_healthy() {
        let result = HealthCheckBuilder::new()
            .add_queue_checks(&Queues::in_memory())
            .add_check("crm", || async { HealthStatus::Healthy })
            .version("0.1.0")
            .build()
            .execute()
            .await;

        assert!(result.status.is_healthy());
        assert_eq!(result.checks.len(), 7);
        assert_eq!(result.version.as_deref(), Some("0.1.0"));
    }

    #[tokio::test]
    async fn unhealthy_wins_over_degraded() {
        let health = HealthCheckBuilder::new()
            .add_check("queue:email", || async { HealthStatus::degraded("paused") })
            .add_check("crm", || async { HealthStatus::unhealthy("connection refused") })
            .build();
        assert!(health.execute().await.status.is_unhealthy());
    }

    #[tokio::test]
    async fn paused_queue_degrades_report() {
        let queues = Queues::in_memory();
        queues.email().pause().await.unwrap();

        let result = HealthCheckBuilder::new()
            .add_queue_checks(&queues)
            .build()
            .execute()
            .await;

        assert!(result.status.is_degraded());
        assert_eq!(result.checks.len(), 6);
        assert_eq!(
            result.checks["queue:email"],
            HealthStatus::degraded("paused")
        );
        assert!(result.checks["queue:seo-tasks"].is_healthy());
    }

    #[test]
    fn status_serialization() {
        let value = serde_json::to_value(HealthStatus::degraded("paused")).unwrap();
        assert_eq!(value, serde_json::json!({"status": "degraded", "reason": "paused"}));
        let value = serde_json::to_value(HealthStatus::Healthy).unwrap();
        assert_eq!(value, serde_json::json!({"status": "healthy"}));
    }
}
