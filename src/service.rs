use std::sync::Arc;
use tracing::error;

use crate::{
    error::Result,
    limiter::{Decision, RateLimiter},
    matcher::RequestDescriptor,
    metrics::Metrics,
};

/// Instrumented entry point the HTTP layer talks to
pub struct RateLimitService {
    limiter: Arc<RateLimiter>,
    metrics: Arc<Metrics>,
}

impl RateLimitService {
    /// Create a new rate limit service
    pub fn new(limiter: RateLimiter, metrics: Arc<Metrics>) -> Self {
        Self {
            limiter: Arc::new(limiter),
            metrics,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Decide on a request and record the outcome
    pub async fn process(&self, request: &RequestDescriptor) -> Result<Decision> {
        let timer = self.metrics.start_decision_timer();
        let result = self.limiter.process(request).await;
        drop(timer);

        match &result {
            Ok(decision) => self.metrics.record_decision(outcome_label(decision)),
            Err(e) if e.is_store_unavailable() => {
                error!("Shared store unavailable while deciding on request: {}", e);
                self.metrics.record_store_error();
            }
            Err(e) => {
                error!("Failed to decide on request: {}", e);
                self.metrics.record_processing_error();
            }
        }

        result
    }

    /// Clear the window a request would count against
    pub async fn reset(&self, request: &RequestDescriptor) -> Result<bool> {
        let cleared = self.limiter.reset(request).await?;
        if cleared {
            self.metrics.record_manual_reset();
        }
        Ok(cleared)
    }

    /// Health check for the service
    pub async fn health_check(&self) -> Result<()> {
        self.limiter.health_check().await
    }
}

fn outcome_label(decision: &Decision) -> &'static str {
    match decision {
        Decision::Bypass => "bypassed",
        Decision::Admitted { .. } => "admitted",
        Decision::Rejected { .. } => "rejected",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{EngineConfig, RateLimitConfig},
        store::MemoryStore,
    };

    fn create_test_service(limit: u32) -> RateLimitService {
        let config = EngineConfig::compile(RateLimitConfig {
            limit,
            whitelist: vec!["10.0.0.9".to_string()],
            ..Default::default()
        })
        .unwrap();
        let limiter = RateLimiter::new(config, Arc::new(MemoryStore::new()));
        let metrics = Arc::new(Metrics::new().unwrap());

        RateLimitService::new(limiter, metrics)
    }

    fn decision_count(service: &RateLimitService, outcome: &str) -> f64 {
        service
            .metrics()
            .registry()
            .gather()
            .iter()
            .filter(|f| f.get_name() == "ratelimit_decisions_total")
            .flat_map(|f| f.get_metric())
            .filter(|m| m.get_label().iter().any(|l| l.get_value() == outcome))
            .map(|m| m.get_counter().get_value())
            .sum()
    }

    #[tokio::test]
    async fn test_outcomes_are_recorded() {
        let service = create_test_service(2);
        let client = RequestDescriptor::get("10.0.0.1", "/");
        let whitelisted = RequestDescriptor::get("10.0.0.9", "/");

        service.process(&client).await.unwrap();
        service.process(&client).await.unwrap();
        service.process(&whitelisted).await.unwrap();

        assert_eq!(decision_count(&service, "admitted"), 1.0);
        assert_eq!(decision_count(&service, "rejected"), 1.0);
        assert_eq!(decision_count(&service, "bypassed"), 1.0);
    }

    #[tokio::test]
    async fn test_reset_and_health() {
        let service = create_test_service(5);
        let client = RequestDescriptor::get("10.0.0.1", "/");

        service.process(&client).await.unwrap();
        assert!(service.reset(&client).await.unwrap());
        assert!(service.health_check().await.is_ok());
    }
}
