//! Registry of per-target circuit breakers.
//!
//! Breaker state lives for the life of the process (or until the target is
//! deregistered) and is shared by every call sequence to that target. Callers
//! get an `Arc<CircuitBreaker>` handle; state only changes through permits.

use dashmap::DashMap;
use std::sync::Arc;

use crate::config::CircuitBreakerConfig;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker};

/// Maps target name to its shared breaker.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create an empty registry; new breakers use `config`.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Get the breaker for `target`, creating a closed one on first use.
    pub fn get_or_register(&self, target: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(target) {
            return existing.clone();
        }

        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| {
                tracing::debug!(target_name = %target, "Registering circuit breaker");
                Arc::new(CircuitBreaker::new(target, &self.config))
            })
            .clone()
    }

    pub fn get(&self, target: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(target).map(|b| b.clone())
    }

    /// Forget `target`. Handles already held keep working on the old state.
    pub fn deregister(&self, target: &str) -> bool {
        self.breakers.remove(target).is_some()
    }

    /// Snapshot every registered breaker, sorted by target name.
    pub fn snapshot(&self) -> Vec<(String, BreakerSnapshot)> {
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
