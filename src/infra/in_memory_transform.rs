use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::app::ports::{CoordinateTransformPort, TransformRequest};
use crate::domain::Build;
use crate::error::{ReconcileError, Result};

/// In-memory coordinate transform for development/testing.
///
/// Lifts are looked up by `(source, target, position)`; positions without an entry come
/// back unmapped. Every request is recorded so tests can assert on batching.
#[derive(Clone, Default)]
pub struct InMemoryTransformService {
    mappings: Arc<Mutex<HashMap<(Build, Build), HashMap<u64, u64>>>>,
    unavailable: Arc<Mutex<HashSet<(Build, Build)>>>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<TransformRequest>>>,
}

impl InMemoryTransformService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(self, source: Build, target: Build, from: u64, to: u64) -> Self {
        self.mappings
            .lock()
            .unwrap()
            .entry((source, target))
            .or_default()
            .insert(from, to);
        self
    }

    /// Behave as if the chain for `source -> target` were missing
    pub fn with_unavailable(self, source: Build, target: Build) -> Self {
        self.unavailable.lock().unwrap().insert((source, target));
        self
    }

    /// Sleep before answering every request, to exercise timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<TransformRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CoordinateTransformPort for InMemoryTransformService {
    async fn transform(&self, request: TransformRequest) -> Result<BTreeMap<String, u64>> {
        self.calls.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let pair = (request.source, request.target);
        if self.unavailable.lock().unwrap().contains(&pair) {
            return Err(ReconcileError::TransformUnavailable {
                source_build: request.source,
                target_build: request.target,
                reason: "no chain registered".to_string(),
            });
        }

        let mappings = self.mappings.lock().unwrap();
        let lifted = mappings.get(&pair);
        Ok(request
            .loci
            .into_iter()
            .filter_map(|(id, position)| {
                lifted
                    .and_then(|m| m.get(&position))
                    .map(|value| (id, *value))
            })
            .collect())
    }
}
