use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use super::domain::{AuditEvent, CompanyData, EvaluationId, EvaluationState, ScenarioId};
use super::scenario::{Scenario, SimulationResult};

struct EvaluationEntry {
    company: Arc<CompanyData>,
    state: EvaluationState,
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<EvaluationId, Arc<Mutex<EvaluationEntry>>>,
    order: VecDeque<EvaluationId>,
}

/// Keyed state for in-flight and completed evaluations.
///
/// Each evaluation sits behind its own mutex so reads and writes for one id are
/// linearizable while unrelated evaluations never contend beyond the map lookup.
/// Past the retention limit the oldest terminal evaluations are evicted;
/// in-flight evaluations are never evicted. Durable history belongs to the
/// `RecordPublisher` sink.
pub struct EvaluationStateStore {
    entries: RwLock<Entries>,
    retention: usize,
}

impl Default for EvaluationStateStore {
    fn default() -> Self {
        Self::with_retention(usize::MAX)
    }
}

impl EvaluationStateStore {
    pub fn with_retention(retention: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            retention: retention.max(1),
        }
    }

    pub fn insert(
        &self,
        company: Arc<CompanyData>,
        state: EvaluationState,
    ) -> Result<(), StoreError> {
        let mut guard = self.entries.write().expect("store lock poisoned");
        if guard.by_id.contains_key(&state.evaluation_id) {
            return Err(StoreError::Conflict(state.evaluation_id));
        }
        guard.order.push_back(state.evaluation_id.clone());
        guard.by_id.insert(
            state.evaluation_id.clone(),
            Arc::new(Mutex::new(EvaluationEntry { company, state })),
        );
        self.evict(&mut guard);
        Ok(())
    }

    pub fn snapshot(&self, id: &EvaluationId) -> Result<EvaluationState, StoreError> {
        let entry = self.entry(id)?;
        let guard = entry.lock().expect("evaluation lock poisoned");
        Ok(guard.state.clone())
    }

    pub fn company(&self, id: &EvaluationId) -> Result<Arc<CompanyData>, StoreError> {
        let entry = self.entry(id)?;
        let guard = entry.lock().expect("evaluation lock poisoned");
        Ok(guard.company.clone())
    }

    /// Apply a mutation to a non-terminal evaluation under its lock.
    pub fn modify<T>(
        &self,
        id: &EvaluationId,
        mutation: impl FnOnce(&mut EvaluationState) -> T,
    ) -> Result<T, StoreError> {
        let entry = self.entry(id)?;
        let mut guard = entry.lock().expect("evaluation lock poisoned");
        if guard.state.status.is_terminal() {
            return Err(StoreError::Terminal(id.clone()));
        }
        Ok(mutation(&mut guard.state))
    }

    /// Most recent audit events across retained evaluations, oldest first.
    pub fn recent_audit(&self, limit: usize) -> Vec<AuditEvent> {
        let entries: Vec<_> = self
            .entries
            .read()
            .expect("store lock poisoned")
            .by_id
            .values()
            .cloned()
            .collect();
        let mut events: Vec<AuditEvent> = entries
            .iter()
            .flat_map(|entry| entry.lock().expect("evaluation lock poisoned").state.audit.clone())
            .collect();
        events.sort_by_key(|event| event.at);
        let skip = events.len().saturating_sub(limit);
        events.split_off(skip)
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("store lock poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &EvaluationId) -> Result<Arc<Mutex<EvaluationEntry>>, StoreError> {
        self.entries
            .read()
            .expect("store lock poisoned")
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn evict(&self, entries: &mut Entries) {
        while entries.by_id.len() > self.retention {
            let position = entries.order.iter().position(|id| {
                entries.by_id.get(id).is_some_and(|entry| {
                    entry
                        .lock()
                        .expect("evaluation lock poisoned")
                        .state
                        .status
                        .is_terminal()
                })
            });
            let Some(id) = position.and_then(|position| entries.order.remove(position)) else {
                break;
            };
            entries.by_id.remove(&id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("evaluation {0} not found")]
    NotFound(EvaluationId),
    #[error("evaluation {0} already exists")]
    Conflict(EvaluationId),
    #[error("evaluation {0} is terminal and read-only")]
    Terminal(EvaluationId),
}

type ScenarioSlot = (Arc<Scenario>, Option<Arc<SimulationResult>>);

#[derive(Default)]
struct Scenarios {
    by_id: HashMap<ScenarioId, ScenarioSlot>,
    order: VecDeque<ScenarioId>,
}

/// Scenarios created by callers and their most recent simulation.
///
/// Holds at most `retention` scenarios; the oldest is dropped first.
pub struct ScenarioRegistry {
    scenarios: RwLock<Scenarios>,
    retention: usize,
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self::with_retention(usize::MAX)
    }
}

impl ScenarioRegistry {
    pub fn with_retention(retention: usize) -> Self {
        Self {
            scenarios: RwLock::new(Scenarios::default()),
            retention: retention.max(1),
        }
    }

    pub fn insert(&self, scenario: Scenario) -> Arc<Scenario> {
        let scenario = Arc::new(scenario);
        let mut guard = self.scenarios.write().expect("scenario lock poisoned");
        let id = scenario.scenario_id.clone();
        if guard
            .by_id
            .insert(id.clone(), (scenario.clone(), None))
            .is_none()
        {
            guard.order.push_back(id);
        }
        while guard.by_id.len() > self.retention {
            let Some(oldest) = guard.order.pop_front() else {
                break;
            };
            guard.by_id.remove(&oldest);
        }
        scenario
    }

    pub fn get(&self, id: &ScenarioId) -> Option<Arc<Scenario>> {
        self.scenarios
            .read()
            .expect("scenario lock poisoned")
            .by_id
            .get(id)
            .map(|(scenario, _)| scenario.clone())
    }

    pub fn simulation(&self, id: &ScenarioId) -> Option<Arc<SimulationResult>> {
        self.scenarios
            .read()
            .expect("scenario lock poisoned")
            .by_id
            .get(id)
            .and_then(|(_, simulation)| simulation.clone())
    }

    pub fn record_simulation(&self, result: SimulationResult) -> Arc<SimulationResult> {
        let result = Arc::new(result);
        if let Some(entry) = self
            .scenarios
            .write()
            .expect("scenario lock poisoned")
            .by_id
            .get_mut(&result.scenario_id)
        {
            entry.1 = Some(result.clone());
        }
        result
    }

    pub fn len(&self) -> usize {
        self.scenarios
            .read()
            .expect("scenario lock poisoned")
            .by_id
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
