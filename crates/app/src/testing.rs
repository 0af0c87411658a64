//! In-memory port implementations shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use homerule_domain::automation::{
    Automation, ComponentKind, RuleComponent, Trigger, TriggerConfig, TriggerType,
};
use homerule_domain::error::{ConflictError, HomeRuleError, NotFoundError};
use homerule_domain::event::{Event, EventType};
use homerule_domain::execution::{AutomationExecution, ExecutionQuery, query_matches};
use homerule_domain::feed::Feed;
use homerule_domain::id::{AutomationId, ExecutionId, FeedId, PremisesId, TriggerId};
use homerule_domain::time::Timestamp;

use crate::ports::{
    AdmissionGuard, AutomationRepository, ComponentRepository, EventPublisher,
    ExecutionRepository, FeedFacade, TriggerRepository,
};

// ── Automations ────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryAutomations {
    store: Mutex<HashMap<AutomationId, Automation>>,
    broken_lookups: Mutex<HashSet<TriggerId>>,
}

impl InMemoryAutomations {
    pub fn with(automations: Vec<Automation>) -> Self {
        let map = automations
            .into_iter()
            .map(|mut a| {
                a.version = 1;
                (a.id, a)
            })
            .collect();
        Self {
            store: Mutex::new(map),
            broken_lookups: Mutex::default(),
        }
    }

    /// Make candidate lookups for `trigger_id` fail like an unreachable store.
    pub fn fail_lookups_for(&self, trigger_id: TriggerId) {
        self.broken_lookups.lock().unwrap().insert(trigger_id);
    }
}

impl AutomationRepository for InMemoryAutomations {
    async fn create(&self, mut automation: Automation) -> Result<Automation, HomeRuleError> {
        let mut store = self.store.lock().unwrap();
        let key = automation.definition_key();
        if store
            .values()
            .any(|a| a.premises_id == automation.premises_id && a.definition_key() == key)
        {
            return Err(ConflictError::Duplicate {
                entity: "automation",
                premises_id: automation.premises_id,
            }
            .into());
        }
        automation.version = 1;
        store.insert(automation.id, automation.clone());
        Ok(automation)
    }

    async fn get_by_id(&self, id: AutomationId) -> Result<Option<Automation>, HomeRuleError> {
        Ok(self.store.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_premises(
        &self,
        premises_id: PremisesId,
    ) -> Result<Vec<Automation>, HomeRuleError> {
        let mut found: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.premises_id == premises_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn find_trigger_candidates(
        &self,
        premises_id: PremisesId,
        trigger_id: TriggerId,
        now: Timestamp,
    ) -> Result<Vec<Automation>, HomeRuleError> {
        if self.broken_lookups.lock().unwrap().contains(&trigger_id) {
            return Err(HomeRuleError::Storage("automation store unreachable".into()));
        }
        Ok(self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.premises_id == premises_id && a.listens_to(trigger_id))
            .filter(|a| a.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn update(&self, mut automation: Automation) -> Result<Automation, HomeRuleError> {
        let mut store = self.store.lock().unwrap();
        match store.get(&automation.id) {
            Some(stored) if stored.version == automation.version => {
                automation.version += 1;
                store.insert(automation.id, automation.clone());
                Ok(automation)
            }
            Some(_) => Err(ConflictError::VersionMismatch {
                entity: "automation",
                id: automation.id.to_string(),
                expected: automation.version,
            }
            .into()),
            None => Err(NotFoundError {
                entity: "automation",
                id: automation.id.to_string(),
            }
            .into()),
        }
    }
}

// ── Components ─────────────────────────────────────────────────

struct StoredComponent {
    kind: ComponentKind,
    premises_id: PremisesId,
    definition_key: String,
    value: serde_json::Value,
}

#[derive(Default)]
pub struct InMemoryComponents {
    store: Mutex<HashMap<String, StoredComponent>>,
}

impl InMemoryComponents {
    pub fn insert<C: RuleComponent>(&self, component: &C) {
        self.store.lock().unwrap().insert(
            component.id().to_string(),
            StoredComponent {
                kind: C::KIND,
                premises_id: component.premises_id(),
                definition_key: component.definition_key(),
                value: serde_json::to_value(component).unwrap(),
            },
        );
    }

    fn triggers(&self) -> Vec<Trigger> {
        self.store
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.kind == ComponentKind::Trigger)
            .map(|c| serde_json::from_value(c.value.clone()).unwrap())
            .collect()
    }
}

impl ComponentRepository for InMemoryComponents {
    async fn create<C: RuleComponent>(&self, component: C) -> Result<C, HomeRuleError> {
        let key = component.definition_key();
        let duplicate = self.store.lock().unwrap().values().any(|c| {
            c.kind == C::KIND && c.premises_id == component.premises_id() && c.definition_key == key
        });
        if duplicate {
            return Err(ConflictError::Duplicate {
                entity: C::KIND.as_str(),
                premises_id: component.premises_id(),
            }
            .into());
        }
        self.insert(&component);
        Ok(component)
    }

    async fn get_by_id<C: RuleComponent>(&self, id: C::Id) -> Result<Option<C>, HomeRuleError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .get(&id.to_string())
            .filter(|c| c.kind == C::KIND)
            .map(|c| serde_json::from_value(c.value.clone()).unwrap()))
    }

    async fn find_by_premises<C: RuleComponent>(
        &self,
        premises_id: PremisesId,
    ) -> Result<Vec<C>, HomeRuleError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.kind == C::KIND && c.premises_id == premises_id)
            .map(|c| serde_json::from_value(c.value.clone()).unwrap())
            .collect())
    }
}

impl TriggerRepository for InMemoryComponents {
    async fn find_triggers_by_type(
        &self,
        premises_id: Option<PremisesId>,
        trigger_type: TriggerType,
    ) -> Result<Vec<Trigger>, HomeRuleError> {
        Ok(self
            .triggers()
            .into_iter()
            .filter(|t| t.trigger_type() == trigger_type)
            .filter(|t| premises_id.is_none_or(|p| p == t.premises_id))
            .collect())
    }

    async fn find_triggers_by_feed(&self, feed_id: FeedId) -> Result<Vec<Trigger>, HomeRuleError> {
        Ok(self
            .triggers()
            .into_iter()
            .filter(|t| matches!(&t.config, TriggerConfig::Feed(f) if f.feed_id == feed_id))
            .collect())
    }
}

// ── Executions ─────────────────────────────────────────────────

/// A concurrent writer cancelling a record behind the engine's back.
#[derive(Debug, Clone, Copy)]
enum Interference {
    /// Cancel the stored record just before a save that moves it to `index`.
    CancelBeforeSaving { index: usize },
    /// Cancel every record returned by the next query, after reading them.
    CancelAfterScan,
}

#[derive(Default)]
pub struct InMemoryExecutions {
    store: Mutex<Vec<AutomationExecution>>,
    interference: Mutex<Option<Interference>>,
}

fn cancel_stored(store: &mut [AutomationExecution], id: ExecutionId) {
    if let Some(stored) = store.iter_mut().find(|e| e.id == id) {
        let at = stored.updated_at;
        stored.cancel(at).unwrap();
        stored.version += 1;
    }
}

impl InMemoryExecutions {
    /// Cancel the run once, right before the engine records reaching `index`.
    pub fn cancel_before_saving_index(&self, index: usize) {
        *self.interference.lock().unwrap() = Some(Interference::CancelBeforeSaving { index });
    }

    /// Cancel whatever the next query finds, once it has been read.
    pub fn cancel_after_next_scan(&self) {
        *self.interference.lock().unwrap() = Some(Interference::CancelAfterScan);
    }

    /// Insert a record as-is, bypassing admission.
    pub fn seed(&self, mut execution: AutomationExecution) -> AutomationExecution {
        execution.version = 1;
        self.store.lock().unwrap().push(execution.clone());
        execution
    }

    pub fn all(&self) -> Vec<AutomationExecution> {
        self.store.lock().unwrap().clone()
    }

    pub fn get(&self, id: ExecutionId) -> AutomationExecution {
        self.all().into_iter().find(|e| e.id == id).unwrap()
    }
}

impl ExecutionRepository for InMemoryExecutions {
    async fn create(
        &self,
        mut execution: AutomationExecution,
        guard: AdmissionGuard,
    ) -> Result<AutomationExecution, HomeRuleError> {
        let mut store = self.store.lock().unwrap();
        if guard == AdmissionGuard::Exclusive
            && store
                .iter()
                .any(|e| e.automation_id == execution.automation_id && e.status.is_active())
        {
            return Err(ConflictError::ActiveExecution {
                automation_id: execution.automation_id,
            }
            .into());
        }
        execution.version = 1;
        store.push(execution.clone());
        Ok(execution)
    }

    async fn save(
        &self,
        mut execution: AutomationExecution,
    ) -> Result<AutomationExecution, HomeRuleError> {
        let mut store = self.store.lock().unwrap();
        let mut interference = self.interference.lock().unwrap();
        if let Some(Interference::CancelBeforeSaving { index }) = *interference
            && execution.current_action_index == index
        {
            *interference = None;
            cancel_stored(&mut store, execution.id);
        }
        drop(interference);
        let stored = store
            .iter_mut()
            .find(|e| e.id == execution.id && e.version == execution.version)
            .ok_or_else(|| ConflictError::VersionMismatch {
                entity: "execution",
                id: execution.id.to_string(),
                expected: execution.version,
            })?;
        execution.version += 1;
        *stored = execution.clone();
        Ok(execution)
    }

    async fn get_by_id(
        &self,
        id: ExecutionId,
    ) -> Result<Option<AutomationExecution>, HomeRuleError> {
        Ok(self.store.lock().unwrap().iter().find(|e| e.id == id).cloned())
    }

    async fn find(&self, query: ExecutionQuery) -> Result<Vec<AutomationExecution>, HomeRuleError> {
        let mut store = self.store.lock().unwrap();
        let found: Vec<_> = store
            .iter()
            .filter(|e| query_matches(&query, e))
            .cloned()
            .collect();
        let mut interference = self.interference.lock().unwrap();
        if let Some(Interference::CancelAfterScan) = *interference {
            *interference = None;
            for execution in &found {
                cancel_stored(&mut store, execution.id);
            }
        }
        Ok(found)
    }
}

// ── Feeds ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryFeeds {
    store: Mutex<HashMap<FeedId, Feed>>,
    reads: Mutex<usize>,
}

impl InMemoryFeeds {
    pub fn with(feeds: Vec<Feed>) -> Self {
        Self {
            store: Mutex::new(feeds.into_iter().map(|f| (f.id, f)).collect()),
            reads: Mutex::new(0),
        }
    }

    pub fn value_of(&self, id: FeedId) -> f64 {
        self.store.lock().unwrap()[&id].current_value
    }

    pub fn remove(&self, id: FeedId) {
        self.store.lock().unwrap().remove(&id);
    }

    /// How many times a feed has been looked up.
    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

impl FeedFacade for InMemoryFeeds {
    async fn get_feed_by_id(&self, id: FeedId) -> Result<Option<Feed>, HomeRuleError> {
        *self.reads.lock().unwrap() += 1;
        Ok(self.store.lock().unwrap().get(&id).cloned())
    }

    async fn send_value(
        &self,
        id: FeedId,
        value: f64,
        at: Timestamp,
    ) -> Result<(Feed, f64), HomeRuleError> {
        let mut store = self.store.lock().unwrap();
        let feed = store.get_mut(&id).ok_or_else(|| NotFoundError {
            entity: "feed",
            id: id.to_string(),
        })?;
        let previous = feed.record(value, at);
        Ok((feed.clone(), previous))
    }
}

// ── Publisher ──────────────────────────────────────────────────

#[derive(Default)]
pub struct SpyPublisher {
    events: Mutex<Vec<Event>>,
}

impl SpyPublisher {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_type(&self, event_type: EventType) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

impl EventPublisher for SpyPublisher {
    async fn publish(&self, event: Event) -> Result<(), HomeRuleError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
