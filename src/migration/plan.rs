//! Migration plans: named state graphs walked by the upgrader
//!
//! A plan is authored as a chain of transitions, one per shipped version:
//!
//! ```rust,no_run
//! # use tidemark::migration::{Migration, MigrationContext, PlanBuilder};
//! # use tidemark::MigrationError;
//! # #[derive(Default)] struct AddFooTable;
//! # impl Migration for AddFooTable {
//! #     fn migrate(&self, _: &MigrationContext<'_>) -> Result<(), MigrationError> { Ok(()) }
//! # }
//! # #[derive(Default)] struct AddFooIndex;
//! # impl Migration for AddFooIndex {
//! #     fn migrate(&self, _: &MigrationContext<'_>) -> Result<(), MigrationError> { Ok(()) }
//! # }
//! let plan = PlanBuilder::new("core")
//!     .from("init")
//!     .to::<AddFooTable>("v1")
//!     .to::<AddFooIndex>("v2")
//!     .build()?;
//! assert_eq!(plan.final_state(), "v2");
//! # Ok::<(), MigrationError>(())
//! ```
//!
//! Every state has at most one outgoing transition. Several states may lead
//! into the same target, so an older branch can converge onto the main line.

use super::migration::{factory_of, short_type_name, Migration, StepFactory};
use crate::error::MigrationError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// State of a database on which the plan has never run
pub const INITIAL_STATE: &str = "";

/// One edge of the plan graph
#[derive(Clone)]
pub struct Transition {
    source: String,
    target: String,
    step_name: String,
    factory: StepFactory,
}

impl Transition {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// A fresh step instance
    pub fn create_step(&self) -> Box<dyn Migration> {
        (self.factory)()
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("step_name", &self.step_name)
            .finish()
    }
}

/// Step run once after a run that applied at least one transition
#[derive(Clone)]
pub struct PostMigration {
    name: String,
    factory: StepFactory,
}

impl PostMigration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_step(&self) -> Box<dyn Migration> {
        (self.factory)()
    }
}

impl fmt::Debug for PostMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostMigration").field("name", &self.name).finish()
    }
}

/// A validated plan
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    name: String,
    initial_state: String,
    final_state: String,
    /// Keyed by source state
    transitions: HashMap<String, Transition>,
    post_migrations: Vec<PostMigration>,
}

impl MigrationPlan {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// State assumed when the state store has no row for this plan
    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    pub fn final_state(&self) -> &str {
        &self.final_state
    }

    pub fn post_migrations(&self) -> &[PostMigration] {
        &self.post_migrations
    }

    /// Whether `state` is a node of the graph
    pub fn contains_state(&self, state: &str) -> bool {
        state == self.final_state || self.transitions.contains_key(state)
    }

    /// Every state of the graph, sorted
    pub fn states(&self) -> Vec<&str> {
        let mut states: Vec<&str> = self
            .transitions
            .values()
            .flat_map(|t| [t.source.as_str(), t.target.as_str()])
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        states.sort_unstable();
        states
    }

    /// Ordered transitions leading from `current` to the final state
    ///
    /// Returns `None` when `current` is not a state of this plan, and an empty
    /// list when it already is the final state.
    pub fn steps_from(&self, current: &str) -> Option<Vec<&Transition>> {
        if !self.contains_state(current) {
            return None;
        }
        let mut steps = Vec::new();
        let mut state = current;
        while let Some(transition) = self.transitions.get(state) {
            steps.push(transition);
            state = &transition.target;
        }
        Some(steps)
    }
}

/// Authoring cursor for a [`MigrationPlan`]
///
/// [`from`](Self::from) moves the cursor; [`to`](Self::to) adds a transition
/// from the cursor and advances it to the target. The first `from` before any
/// transition also sets the plan's initial state. Graph errors are reported
/// by [`build`](Self::build).
pub struct PlanBuilder {
    name: String,
    initial_state: String,
    cursor: String,
    transitions: Vec<Transition>,
    post_migrations: Vec<PostMigration>,
}

impl PlanBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_state: INITIAL_STATE.to_string(),
            cursor: INITIAL_STATE.to_string(),
            transitions: Vec::new(),
            post_migrations: Vec::new(),
        }
    }

    pub fn from(mut self, state: impl Into<String>) -> Self {
        self.cursor = state.into();
        if self.transitions.is_empty() {
            self.initial_state = self.cursor.clone();
        }
        self
    }

    /// Transition to `target` by running `M`
    pub fn to<M: Migration + Default + 'static>(self, target: impl Into<String>) -> Self {
        self.to_with(target, short_type_name::<M>(), factory_of::<M>())
    }

    /// Transition to `target` with an explicit step name and factory
    pub fn to_with(
        mut self,
        target: impl Into<String>,
        step_name: impl Into<String>,
        factory: StepFactory,
    ) -> Self {
        let target = target.into();
        self.transitions.push(Transition {
            source: std::mem::replace(&mut self.cursor, target.clone()),
            target,
            step_name: step_name.into(),
            factory,
        });
        self
    }

    pub fn post_migration<M: Migration + Default + 'static>(self) -> Self {
        self.post_migration_with(short_type_name::<M>(), factory_of::<M>())
    }

    pub fn post_migration_with(mut self, name: impl Into<String>, factory: StepFactory) -> Self {
        self.post_migrations.push(PostMigration {
            name: name.into(),
            factory,
        });
        self
    }

    /// Validate the graph
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidPlan` when the plan has no transitions,
    /// a state has two outgoing transitions, a transition loops back onto an
    /// earlier state, or the graph does not end in exactly one final state.
    pub fn build(self) -> Result<MigrationPlan, MigrationError> {
        let invalid = |reason: String| MigrationError::InvalidPlan {
            plan: self.name.clone(),
            reason,
        };

        if self.transitions.is_empty() {
            return Err(invalid("plan has no transitions".to_string()));
        }

        let mut by_source: HashMap<String, Transition> = HashMap::new();
        for transition in &self.transitions {
            if transition.source == transition.target {
                return Err(invalid(format!(
                    "step {} transitions state '{}' onto itself",
                    transition.step_name, transition.source
                )));
            }
            if let Some(existing) = by_source.get(&transition.source) {
                return Err(invalid(format!(
                    "state '{}' has two outgoing transitions ({} and {})",
                    transition.source, existing.step_name, transition.step_name
                )));
            }
            by_source.insert(transition.source.clone(), transition.clone());
        }

        let terminals: Vec<&str> = self
            .transitions
            .iter()
            .map(|t| t.target.as_str())
            .filter(|target| !by_source.contains_key(*target))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let final_state = match terminals.as_slice() {
            [single] => single.to_string(),
            [] => return Err(invalid("transitions form a cycle".to_string())),
            many => {
                let mut many = many.to_vec();
                many.sort_unstable();
                return Err(invalid(format!(
                    "plan has more than one final state: {}",
                    many.join(", ")
                )));
            }
        };

        // With one outgoing edge per state, a walk longer than the number of
        // edges has revisited a state.
        for start in by_source.keys() {
            let mut state = start.as_str();
            let mut hops = 0;
            while let Some(next) = by_source.get(state) {
                hops += 1;
                if hops > by_source.len() {
                    return Err(invalid(format!(
                        "transitions starting at '{}' form a cycle",
                        start
                    )));
                }
                state = &next.target;
            }
        }

        if !by_source.contains_key(&self.initial_state) {
            return Err(invalid(format!(
                "initial state '{}' has no outgoing transition",
                self.initial_state
            )));
        }

        Ok(MigrationPlan {
            name: self.name,
            initial_state: self.initial_state,
            final_state,
            transitions: by_source,
            post_migrations: self.post_migrations,
        })
    }
}

/// Plans known to the host, by name
#[derive(Debug, Default)]
pub struct PlanRegistry {
    plans: BTreeMap<String, Arc<MigrationPlan>>,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `MigrationError::InvalidPlan` if a plan with the same name is
    /// already registered.
    pub fn register(&mut self, plan: MigrationPlan) -> Result<(), MigrationError> {
        if self.plans.contains_key(plan.name()) {
            return Err(MigrationError::InvalidPlan {
                plan: plan.name().to_string(),
                reason: "a plan with this name is already registered".to_string(),
            });
        }
        log::debug!("Registered migration plan '{}'", plan.name());
        self.plans.insert(plan.name().to_string(), Arc::new(plan));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<MigrationPlan>> {
        self.plans.get(name).cloned()
    }

    /// Registered plan names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.plans.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
