//! Minimal reactive engine: tracked variable bags and re-runnable effects.
//!
//! An effect records every `(bag, key)` pair it reads while running. Writing a
//! different value to one of those keys schedules the effect again. With
//! [`Scheduling::Immediate`] dependents re-run before the write returns; with
//! [`Scheduling::Deferred`] they wait in a queue until [`Runtime::flush`].
//!
//! An effect that writes a new value to a key it also reads schedules itself
//! forever. Nothing guards against that.

use crate::error::{Error, Result};
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_OBSERVABLE_ID: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheduling {
    /// Dependents re-run synchronously inside the write that invalidated them.
    #[default]
    Immediate,
    /// Dependents are queued until the host calls [`Runtime::flush`].
    Deferred,
}

/// Generational handle to an effect slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EffectId {
    pub index: u32,
    pub generation: u32,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct Dependency {
    observable: u32,
    key: Rc<str>,
}

type Dependencies = SmallVec<[Dependency; 4]>;

type Callback = Box<dyn FnMut() -> Result<()>>;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
enum EffectState {
    #[default]
    Vacant,
    Idle,
    Queued,
    Running {
        rerun: bool,
    },
}

#[derive(Default)]
struct EffectSlot {
    generation: u32,
    state: EffectState,
    // Taken out while the effect runs.
    callback: Option<Callback>,
    dependencies: Dependencies,
}

enum RunOutcome {
    Rerun(Dependencies),
    Finished,
    Disposed,
}

#[derive(Default)]
struct RuntimeInner {
    scheduling: Scheduling,
    effects: RefCell<Vec<EffectSlot>>,
    free_list: RefCell<Vec<u32>>,
    subscriptions: RefCell<HashMap<Dependency, IndexSet<EffectId>>>,
    observers: RefCell<Vec<EffectId>>,
    pending: RefCell<VecDeque<EffectId>>,
    flushing: Cell<bool>,
    failures: RefCell<Vec<Error>>,
    runs: Cell<u64>,
}

fn live_slot(effects: &mut [EffectSlot], id: EffectId) -> Option<&mut EffectSlot> {
    effects
        .get_mut(id.index as usize)
        .filter(|slot| slot.generation == id.generation && slot.state != EffectState::Vacant)
}

impl RuntimeInner {
    fn allocate(&self, callback: Callback) -> EffectId {
        let mut effects = self.effects.borrow_mut();
        let index = match self.free_list.borrow_mut().pop() {
            Some(index) => index,
            None => {
                effects.push(EffectSlot::default());
                (effects.len() - 1) as u32
            }
        };
        let slot = &mut effects[index as usize];
        slot.state = EffectState::Idle;
        slot.callback = Some(callback);
        EffectId {
            index,
            generation: slot.generation,
        }
    }

    fn run_effect(&self, id: EffectId) {
        let Some((mut callback, dependencies)) = self.begin_run(id) else {
            return;
        };
        self.unsubscribe(id, dependencies);
        loop {
            self.observers.borrow_mut().push(id);
            self.runs.set(self.runs.get() + 1);
            let result = callback();
            self.observers.borrow_mut().pop();
            if let Err(error) = result {
                log::error!("reactive run failed: {error}");
                self.failures.borrow_mut().push(error);
            }
            match self.finish_run(id) {
                RunOutcome::Rerun(dependencies) => {
                    log::debug!("effect {} invalidated while running, running again", id.index);
                    self.unsubscribe(id, dependencies);
                }
                RunOutcome::Finished => {
                    if let Some(slot) = live_slot(&mut self.effects.borrow_mut(), id) {
                        slot.callback = Some(callback);
                    }
                    break;
                }
                RunOutcome::Disposed => break,
            }
        }
    }

    fn begin_run(&self, id: EffectId) -> Option<(Callback, Dependencies)> {
        let mut effects = self.effects.borrow_mut();
        let slot = live_slot(&mut effects, id)?;
        let callback = slot.callback.take()?;
        slot.state = EffectState::Running { rerun: false };
        Some((callback, mem::take(&mut slot.dependencies)))
    }

    fn finish_run(&self, id: EffectId) -> RunOutcome {
        let mut effects = self.effects.borrow_mut();
        let Some(slot) = live_slot(&mut effects, id) else {
            return RunOutcome::Disposed;
        };
        if slot.state == (EffectState::Running { rerun: true }) {
            slot.state = EffectState::Running { rerun: false };
            RunOutcome::Rerun(mem::take(&mut slot.dependencies))
        } else {
            slot.state = EffectState::Idle;
            RunOutcome::Finished
        }
    }

    fn dispose(&self, id: EffectId) {
        let (callback, dependencies) = {
            let mut effects = self.effects.borrow_mut();
            let Some(slot) = live_slot(&mut effects, id) else {
                return;
            };
            slot.generation = slot.generation.wrapping_add(1);
            slot.state = EffectState::Vacant;
            (slot.callback.take(), mem::take(&mut slot.dependencies))
        };
        self.free_list.borrow_mut().push(id.index);
        self.unsubscribe(id, dependencies);
        // Captured state may own other handles; drop it with no borrow held.
        drop(callback);
    }

    fn unsubscribe(&self, id: EffectId, dependencies: Dependencies) {
        let mut subscriptions = self.subscriptions.borrow_mut();
        for dependency in dependencies {
            if let Some(subscribers) = subscriptions.get_mut(&dependency) {
                subscribers.shift_remove(&id);
                if subscribers.is_empty() {
                    subscriptions.remove(&dependency);
                }
            }
        }
    }

    fn track(&self, dependency: Dependency) {
        let Some(&observer) = self.observers.borrow().last() else {
            return;
        };
        {
            let mut effects = self.effects.borrow_mut();
            let Some(slot) = live_slot(&mut effects, observer) else {
                return;
            };
            if slot.dependencies.contains(&dependency) {
                return;
            }
            slot.dependencies.push(dependency.clone());
        }
        self.subscriptions
            .borrow_mut()
            .entry(dependency)
            .or_default()
            .insert(observer);
    }

    fn trigger(&self, dependency: &Dependency) {
        let subscribers: Vec<EffectId> = match self.subscriptions.borrow().get(dependency) {
            Some(subscribers) => subscribers.iter().copied().collect(),
            None => return,
        };
        {
            let mut effects = self.effects.borrow_mut();
            let mut pending = self.pending.borrow_mut();
            for id in subscribers {
                let Some(slot) = live_slot(&mut effects, id) else {
                    continue;
                };
                match slot.state {
                    EffectState::Idle => {
                        slot.state = EffectState::Queued;
                        pending.push_back(id);
                    }
                    EffectState::Running { .. } => {
                        slot.state = EffectState::Running { rerun: true };
                    }
                    EffectState::Queued | EffectState::Vacant => {}
                }
            }
        }
        if self.scheduling == Scheduling::Immediate {
            self.flush();
        }
    }

    fn flush(&self) {
        if self.flushing.replace(true) {
            return;
        }
        loop {
            let Some(id) = self.pending.borrow_mut().pop_front() else {
                break;
            };
            self.run_effect(id);
        }
        self.flushing.set(false);
    }
}

/// Owner of every effect and the scheduler that re-runs them.
#[derive(Clone, Default)]
pub struct Runtime(Rc<RuntimeInner>);

impl Runtime {
    pub fn new(scheduling: Scheduling) -> Self {
        Self(Rc::new(RuntimeInner {
            scheduling,
            ..RuntimeInner::default()
        }))
    }

    pub fn scheduling(&self) -> Scheduling {
        self.0.scheduling
    }

    /// Handle for long-lived callbacks (event listeners) that must not keep the runtime alive.
    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.0))
    }

    /// Creates an empty tracked bag bound to this runtime.
    pub fn observable(&self) -> Observable {
        Observable {
            id: NEXT_OBSERVABLE_ID.fetch_add(1, Ordering::Relaxed),
            runtime: Rc::downgrade(&self.0),
            values: RefCell::default(),
        }
    }

    /// Runs `callback` now and again whenever a value it read changes.
    ///
    /// A failing run is logged and recorded in [`Runtime::failures`]; the
    /// subscriptions it made before failing stay active.
    pub fn run_reactively(&self, callback: impl FnMut() -> Result<()> + 'static) -> Disposer {
        let id = self.0.allocate(Box::new(callback));
        self.0.run_effect(id);
        Disposer {
            runtime: Rc::downgrade(&self.0),
            id,
        }
    }

    /// Runs every queued effect, including ones queued by the runs themselves.
    pub fn flush(&self) {
        self.0.flush();
    }

    pub fn has_pending(&self) -> bool {
        !self.0.pending.borrow().is_empty()
    }

    pub fn failures(&self) -> Vec<Error> {
        self.0.failures.borrow().clone()
    }

    pub fn take_failures(&self) -> Vec<Error> {
        mem::take(&mut *self.0.failures.borrow_mut())
    }

    /// Records a failure raised outside an effect, e.g. by an event handler.
    pub fn report_failure(&self, error: Error) {
        log::error!("{error}");
        self.0.failures.borrow_mut().push(error);
    }

    pub fn live_effects(&self) -> usize {
        self.0
            .effects
            .borrow()
            .iter()
            .filter(|slot| slot.state != EffectState::Vacant)
            .count()
    }

    /// Total number of effect runs so far.
    pub fn run_count(&self) -> u64 {
        self.0.runs.get()
    }
}

#[derive(Clone)]
pub struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(Runtime)
    }
}

/// Stops an effect. Disposing twice, or after the runtime is gone, does nothing.
#[derive(Clone, Debug)]
pub struct Disposer {
    runtime: Weak<RuntimeInner>,
    id: EffectId,
}

impl Disposer {
    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn dispose(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.dispose(self.id);
        }
    }

    pub fn is_live(&self) -> bool {
        self.runtime
            .upgrade()
            .is_some_and(|runtime| live_slot(&mut runtime.effects.borrow_mut(), self.id).is_some())
    }
}

/// A variable bag whose reads are tracked and whose writes notify readers.
pub struct Observable {
    id: u32,
    runtime: Weak<RuntimeInner>,
    values: RefCell<IndexMap<String, Value>>,
}

impl Observable {
    fn dependency(&self, key: &str) -> Dependency {
        Dependency {
            observable: self.id,
            key: key.into(),
        }
    }

    fn track(&self, key: &str) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.track(self.dependency(key));
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.track(key);
        self.values.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.track(key);
        self.values.borrow().contains_key(key)
    }

    /// Like [`Observable::contains`] but does not subscribe the running effect.
    pub fn contains_untracked(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    /// Stores `value` under `key`. Readers are notified only if the value changed.
    pub fn set(&self, key: &str, value: Value) {
        let changed = {
            let mut values = self.values.borrow_mut();
            match values.get_mut(key) {
                Some(current) if *current == value => false,
                Some(current) => {
                    *current = value;
                    true
                }
                None => {
                    values.insert(key.to_owned(), value);
                    true
                }
            }
        };
        if changed && let Some(runtime) = self.runtime.upgrade() {
            runtime.trigger(&self.dependency(key));
        }
    }

    /// A new empty bag on the same runtime.
    pub fn sibling(&self) -> Observable {
        Observable {
            id: NEXT_OBSERVABLE_ID.fetch_add(1, Ordering::Relaxed),
            runtime: self.runtime.clone(),
            values: RefCell::default(),
        }
    }

    /// Untracked.
    pub fn keys(&self) -> Vec<String> {
        self.values.borrow().keys().cloned().collect()
    }
}
