// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-thread exploration state.
//!
//! The state is installed by the backend for exactly one path of one harness
//! and torn down afterwards, so nothing leaks between paths or harnesses and
//! harnesses on different threads never share it.

use crate::backend::{PanicRecord, PropertyRecord};
use crate::internal::{ContractDef, HarnessDef};
use covenant_metadata::{PropertyClass, SourceLocation};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, Location, PanicHookInfo};
use std::sync::LazyLock;

/// The unwind payload of a pruned path.
pub(crate) struct PathPruned {
    pub(crate) infeasible_replacement: bool,
}

/// State of the path currently being explored.
pub(crate) struct Exploration {
    pub(crate) harness: &'static HarnessDef,
    pub(crate) properties: Vec<PropertyRecord>,
    /// Contracts whose check variant is currently on the stack.
    pub(crate) entered: HashSet<(usize, &'static str)>,
    pub(crate) target_reached: bool,
    /// Contracts checked or replaced on this path, by qualified name.
    pub(crate) contracts: BTreeMap<String, &'static ContractDef>,
    pub(crate) replace_attempts: u32,
    pub(crate) draw_attempts: u32,
}

impl Exploration {
    pub(crate) fn new(harness: &'static HarnessDef, replace_attempts: u32, draw_attempts: u32) -> Self {
        Exploration {
            harness,
            properties: Vec::new(),
            entered: HashSet::new(),
            target_reached: false,
            contracts: BTreeMap::new(),
            replace_attempts,
            draw_attempts,
        }
    }

    pub(crate) fn note_contract(&mut self, name: &str, def: &'static ContractDef) {
        if !self.contracts.contains_key(name) {
            self.contracts.insert(name.to_string(), def);
        }
    }
}

enum State {
    Idle,
    Describe(Option<&'static HarnessDef>),
    Explore(Exploration),
}

thread_local! {
    static STATE: RefCell<State> = const { RefCell::new(State::Idle) };
    static EXPLORING: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<PanicRecord>> = const { RefCell::new(None) };
}

pub(crate) const DEFAULT_DRAW_ATTEMPTS: u32 = 64;
pub(crate) const DEFAULT_REPLACE_ATTEMPTS: u32 = 64;

// Panics on exploration threads are findings, not crashes: keep them quiet and
// hand them to the backend instead.
#[allow(clippy::type_complexity)]
static PANIC_HOOK: LazyLock<Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>> =
    LazyLock::new(|| {
        let hook = panic::take_hook();
        panic::set_hook(Box::new(|info| {
            if EXPLORING.with(Cell::get) {
                let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = info.payload().downcast_ref::<String>() {
                    s.clone()
                } else {
                    "explicit panic".to_string()
                };
                let location = info.location().map(source_location);
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(PanicRecord { message, location }));
            } else {
                (*PANIC_HOOK)(info);
            }
        }));
        hook
    });

pub(crate) fn init_panic_hook() {
    LazyLock::force(&PANIC_HOOK);
}

pub(crate) fn source_location(location: &Location<'_>) -> SourceLocation {
    SourceLocation {
        file: location.file().to_string(),
        line: location.line(),
        column: location.column(),
    }
}

/// Run `f` on the path being explored, if any.
pub(crate) fn with_exploration<R>(f: impl FnOnce(&mut Exploration) -> R) -> Option<R> {
    STATE.with(|state| match &mut *state.borrow_mut() {
        State::Explore(exploration) => Some(f(exploration)),
        _ => None,
    })
}

pub(crate) fn is_exploring() -> bool {
    EXPLORING.with(Cell::get)
}

/// Stop exploring the current path.
pub(crate) fn prune(infeasible_replacement: bool) -> ! {
    if is_exploring() {
        panic::resume_unwind(Box::new(PathPruned { infeasible_replacement }))
    }
    panic!("covenant: an assumption does not hold (no harness is being explored)")
}

/// Record a property outcome; returns whether a path is being explored.
pub(crate) fn record(property: PropertyRecord) -> bool {
    with_exploration(|exploration| exploration.properties.push(property)).is_some()
}

pub(crate) fn record_assertion(holds: bool, msg: &'static str, location: &Location<'_>) -> bool {
    record(PropertyRecord {
        class: PropertyClass::Assertion,
        fn_name: None,
        id: 0,
        description: msg.to_string(),
        location: Some(source_location(location)),
        holds,
    })
}

pub(crate) fn draw_attempts() -> u32 {
    with_exploration(|exploration| exploration.draw_attempts).unwrap_or(DEFAULT_DRAW_ATTEMPTS)
}

/// In describe mode, remember `def` and tell the harness to return right away.
pub(crate) fn describe_harness(def: &'static HarnessDef) -> bool {
    STATE.with(|state| match &mut *state.borrow_mut() {
        State::Describe(slot) => {
            slot.get_or_insert(def);
            true
        }
        _ => false,
    })
}

pub(crate) fn begin_describe() {
    STATE.with(|state| *state.borrow_mut() = State::Describe(None));
}

pub(crate) fn end_describe() -> Option<&'static HarnessDef> {
    STATE.with(|state| match std::mem::replace(&mut *state.borrow_mut(), State::Idle) {
        State::Describe(def) => def,
        _ => None,
    })
}

pub(crate) fn begin_exploration(exploration: Exploration) {
    init_panic_hook();
    LAST_PANIC.with(|slot| slot.borrow_mut().take());
    STATE.with(|state| *state.borrow_mut() = State::Explore(exploration));
    EXPLORING.with(|flag| flag.set(true));
}

/// Tear down the path state and return it with the panic it raised, if any.
pub(crate) fn end_exploration() -> (Option<Exploration>, Option<PanicRecord>) {
    EXPLORING.with(|flag| flag.set(false));
    crate::alloc::stop_watching();
    let exploration = STATE.with(|state| match std::mem::replace(&mut *state.borrow_mut(), State::Idle) {
        State::Explore(exploration) => Some(exploration),
        _ => None,
    });
    (exploration, LAST_PANIC.with(|slot| slot.borrow_mut().take()))
}
