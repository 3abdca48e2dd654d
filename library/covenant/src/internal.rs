// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Items used by the code the covenant attributes generate. Nothing here is
//! meant to be called by hand.

use crate::alloc;
use crate::backend::PropertyRecord;
use crate::context::{self, source_location};
use crate::footprint::{Recorder, Snapshot, contains};
use crate::havoc::Havoc;
use crate::source;
use crate::Arbitrary;
use covenant_metadata::{PropertyClass, strip_generics, target_matches};
use std::mem::ManuallyDrop;
use std::ops::Range;
use std::panic::Location;
use std::sync::Once;

pub use crate::havoc::{Addressable, Place, Pointer};

/// Everything a contract attribute knows about the function it decorates.
#[derive(Debug)]
pub struct ContractDef {
    pub name: &'static str,
    pub module: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub requires: &'static [&'static str],
    pub ensures: &'static [&'static str],
    pub modifies: &'static [&'static str],
    pub frees: &'static [&'static str],
}

/// Everything a harness attribute knows about the harness it decorates.
#[derive(Debug)]
pub struct HarnessDef {
    pub name: &'static str,
    pub module: &'static str,
    pub file: &'static str,
    pub line: u32,
    /// The function whose contract this harness checks.
    pub check: Option<&'static str>,
    /// Functions replaced by their contract for the whole harness.
    pub stubs: &'static [&'static str],
}

impl HarnessDef {
    pub fn pretty_name(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }
}

/// Called at the top of every harness; `true` means return immediately.
pub fn begin_harness(def: &'static HarnessDef) -> bool {
    context::describe_harness(def)
}

/// Pick a variant index for a derived `Arbitrary` enum.
pub fn any_variant(count: usize) -> usize {
    source::draw(|s| s.below(count))
}

/// Which variant of a contracted function runs at a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The unmodified body.
    Real,
    /// The body, bracketed by precondition assumptions and postcondition,
    /// frame and frees checks.
    Check,
    /// The contract instead of the body.
    Replace,
}

/// A contracted function at one call.
#[derive(Clone, Copy)]
pub struct Contract {
    def: &'static ContractDef,
    /// `type_name::<Self>()` for methods, empty for free functions.
    owner: &'static str,
}

type ContractKey = (usize, &'static str);

impl Contract {
    pub fn new(def: &'static ContractDef, owner: &'static str) -> Self {
        Contract { def, owner }
    }

    pub fn def(&self) -> &'static ContractDef {
        self.def
    }

    /// The fully-qualified name of the function, generics removed.
    pub fn name(&self) -> String {
        if self.owner.is_empty() {
            format!("{}::{}", self.def.module, self.def.name)
        } else {
            format!("{}::{}", strip_generics(self.owner), self.def.name)
        }
    }

    fn key(&self) -> ContractKey {
        (self.def as *const ContractDef as usize, self.owner)
    }

    /// Choose the variant for this call from the harness being explored.
    pub fn mode(&self) -> Mode {
        if !context::is_exploring() {
            return Mode::Real;
        }
        let name = self.name();
        let key = self.key();
        let def = self.def;
        let mode = context::with_exploration(|cx| {
            if cx.harness.check.is_some_and(|target| target_matches(&name, target)) {
                cx.target_reached = true;
                cx.note_contract(&name, def);
                // Only the outermost call checks; recursive calls use the contract.
                if cx.entered.contains(&key) { Mode::Replace } else { Mode::Check }
            } else if cx.harness.stubs.iter().any(|stub| target_matches(&name, stub)) {
                cx.note_contract(&name, def);
                Mode::Replace
            } else {
                Mode::Real
            }
        })
        .unwrap_or(Mode::Real);
        tracing::trace!(contract = %name, ?mode, "selected variant");
        mode
    }

    fn record(&self, class: PropertyClass, id: u32, description: String, holds: bool, at: &Location<'_>) {
        context::record(PropertyRecord {
            class,
            fn_name: Some(self.name()),
            id,
            description,
            location: Some(source_location(at)),
            holds,
        });
    }

    /// In the check variant, preconditions restrict the explored inputs.
    pub fn assume_precondition(&self, _index: usize, holds: bool) {
        if !holds {
            context::prune(false);
        }
    }

    /// In the replacement variant, the caller must establish the precondition.
    #[track_caller]
    pub fn assert_precondition(&self, index: usize, holds: bool) {
        let clause = self.def.requires.get(index).copied().unwrap_or_default();
        let description = format!("precondition `{clause}` of `{}` holds at the call", self.name());
        self.record(PropertyClass::Precondition, index as u32, description, holds, Location::caller());
        if !holds {
            // The contract says nothing about calls that violate it.
            context::prune(false);
        }
    }

    #[track_caller]
    pub fn assert_postcondition(&self, index: usize, holds: bool) {
        let clause = self.def.ensures.get(index).copied().unwrap_or_default();
        let description = format!("postcondition `{clause}` of `{}` holds", self.name());
        self.record(PropertyClass::Postcondition, index as u32, description, holds, Location::caller());
    }

    /// Mark the check variant of this contract as running.
    pub fn enter(&self) -> RecursionGuard {
        let key = self.key();
        let inserted = context::with_exploration(|cx| cx.entered.insert(key)).unwrap_or(false);
        RecursionGuard { key: inserted.then_some(key) }
    }

    /// Start frame checking for one call of the check variant.
    pub fn frame(&self, explicit_modifies: bool, explicit_frees: bool) -> Frame {
        Frame {
            contract: *self,
            explicit_modifies,
            explicit_frees,
            places: Vec::new(),
            frees: Vec::new(),
            raw_roots: Vec::new(),
            before: None,
            watching: false,
        }
    }

    /// Draw candidate outcomes for the replacement variant until one satisfies
    /// the postconditions.
    ///
    /// `attempt` havocs the footprint, draws a result and returns it when the
    /// postconditions hold. When no attempt succeeds the path is pruned and
    /// counted as an infeasible replacement.
    pub fn replace<R>(&self, mut attempt: impl FnMut() -> Option<R>) -> R {
        let attempts = context::with_exploration(|cx| cx.replace_attempts)
            .unwrap_or(context::DEFAULT_REPLACE_ATTEMPTS);
        for _ in 0..attempts {
            if let Some(result) = attempt() {
                return result;
            }
        }
        tracing::debug!(contract = %self.name(), attempts, "no replacement outcome satisfies the postconditions");
        context::prune(true)
    }

    /// The place `base[lo..hi]` of a `modifies` clause.
    ///
    /// A malformed range is reported and yields an empty place.
    #[track_caller]
    pub fn slice_place<T: Arbitrary>(
        &self,
        base: &&mut [T],
        lo: usize,
        hi: Option<usize>,
        label: &'static str,
    ) -> Place {
        let whole: *const [T] = &**base;
        let len = whole.len();
        let first = whole.cast::<T>().cast_mut();
        let hi = hi.unwrap_or(len);
        if lo > hi || hi > len {
            let description =
                format!("place `{label}` of `{}` is out of bounds ({lo}..{hi} of {len})", self.name());
            self.record(PropertyClass::Specification, 0, description, false, Location::caller());
            let empty = std::ptr::slice_from_raw_parts_mut(first, 0);
            return Place::new(label, <[T] as Havoc>::erase(empty));
        }
        // In bounds: `lo <= hi <= len`.
        let part = std::ptr::slice_from_raw_parts_mut(unsafe { first.add(lo) }, hi - lo);
        Place::new(label, <[T] as Havoc>::erase(part))
    }
}

/// Keeps the check variant of a contract marked as running.
pub struct RecursionGuard {
    key: Option<ContractKey>,
}

impl Drop for RecursionGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            context::with_exploration(|cx| cx.entered.remove(&key));
        }
    }
}

static NO_ALLOCATOR: Once = Once::new();

/// Frame and frees checking around one execution of a check variant.
pub struct Frame {
    contract: Contract,
    explicit_modifies: bool,
    explicit_frees: bool,
    places: Vec<Place>,
    frees: Vec<(&'static str, usize)>,
    raw_roots: Vec<usize>,
    before: Option<Snapshot>,
    watching: bool,
}

impl Frame {
    pub fn modifies(&mut self, place: Place) {
        self.places.push(place);
    }

    pub fn frees(&mut self, label: &'static str, address: usize) {
        self.frees.push((label, address));
    }

    /// A raw pointer parameter: what it points to may be freed only if declared.
    pub fn raw_root(&mut self, address: usize) {
        self.raw_roots.push(address);
    }

    fn checks_frees(&self) -> bool {
        self.explicit_modifies || self.explicit_frees
    }

    pub fn before(&mut self, roots: &dyn Fn(&mut Recorder)) {
        self.before = Some(Snapshot::take(roots));
        if self.checks_frees() {
            if alloc::is_installed() {
                alloc::start_watching();
                self.watching = true;
            } else if self.explicit_frees {
                NO_ALLOCATOR.call_once(|| {
                    tracing::warn!(
                        "`frees` clauses are not checked: install `covenant::TrackingAllocator` as the global allocator"
                    )
                });
            }
        }
    }

    #[track_caller]
    pub fn after(mut self, roots: &dyn Fn(&mut Recorder)) {
        let at = Location::caller();
        let released = self.watching.then(alloc::take_released);
        // Raw pointees freed by the body; without the allocator only the declared ones are known.
        let gone: Vec<usize> = match &released {
            Some(released) => released.preexisting.clone(),
            None => self.frees.iter().map(|(_, address)| *address).collect(),
        };
        let gone: Vec<usize> = gone.into_iter().filter(|address| self.raw_roots.contains(address)).collect();
        let after = Snapshot::take_releasing(roots, &gone);
        let before = self.before.take().unwrap_or_default();
        let name = self.contract.name();
        let places: Vec<Range<usize>> = self.places.iter().map(Place::range).collect();

        if self.explicit_modifies {
            let mut violations = 0u32;
            for leaf in before.changes(&after) {
                let freed = leaf.anchors.first().is_some_and(|pointee| gone.contains(&pointee.start));
                if !freed && !leaf.covered_by(&places) {
                    violations += 1;
                    let description =
                        format!("`{name}` writes `{}` outside its declared footprint", leaf.path);
                    self.contract.record(PropertyClass::FrameCondition, violations, description, false, at);
                }
            }
            if violations == 0 {
                let description = format!("`{name}` writes only inside its declared footprint");
                self.contract.record(PropertyClass::FrameCondition, 0, description, true, at);
            }
        }

        let Some(released) = released else { return };
        if released.incomplete {
            tracing::warn!(contract = %name, "too many allocations to track, some frees may be missed");
        }
        let mut violations = 0u32;
        for address in released.preexisting {
            let block = before.blocks().iter().find(|block| block.start == address);
            if block.is_none() && !self.raw_roots.contains(&address) {
                continue;
            }
            let declared = self.frees.iter().any(|(_, freed)| *freed == address);
            let owned = block.is_some_and(|block| {
                !self.explicit_modifies
                    || block.anchors.iter().any(|anchor| places.iter().any(|p| contains(p, anchor)))
            });
            if !declared && !owned {
                violations += 1;
                let what = block.map_or("a raw pointer argument", |block| block.path.as_str());
                let description = format!("`{name}` frees `{what}` without declaring it");
                self.contract.record(PropertyClass::FrameCondition, 100 + violations, description, false, at);
            }
        }
        if violations == 0 && self.explicit_frees {
            let description = format!("`{name}` frees only what it declares");
            self.contract.record(PropertyClass::FrameCondition, 100, description, true, at);
        }
    }
}

/// Copy `value` without the copy being tracked by the borrow checker.
///
/// The check variant uses this to keep parameters visible to postconditions
/// after they were moved into the body.
///
/// # Safety
///
/// The copy must not be dropped and must only be read while the original is
/// still alive. Mutations of the original made by the body are visible through
/// copies of references, which is what postconditions expect.
pub unsafe fn untracked_deref<T>(value: &T) -> ManuallyDrop<T> {
    ManuallyDrop::new(unsafe { std::ptr::read(value) })
}

/// Evaluate a history expression before the body runs.
pub fn capture<T: Clone>(value: &T) -> T {
    value.clone()
}

/// Evaluate a postcondition closure on the result.
pub fn ensure_holds<R, F: FnOnce(&R) -> bool>(result: &R, condition: F) -> bool {
    condition(result)
}

/// Havoc every place of a replacement.
///
/// # Safety
///
/// Each place must have been taken from a live `&mut` parameter (or a raw
/// pointer valid for writes) of the replaced call, with no reference to it in
/// use.
pub unsafe fn havoc_places(places: &[Place]) {
    for place in places {
        unsafe { place.havoc() }
    }
}
