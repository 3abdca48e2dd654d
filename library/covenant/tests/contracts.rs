// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contracts expanded by the attributes and explored through the backend.

use covenant::backend::{PathConfig, PathOutcome, PathVerdict, describe, path_seed, run_path};
use covenant::{Arbitrary, Footprint};
use covenant_metadata::PropertyClass;

fn explore(harness: fn(), paths: u64) -> Vec<PathOutcome> {
    let def = describe(harness).expect("not a harness");
    (0..paths).map(|path| run_path(harness, def, &PathConfig::with_seed(path_seed(7, def.name, path)))).collect()
}

fn failures(outcomes: &[PathOutcome], class: PropertyClass) -> usize {
    outcomes.iter().flat_map(|o| &o.properties).filter(|p| p.class == class && !p.holds).count()
}

fn holding(outcomes: &[PathOutcome], class: PropertyClass) -> usize {
    outcomes.iter().flat_map(|o| &o.properties).filter(|p| p.class == class && p.holds).count()
}

#[covenant::requires(divisor != 0)]
#[covenant::ensures(|result: &u32| *result <= dividend)]
fn divide(dividend: u32, divisor: u32) -> u32 {
    dividend / divisor
}

#[covenant::requires(divisor != 0)]
#[covenant::ensures(|result: &u32| *result < dividend)]
fn divide_strictly(dividend: u32, divisor: u32) -> u32 {
    dividend / divisor
}

#[covenant::proof_for_contract(divide)]
fn check_divide() {
    divide(covenant::any(), covenant::any());
}

#[covenant::proof_for_contract(divide_strictly)]
fn check_divide_strictly() {
    divide_strictly(covenant::any(), covenant::any());
}

#[covenant::proof]
#[covenant::stub_verified(divide)]
fn use_divide() {
    let x: u32 = covenant::any();
    let q = divide(x, 3);
    covenant::assert(q <= x, "quotient is bounded");
}

#[covenant::proof]
#[covenant::stub_verified(divide)]
fn divide_by_zero() {
    let x: u32 = covenant::any();
    divide(x, 0);
}

#[test]
fn correct_contract_is_verified() {
    let outcomes = explore(check_divide, 64);
    assert!(outcomes.iter().all(|o| o.target_reached));
    assert_eq!(failures(&outcomes, PropertyClass::Postcondition), 0);
    assert!(holding(&outcomes, PropertyClass::Postcondition) > 0);
    // Zero divisors are assumed away rather than panicking.
    assert!(outcomes.iter().all(|o| !matches!(o.verdict, PathVerdict::Panicked(_))));
}

#[test]
fn wrong_postcondition_is_found() {
    let outcomes = explore(check_divide_strictly, 128);
    assert!(failures(&outcomes, PropertyClass::Postcondition) > 0);
    let failed = outcomes
        .iter()
        .flat_map(|o| &o.properties)
        .find(|p| p.class == PropertyClass::Postcondition && !p.holds)
        .unwrap();
    assert_eq!(failed.fn_name.as_deref(), Some("contracts::divide_strictly"));
    assert!(failed.description.contains("`|result: &u32| *result < dividend`"), "{}", failed.description);
}

#[test]
fn replacement_obeys_the_postcondition() {
    let outcomes = explore(use_divide, 64);
    assert_eq!(failures(&outcomes, PropertyClass::Assertion), 0);
    assert!(holding(&outcomes, PropertyClass::Precondition) > 0);
    assert!(outcomes.iter().all(|o| o.contracts.iter().any(|c| c.name == "contracts::divide")));
}

#[test]
fn replacement_checks_the_caller() {
    let outcomes = explore(divide_by_zero, 8);
    assert_eq!(failures(&outcomes, PropertyClass::Precondition), 8);
    // Nothing is known after a violated precondition.
    assert!(outcomes.iter().all(|o| matches!(o.verdict, PathVerdict::Pruned { .. })));
}

#[derive(Clone, Debug, Arbitrary, Footprint)]
struct Pair {
    x: u32,
    y: u32,
}

#[covenant::modifies(&mut pair.x)]
fn bump_both(pair: &mut Pair) {
    pair.x = pair.x.wrapping_add(1);
    pair.y = pair.y.wrapping_add(1);
}

#[covenant::modifies(&mut pair.x)]
#[covenant::ensures(|_| pair.x != old(pair.x))]
fn bump_x(pair: &mut Pair) {
    pair.x = pair.x.wrapping_add(1);
}

#[covenant::proof_for_contract(bump_both)]
fn check_bump_both() {
    let mut pair: Pair = covenant::any();
    bump_both(&mut pair);
}

#[covenant::proof_for_contract(bump_x)]
fn check_bump_x() {
    let mut pair: Pair = covenant::any();
    bump_x(&mut pair);
}

#[covenant::proof]
#[covenant::stub_verified(bump_x)]
fn replaced_bump_keeps_y() {
    let mut pair = Pair { x: covenant::any(), y: 7 };
    let before = pair.x;
    bump_x(&mut pair);
    covenant::assert(pair.y == 7, "y is outside the footprint");
    covenant::assert(pair.x != before, "x follows the postcondition");
}

#[test]
fn footprint_too_narrow() {
    let outcomes = explore(check_bump_both, 4);
    let failed: Vec<_> = outcomes
        .iter()
        .flat_map(|o| &o.properties)
        .filter(|p| p.class == PropertyClass::FrameCondition && !p.holds)
        .collect();
    assert_eq!(failed.len(), 4);
    assert!(failed[0].description.contains("`pair.y`"), "{}", failed[0].description);
}

#[test]
fn footprint_and_history_hold() {
    let outcomes = explore(check_bump_x, 16);
    assert_eq!(failures(&outcomes, PropertyClass::FrameCondition), 0);
    assert_eq!(failures(&outcomes, PropertyClass::Postcondition), 0);
    assert_eq!(holding(&outcomes, PropertyClass::FrameCondition), 16);
}

#[test]
fn replacement_havocs_only_the_footprint() {
    let outcomes = explore(replaced_bump_keeps_y, 16);
    assert_eq!(failures(&outcomes, PropertyClass::Assertion), 0);
    assert_eq!(holding(&outcomes, PropertyClass::Assertion), 32);
}

#[derive(Clone, Debug, Arbitrary, Footprint)]
struct Stack {
    items: Vec<u8>,
}

impl Stack {
    #[covenant::modifies(&mut self.items)]
    #[covenant::ensures(|result: &Option<u8>| result.is_some() == (old(self.items.len()) > 0))]
    #[covenant::ensures(|_| self.items.len() == old(self.items.len()).saturating_sub(1))]
    fn pop(&mut self) -> Option<u8> {
        self.items.pop()
    }
}

#[covenant::proof_for_contract(Stack::pop)]
fn check_pop() {
    let mut stack: Stack = covenant::any();
    stack.pop();
}

#[test]
fn method_contract_with_history() {
    let outcomes = explore(check_pop, 32);
    assert!(outcomes.iter().all(|o| o.target_reached));
    assert_eq!(failures(&outcomes, PropertyClass::Postcondition), 0);
    assert_eq!(failures(&outcomes, PropertyClass::FrameCondition), 0);
    assert_eq!(holding(&outcomes, PropertyClass::Postcondition), 64);
}

#[covenant::requires(n <= 10)]
#[covenant::ensures(|result: &u64| *result >= 1)]
fn fact(n: u8) -> u64 {
    if n == 0 { 1 } else { u64::from(n).saturating_mul(fact(n - 1)) }
}

#[covenant::proof_for_contract(fact)]
fn check_fact() {
    fact(covenant::any());
}

#[test]
fn recursive_calls_use_the_contract() {
    let outcomes = explore(check_fact, 128);
    assert_eq!(failures(&outcomes, PropertyClass::Postcondition), 0);
    // Only the outermost call is checked: one postcondition per completed path.
    for outcome in outcomes.iter().filter(|o| o.verdict == PathVerdict::Completed) {
        let posts = outcome.properties.iter().filter(|p| p.class == PropertyClass::Postcondition).count();
        assert_eq!(posts, 1);
    }
    // Inner calls assert the precondition they are replaced under.
    assert!(holding(&outcomes, PropertyClass::Precondition) > 0);
}

#[test]
fn outside_harnesses_functions_run_unchanged() {
    assert_eq!(divide(7, 2), 3);
    assert_eq!(fact(5), 120);
    let mut stack = Stack { items: vec![1, 2] };
    assert_eq!(stack.pop(), Some(2));
}
