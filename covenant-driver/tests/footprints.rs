// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Footprints, history and frees through whole sessions, for `&mut` and raw
//! pointer parameters alike.

use clap::Parser;
use covenant::{Arbitrary, Footprint};
use covenant_driver::{Session, VerifyArgs};
use covenant_metadata::{PropertyClass, VerificationStatus};

#[global_allocator]
static ALLOC: covenant::TrackingAllocator = covenant::TrackingAllocator;

fn args() -> VerifyArgs {
    VerifyArgs::parse_from(["covenant", "--quiet", "--paths", "64"])
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

#[covenant::proof_for_contract(bump_both)]
fn check_bump_both() {
    let mut pair: Pair = covenant::any();
    bump_both(&mut pair);
}

#[test]
fn footprint_too_narrow() {
    let report = Session::new(args()).harness(check_bump_both).run().unwrap();
    let result = report.harness("check_bump_both").unwrap();
    assert_eq!(result.status, VerificationStatus::Failure);
    let failed: Vec<_> = result.failed_properties().collect();
    assert_eq!(failed.len(), 1, "{failed:?}");
    assert_eq!(failed[0].class, PropertyClass::FrameCondition);
    assert!(failed[0].description.contains("`pair.y`"), "{}", failed[0].description);
    assert_eq!(failed[0].failing_path, Some(0));
    assert_eq!(report.functions["footprints::bump_both"].frame_violations, 1);
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

#[covenant::proof]
#[covenant::stub_verified(Stack::pop)]
fn pop_twice() {
    let mut stack = Stack { items: vec![covenant::any(), covenant::any(), covenant::any()] };
    let first = stack.pop();
    let second = stack.pop();
    covenant::assert(first.is_some() && second.is_some(), "both pops return an item");
    covenant::assert(stack.items.len() == 1, "one item is left");
}

#[test]
fn history_survives_replacement() {
    let report = Session::new(args()).harness(pop_twice).harness(check_pop).run().unwrap();
    assert!(report.all_passed(), "{report:?}");
    let check = report.harness("check_pop").unwrap();
    assert!(check.properties.iter().filter(|p| p.class == PropertyClass::Postcondition).count() >= 2);
    let consumer = report.harness("pop_twice").unwrap();
    assert_eq!(consumer.stage, 1);
    assert!(consumer.paths.explored > consumer.paths.pruned);
    assert!(report.functions["footprints::Stack::pop"].is_verified());
}

#[covenant::frees(first)]
fn release_both(first: *mut u32, second: *mut u32) {
    unsafe {
        drop(Box::from_raw(first));
        drop(Box::from_raw(second));
    }
}

#[covenant::frees(first)]
fn release_first(first: *mut u32, second: *mut u32) {
    unsafe {
        drop(Box::from_raw(first));
        *second = second.read().wrapping_add(1);
    }
}

fn boxed() -> *mut u32 {
    Box::into_raw(Box::new(covenant::any()))
}

#[covenant::proof_for_contract(release_both)]
fn check_release_both() {
    release_both(boxed(), boxed());
}

#[covenant::proof_for_contract(release_first)]
fn check_release_first() {
    let second = boxed();
    release_first(boxed(), second);
    unsafe { drop(Box::from_raw(second)) };
}

#[test]
fn undeclared_frees_are_violations() {
    let report =
        Session::new(args()).harness(check_release_both).harness(check_release_first).run().unwrap();

    let both = report.harness("check_release_both").unwrap();
    assert_eq!(both.status, VerificationStatus::Failure);
    let failed: Vec<_> = both.failed_properties().collect();
    assert_eq!(failed.len(), 1, "{failed:?}");
    assert_eq!(failed[0].class, PropertyClass::FrameCondition);
    assert!(failed[0].description.contains("a raw pointer argument"), "{}", failed[0].description);

    let first = report.harness("check_release_first").unwrap();
    assert_eq!(first.status, VerificationStatus::Success, "{first:?}");
    assert!(first.properties.iter().any(|p| p.class == PropertyClass::FrameCondition && !p.failed()));
}

#[covenant::ensures(|_| true)]
fn set_raw(p: *mut u32) {
    unsafe { *p = 5 };
}

#[covenant::proof_for_contract(set_raw)]
fn check_set_raw() {
    let mut x: u32 = covenant::any();
    set_raw(&mut x);
}

#[covenant::proof]
#[covenant::stub_verified(set_raw)]
fn raw_write_is_havocked() {
    let mut x = 7u32;
    set_raw(&mut x);
    covenant::assert(x == 7, "the pointee of a replaced call is kept");
}

#[test]
fn replaced_raw_pointee_is_havocked() {
    let report = Session::new(args()).harness(raw_write_is_havocked).harness(check_set_raw).run().unwrap();
    assert_eq!(report.harness("check_set_raw").unwrap().status, VerificationStatus::Success);
    let consumer = report.harness("raw_write_is_havocked").unwrap();
    assert_eq!(consumer.status, VerificationStatus::Failure);
    assert!(consumer.failed_properties().any(|p| p.class == PropertyClass::Assertion), "{consumer:?}");
}

#[covenant::modifies(a)]
fn write_both(a: &mut u32, b: *mut u32) {
    *a = 1;
    unsafe { *b = 2 };
}

#[covenant::proof_for_contract(write_both)]
fn check_write_both() {
    let mut a: u32 = covenant::any();
    let mut b: u32 = covenant::any();
    write_both(&mut a, &mut b);
}

#[test]
fn writes_through_raw_pointers_are_framed() {
    let report = Session::new(args()).harness(check_write_both).run().unwrap();
    let result = report.harness("check_write_both").unwrap();
    assert_eq!(result.status, VerificationStatus::Failure);
    let failed: Vec<_> = result.failed_properties().collect();
    assert!(!failed.is_empty());
    assert!(failed.iter().all(|p| p.class == PropertyClass::FrameCondition), "{failed:?}");
    assert!(failed.iter().any(|p| p.description.contains("`(*b)`")), "{failed:?}");
    assert!(failed.iter().all(|p| !p.description.contains("writes `a`")), "{failed:?}");
}
