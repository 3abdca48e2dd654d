// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Replacements are only trusted once the contract they assume was checked.

use clap::Parser;
use covenant_driver::{Session, VerifyArgs};
use covenant_metadata::VerificationStatus;

fn args(extra: &[&str]) -> VerifyArgs {
    let mut argv = vec!["covenant", "--quiet", "--paths", "128"];
    argv.extend_from_slice(extra);
    VerifyArgs::parse_from(argv)
}

#[covenant::requires(n < 100)]
#[covenant::ensures(|result: &u32| *result > n)]
fn next(n: u32) -> u32 {
    n
}

#[covenant::ensures(|result: &u32| *result > 0)]
fn never_checked() -> u32 {
    1
}

#[covenant::proof_for_contract(next)]
fn check_next() {
    next(covenant::any());
}

#[covenant::proof]
#[covenant::stub_verified(next)]
fn uses_broken() {
    let n = next(3);
    covenant::assert(n > 3, "the successor is larger");
}

#[covenant::proof]
#[covenant::stub_verified(never_checked)]
fn uses_unchecked() {
    covenant::assert(never_checked() > 0, "positive");
}

#[test]
fn unchecked_replacement_is_not_run() {
    let report = Session::new(args(&[])).harness(uses_unchecked).run().unwrap();
    let result = report.harness("uses_unchecked").unwrap();
    assert_eq!(result.status, VerificationStatus::DependencyError);
    assert_eq!(result.paths.explored, 0);
    let reason = result.dependency_error.as_deref().unwrap();
    assert!(reason.contains("no harness checks the contract of `never_checked`"), "{reason}");
    assert_eq!(report.failures(), 1);
}

#[test]
fn failed_check_blocks_its_consumers() {
    let report = Session::new(args(&[])).harness(uses_broken).harness(check_next).run().unwrap();
    let check = report.harness("check_next").unwrap();
    assert_eq!(check.status, VerificationStatus::Failure);
    let consumer = report.harness("uses_broken").unwrap();
    assert_eq!(consumer.status, VerificationStatus::DependencyError);
    assert_eq!(consumer.stage, 1);
    let reason = consumer.dependency_error.as_deref().unwrap();
    assert!(reason.contains("`dependencies::check_next` did not pass"), "{reason}");

    let summary = &report.functions["dependencies::next"];
    assert!(!summary.is_verified());
    assert_eq!(summary.postcondition_failures, 1);
}

#[test]
fn selecting_harnesses_bypasses_ordering() {
    let report = Session::new(args(&["--harness", "uses_broken"]))
        .harness(uses_broken)
        .harness(check_next)
        .harness(uses_unchecked)
        .run()
        .unwrap();
    assert!(report.ordering_bypassed);
    assert_eq!(report.harnesses.len(), 1);
    let consumer = report.harness("uses_broken").unwrap();
    assert_eq!(consumer.status, VerificationStatus::Success);
    assert_eq!(consumer.stage, 0);
}

#[covenant::requires(n <= 100)]
#[covenant::ensures(|result: &bool| *result == (n % 2 == 0))]
fn is_even(n: u32) -> bool {
    if n == 0 { true } else { is_odd(n - 1) }
}

#[covenant::requires(n <= 100)]
#[covenant::ensures(|result: &bool| *result == (n % 2 == 1))]
fn is_odd(n: u32) -> bool {
    if n == 0 { false } else { is_even(n - 1) }
}

#[covenant::proof_for_contract(is_even)]
#[covenant::stub_verified(is_odd)]
fn check_is_even() {
    is_even(u32::from(covenant::any::<u8>()) % 101);
}

#[covenant::proof_for_contract(is_odd)]
#[covenant::stub_verified(is_even)]
fn check_is_odd() {
    is_odd(u32::from(covenant::any::<u8>()) % 101);
}

#[covenant::proof]
#[covenant::stub_verified(is_even)]
fn parity_of_ten() {
    covenant::assert(is_even(10), "ten is even");
}

#[test]
fn mutual_recursion_is_checked_together() {
    let report = Session::new(args(&[]))
        .harness(parity_of_ten)
        .harness(check_is_odd)
        .harness(check_is_even)
        .run()
        .unwrap();
    assert!(report.all_passed(), "{report:?}");
    assert_eq!(report.harness("check_is_even").unwrap().stage, 0);
    assert_eq!(report.harness("check_is_odd").unwrap().stage, 0);
    assert_eq!(report.harness("parity_of_ten").unwrap().stage, 1);
    assert!(report.functions["dependencies::is_even"].is_verified());
    assert!(report.functions["dependencies::is_odd"].is_verified());
}

#[covenant::requires(n <= 50)]
#[covenant::ensures(|result: &u8| *result <= n)]
fn ping(n: u8) -> u8 {
    if n == 0 { 0 } else { pong(n - 1) }
}

#[covenant::requires(n <= 50)]
#[covenant::ensures(|result: &u8| *result <= n)]
fn pong(n: u8) -> u8 {
    if n == 0 { 1 } else { ping(n - 1) }
}

#[covenant::proof_for_contract(ping)]
#[covenant::stub_verified(pong)]
fn check_ping() {
    ping(covenant::any::<u8>() % 51);
}

#[covenant::proof_for_contract(pong)]
#[covenant::stub_verified(ping)]
fn check_pong() {
    pong(covenant::any::<u8>() % 51);
}

#[test]
fn a_failing_group_member_taints_the_group() {
    let report = Session::new(args(&[])).harness(check_ping).harness(check_pong).run().unwrap();
    assert_eq!(report.harness("check_pong").unwrap().status, VerificationStatus::Failure);
    let ping = report.harness("check_ping").unwrap();
    assert_eq!(ping.status, VerificationStatus::DependencyError);
    let reason = ping.dependency_error.as_deref().unwrap();
    assert!(reason.contains("same recursion group"), "{reason}");
    // The member ran, so its own properties are still reported.
    assert!(ping.paths.explored > 0);
    assert_eq!(ping.failed_properties().count(), 0);
}
