// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The global pass indexes this very file: `next_ticket` reaches `ISSUED`
//! through `record` without declaring it, and `hit` writes `HITS` directly.

use clap::Parser;
use covenant_driver::{Session, VerifyArgs};
use covenant_metadata::{CovenantMetadata, FindingKind, PropertyClass, VerificationStatus};
use std::sync::atomic::{AtomicU32, Ordering};

static ISSUED: AtomicU32 = AtomicU32::new(0);

fn record() {
    ISSUED.fetch_add(1, Ordering::Relaxed);
}

#[covenant::requires(base < 1000)]
#[covenant::ensures(|ticket: &u32| *ticket > base)]
fn next_ticket(base: u32) -> u32 {
    record();
    base + 1
}

#[covenant::proof_for_contract(next_ticket)]
fn check_next_ticket() {
    next_ticket(covenant::any());
}

static HITS: AtomicU32 = AtomicU32::new(0);

#[covenant::ensures(|_| true)]
fn hit() {
    HITS.store(99, Ordering::Relaxed);
}

#[covenant::proof_for_contract(hit)]
fn check_hit() {
    hit();
}

#[covenant::proof]
#[covenant::stub_verified(hit)]
fn hits_are_kept() {
    HITS.store(1, Ordering::Relaxed);
    hit();
    covenant::assert(HITS.load(Ordering::Relaxed) == 1, "the replaced call leaves `HITS` alone");
}

const SOURCE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/globals.rs");

#[test]
fn undeclared_global_fails_the_check() {
    let args = VerifyArgs::parse_from(["covenant", "--quiet", "--paths", "32", "--src", SOURCE]);
    let report = Session::new(args).harness(check_next_ticket).run().unwrap();
    let result = report.harness("check_next_ticket").unwrap();
    assert_eq!(result.status, VerificationStatus::Failure);

    let failed: Vec<_> = result.failed_properties().collect();
    assert_eq!(failed.len(), 1, "{failed:?}");
    assert_eq!(failed[0].class, PropertyClass::Specification);
    assert_eq!(failed[0].fn_name.as_deref(), Some("globals::next_ticket"));
    assert!(failed[0].description.contains("`globals::ISSUED`"), "{}", failed[0].description);
    // The contract itself holds on every explored path.
    assert!(result.properties.iter().any(|p| p.class == PropertyClass::Postcondition && !p.failed()));
}

#[test]
fn harness_sources_are_scanned_by_default() {
    let args = VerifyArgs::parse_from(["covenant", "--quiet", "--paths", "16"]);
    let report = Session::new(args).harness(hits_are_kept).harness(check_hit).run().unwrap();

    let check = report.harness("check_hit").unwrap();
    assert_eq!(check.status, VerificationStatus::Failure);
    let failed: Vec<_> = check.failed_properties().collect();
    assert_eq!(failed.len(), 1, "{failed:?}");
    assert_eq!(failed[0].class, PropertyClass::Specification);
    assert!(failed[0].description.contains("`globals::HITS`"), "{}", failed[0].description);

    // The unsound replacement is never trusted.
    let consumer = report.harness("hits_are_kept").unwrap();
    assert_eq!(consumer.status, VerificationStatus::DependencyError);
    assert_eq!(consumer.paths.explored, 0);
}

#[test]
fn metadata_is_exported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("covenant.json");
    let args = VerifyArgs::parse_from([
        "covenant",
        "--quiet",
        "--paths",
        "16",
        "--src",
        SOURCE,
        "--metadata",
        path.to_str().unwrap(),
    ]);
    Session::new(args).harness(check_next_ticket).run().unwrap();

    let metadata: CovenantMetadata = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(metadata.crate_name, "globals");
    assert_eq!(metadata.proof_harnesses.len(), 1);
    let contracted = &metadata.contracted_functions[0];
    assert_eq!(contracted.pretty_name, "globals::next_ticket");
    assert_eq!(contracted.requires, vec!["base < 1000"]);
    assert_eq!(contracted.harnesses, vec!["globals::check_next_ticket"]);
    assert_eq!(metadata.global_findings.len(), 2);
    let finding = metadata.global_findings.iter().find(|f| f.function == "globals::next_ticket").unwrap();
    assert_eq!(finding.kind, FindingKind::UndeclaredGlobal);
    assert_eq!(finding.via, vec!["globals::next_ticket", "globals::record"]);
}
