// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Check that the derived `Arbitrary` and `Footprint` implementations cover
//! every variant and field.

use covenant::footprint::Snapshot;
use covenant::{Arbitrary, Footprint};

#[derive(Debug, Clone, PartialEq, Arbitrary, Footprint)]
enum Shape {
    Empty,
    Circle(u8),
    Rect { w: u8, h: u8 },
}

#[derive(Debug, Arbitrary, Footprint)]
struct Wrapper<T>(T, bool);

#[test]
fn every_variant_is_produced() {
    let mut seen = [false; 3];
    for _ in 0..200 {
        match Shape::any() {
            Shape::Empty => seen[0] = true,
            Shape::Circle(_) => seen[1] = true,
            Shape::Rect { .. } => seen[2] = true,
        }
    }
    assert_eq!(seen, [true; 3]);
}

#[test]
fn variant_and_fields_are_recorded() {
    let shape = Shape::Rect { w: 1, h: 2 };
    let snapshot = Snapshot::take(&|rec| rec.root("s", &shape));
    let paths: Vec<_> = snapshot.leaves().map(|leaf| leaf.path.as_str()).collect();
    // Leaves are ordered by path.
    assert_eq!(paths, vec!["s#variant", "s.h", "s.w"]);
}

#[test]
fn generic_tuple_structs() {
    let wrapper: Wrapper<Shape> = covenant::any();
    let snapshot = Snapshot::take(&|rec| rec.root("w", &wrapper));
    let paths: Vec<_> = snapshot.leaves().map(|leaf| leaf.path.clone()).collect();
    assert_eq!(paths.first().map(String::as_str), Some("w.0#variant"));
    assert_eq!(paths.last().map(String::as_str), Some("w.1"));
}

#[test]
fn changed_variant_is_a_change() {
    let mut shape = Shape::Circle(3);
    let before = Snapshot::take(&|rec| rec.root("s", &shape));
    shape = Shape::Empty;
    let after = Snapshot::take(&|rec| rec.root("s", &shape));
    let changed: Vec<_> = before.changes(&after).into_iter().map(|leaf| leaf.path.clone()).collect();
    assert!(changed.contains(&"s#variant".to_string()), "{changed:?}");
}
