// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structural walks over the memory a function can reach mutably.
//!
//! A [`Footprint`] implementation reports every scalar it contains as a
//! [`Leaf`]: a printable path, the address range it occupies and its bytes.
//! Heap data is reported together with the inline range of its owner (the
//! *anchor*), so that declaring the owner in a `modifies` clause covers the
//! heap contents it owns. Comparing two snapshots taken around a call yields
//! the leaves the call changed.

use std::collections::BTreeMap;
use std::mem::{size_of, size_of_val};
use std::ops::Range;

/// Types whose reachable memory can be recorded for frame checking.
///
/// Derive it with `#[derive(covenant::Footprint)]`.
pub trait Footprint {
    fn record(&self, rec: &mut Recorder);
}

/// One scalar location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub path: String,
    pub range: Range<usize>,
    pub bytes: Vec<u8>,
    /// Inline ranges of the owners of the heap blocks this leaf lives in.
    pub anchors: Vec<Range<usize>>,
}

/// A heap allocation reached during the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapBlock {
    pub path: String,
    pub start: usize,
    /// Innermost last, the owner of this block included.
    pub anchors: Vec<Range<usize>>,
}

/// Collects leaves while walking values.
#[derive(Debug, Default)]
pub struct Recorder {
    path: String,
    anchors: Vec<Range<usize>>,
    leaves: Vec<Leaf>,
    blocks: Vec<HeapBlock>,
    /// Addresses of raw pointees that must not be read.
    released: Vec<usize>,
}

fn range_of<T: ?Sized>(value: &T) -> Range<usize> {
    let start = value as *const T as *const u8 as usize;
    start..start + size_of_val(value)
}

impl Recorder {
    pub fn new() -> Self {
        Recorder::default()
    }

    /// Record a parameter (or any other root) under `name`.
    pub fn root<T: ?Sized + Footprint>(&mut self, name: &str, value: &T) {
        self.with_path(name.to_string(), |rec| value.record(rec));
    }

    /// Record what the raw pointer parameter `name` points to, as `(*name)`.
    /// The pointee range is the outermost anchor of its leaves. Null and
    /// released pointers are skipped.
    ///
    /// # Safety
    ///
    /// `ptr` must be null, released, or valid for reads.
    pub unsafe fn pointee<T: ?Sized + Footprint>(&mut self, name: &str, ptr: *const T) {
        if ptr.is_null() || self.released.contains(&(ptr.cast::<u8>() as usize)) {
            return;
        }
        let value = unsafe { &*ptr };
        self.anchors.push(range_of(value));
        self.with_path(format!("(*{name})"), |rec| value.record(rec));
        self.anchors.pop();
    }

    pub fn field<T: ?Sized + Footprint>(&mut self, name: &str, value: &T) {
        let path = format!("{}.{name}", self.path);
        self.with_path(path, |rec| value.record(rec));
    }

    pub fn index<T: ?Sized + Footprint>(&mut self, index: usize, value: &T) {
        let path = format!("{}[{index}]", self.path);
        self.with_path(path, |rec| value.record(rec));
    }

    /// Record what a reference points to.
    pub fn deref<T: ?Sized + Footprint>(&mut self, value: &T) {
        let path = format!("(*{})", self.path);
        self.with_path(path, |rec| value.record(rec));
    }

    /// Record the active variant of `owner`. The tag leaf spans the whole value.
    pub fn variant<T: ?Sized>(&mut self, owner: &T, name: &'static str) {
        self.push_leaf(format!("{}#variant", self.path), range_of(owner), name.as_bytes().to_vec());
    }

    /// Record the bookkeeping words of a container (length, capacity, pointer).
    /// The leaf spans the container's inline range.
    pub fn header<T: ?Sized>(&mut self, owner: &T, words: &[usize]) {
        let bytes = words.iter().flat_map(|w| w.to_ne_bytes()).collect();
        self.push_leaf(self.path.clone(), range_of(owner), bytes);
    }

    /// Record heap data owned by `owner` and starting at `block`.
    ///
    /// `block` is `None` when nothing is allocated (zero capacity or zero-sized
    /// elements); the contents are still walked.
    pub fn owned<T: ?Sized>(
        &mut self,
        owner: &T,
        block: Option<usize>,
        contents: impl FnOnce(&mut Recorder),
    ) {
        self.anchors.push(range_of(owner));
        if let Some(start) = block {
            self.blocks.push(HeapBlock {
                path: self.path.clone(),
                start,
                anchors: self.anchors.clone(),
            });
        }
        contents(self);
        self.anchors.pop();
    }

    /// Record a value whose every byte is initialized (no padding).
    pub(crate) fn scalar<T: Copy>(&mut self, value: &T) {
        let range = range_of(value);
        // Only called for primitive types, which have no padding bytes.
        let bytes = unsafe {
            std::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>())
        };
        self.push_leaf(self.path.clone(), range, bytes.to_vec());
    }

    fn push_leaf(&mut self, path: String, range: Range<usize>, bytes: Vec<u8>) {
        self.leaves.push(Leaf { path, range, bytes, anchors: self.anchors.clone() });
    }

    fn with_path(&mut self, path: String, f: impl FnOnce(&mut Recorder)) {
        let saved = std::mem::replace(&mut self.path, path);
        f(self);
        self.path = saved;
    }

    pub fn finish(self) -> Snapshot {
        let mut leaves = BTreeMap::new();
        for leaf in self.leaves {
            leaves.entry(leaf.path.clone()).or_insert(leaf);
        }
        Snapshot { leaves, blocks: self.blocks }
    }
}

/// Everything recorded by one walk.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    leaves: BTreeMap<String, Leaf>,
    blocks: Vec<HeapBlock>,
}

impl Snapshot {
    pub fn take(roots: &dyn Fn(&mut Recorder)) -> Snapshot {
        Snapshot::take_releasing(roots, &[])
    }

    /// Like [`Snapshot::take`], without reading the raw pointees at `released`.
    pub fn take_releasing(roots: &dyn Fn(&mut Recorder), released: &[usize]) -> Snapshot {
        let mut rec = Recorder { released: released.to_vec(), ..Recorder::default() };
        roots(&mut rec);
        rec.finish()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &Leaf> {
        self.leaves.values()
    }

    pub fn blocks(&self) -> &[HeapBlock] {
        &self.blocks
    }

    /// Leaves that differ between `self` (before) and `after`, including
    /// leaves that appeared or disappeared. Each change carries the leaf as
    /// it was where it exists, and as it is now otherwise.
    pub fn changes<'a>(&'a self, after: &'a Snapshot) -> Vec<&'a Leaf> {
        let mut changed = Vec::new();
        for (path, old) in &self.leaves {
            match after.leaves.get(path) {
                Some(new) if new.bytes == old.bytes => {}
                _ => changed.push(old),
            }
        }
        changed.extend(after.leaves.iter().filter(|(p, _)| !self.leaves.contains_key(*p)).map(|(_, l)| l));
        changed
    }
}

/// Whether `inner` lies within `outer`.
pub fn contains(outer: &Range<usize>, inner: &Range<usize>) -> bool {
    outer.start <= inner.start && inner.end <= outer.end && inner.start < inner.end
}

impl Leaf {
    /// Whether a write to this leaf is allowed by a footprint made of `places`.
    pub fn covered_by(&self, places: &[Range<usize>]) -> bool {
        places.iter().any(|place| {
            contains(place, &self.range) || self.anchors.iter().any(|anchor| contains(place, anchor))
        })
    }
}

macro_rules! scalar_footprint {
    ( $( $type: ty ),* ) => {
        $(
            impl Footprint for $type {
                fn record(&self, rec: &mut Recorder) {
                    rec.scalar(self);
                }
            }
        )*
    };
}

scalar_footprint!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);
scalar_footprint!(f32, f64, bool, char);

impl Footprint for () {
    fn record(&self, _: &mut Recorder) {}
}

impl<T> Footprint for std::marker::PhantomData<T> {
    fn record(&self, _: &mut Recorder) {}
}

/// The pointer value only; what it points to is not known to be valid.
impl<T> Footprint for *const T {
    fn record(&self, rec: &mut Recorder) {
        rec.header(self, &[*self as usize]);
    }
}

impl<T> Footprint for *mut T {
    fn record(&self, rec: &mut Recorder) {
        rec.header(self, &[*self as usize]);
    }
}

/// Shared references cannot be written through.
impl<T: ?Sized> Footprint for &T {
    fn record(&self, _: &mut Recorder) {}
}

impl<T: ?Sized + Footprint> Footprint for &mut T {
    fn record(&self, rec: &mut Recorder) {
        rec.deref(&**self);
    }
}

impl<T: Footprint> Footprint for [T] {
    fn record(&self, rec: &mut Recorder) {
        for (i, elem) in self.iter().enumerate() {
            rec.index(i, elem);
        }
    }
}

impl<T: Footprint, const N: usize> Footprint for [T; N] {
    fn record(&self, rec: &mut Recorder) {
        self.as_slice().record(rec);
    }
}

impl<T: Footprint> Footprint for Vec<T> {
    fn record(&self, rec: &mut Recorder) {
        rec.header(self, &[self.len(), self.capacity(), self.as_ptr() as usize]);
        let allocated = self.capacity() != 0 && size_of::<T>() != 0;
        rec.owned(self, allocated.then(|| self.as_ptr() as usize), |rec| {
            self.as_slice().record(rec);
        });
    }
}

impl Footprint for String {
    fn record(&self, rec: &mut Recorder) {
        rec.header(self, &[self.len(), self.capacity(), self.as_ptr() as usize]);
        let allocated = self.capacity() != 0;
        rec.owned(self, allocated.then(|| self.as_ptr() as usize), |rec| {
            self.as_bytes().record(rec);
        });
    }
}

impl<T: Footprint> Footprint for Box<T> {
    fn record(&self, rec: &mut Recorder) {
        let pointee: &T = self;
        rec.header(self, &[pointee as *const T as usize]);
        let allocated = size_of::<T>() != 0;
        rec.owned(self, allocated.then(|| pointee as *const T as usize), |rec| rec.deref(pointee));
    }
}

impl<T: Footprint> Footprint for Option<T> {
    fn record(&self, rec: &mut Recorder) {
        match self {
            Some(value) => {
                rec.variant(self, "Some");
                rec.field("0", value);
            }
            None => rec.variant(self, "None"),
        }
    }
}

impl<T: Footprint, E: Footprint> Footprint for Result<T, E> {
    fn record(&self, rec: &mut Recorder) {
        match self {
            Ok(value) => {
                rec.variant(self, "Ok");
                rec.field("0", value);
            }
            Err(err) => {
                rec.variant(self, "Err");
                rec.field("0", err);
            }
        }
    }
}

macro_rules! footprint_tuple {
    ($($type:ident . $idx:tt),*) => {
        impl<$($type: Footprint),*> Footprint for ($($type,)*) {
            fn record(&self, rec: &mut Recorder) {
                $( rec.field(stringify!($idx), &self.$idx); )*
            }
        }
    }
}

footprint_tuple!(A.0);
footprint_tuple!(A.0, B.1);
footprint_tuple!(A.0, B.1, C.2);
footprint_tuple!(A.0, B.1, C.2, D.3);
footprint_tuple!(A.0, B.1, C.2, D.3, E.4);
footprint_tuple!(A.0, B.1, C.2, D.3, E.4, F.5);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(crate::Footprint)]
    struct Pair {
        a: u32,
        b: u32,
        items: Vec<u8>,
    }

    fn snapshot(pair: &Pair) -> Snapshot {
        Snapshot::take(&|rec| rec.root("pair", pair))
    }

    fn paths(changes: &[&Leaf]) -> Vec<String> {
        changes.iter().map(|l| l.path.clone()).collect()
    }

    #[test]
    fn field_write_is_reported_by_path() {
        let mut pair = Pair { a: 1, b: 2, items: vec![] };
        let before = snapshot(&pair);
        pair.b = 3;
        let after = snapshot(&pair);
        assert_eq!(paths(&before.changes(&after)), vec!["pair.b".to_string()]);
    }

    #[test]
    fn declared_field_covers_only_itself() {
        let mut pair = Pair { a: 1, b: 2, items: vec![] };
        let a_range = range_of(&pair.a);
        let before = snapshot(&pair);
        pair.a = 10;
        pair.b = 20;
        let after = snapshot(&pair);
        let uncovered: Vec<_> =
            before.changes(&after).into_iter().filter(|l| !l.covered_by(&[a_range.clone()])).collect();
        assert_eq!(paths(&uncovered), vec!["pair.b".to_string()]);
    }

    #[test]
    fn declared_vec_covers_its_heap_contents() {
        let mut pair = Pair { a: 1, b: 2, items: Vec::with_capacity(4) };
        pair.items.push(7);
        let items_range = range_of(&pair.items);
        let before = snapshot(&pair);
        pair.items[0] = 8;
        pair.items.push(9);
        let after = snapshot(&pair);
        let changes = before.changes(&after);
        assert!(paths(&changes).contains(&"pair.items[1]".to_string()));
        assert!(changes.iter().all(|l| l.covered_by(&[items_range.clone()])));
    }

    #[test]
    fn heap_blocks_carry_their_owner() {
        let pair = Pair { a: 1, b: 2, items: vec![1, 2, 3] };
        let snap = snapshot(&pair);
        let block = &snap.blocks()[0];
        assert_eq!(block.start, pair.items.as_ptr() as usize);
        assert_eq!(block.anchors.last(), Some(&range_of(&pair.items)));
    }

    #[test]
    fn option_variant_change_is_a_change() {
        let mut value: Option<u16> = Some(4);
        let take = |v: &Option<u16>| Snapshot::take(&|rec| rec.root("v", v));
        let before = take(&value);
        value = None;
        let after = take(&value);
        let changed = paths(&before.changes(&after));
        assert!(changed.contains(&"v#variant".to_string()));
        assert!(changed.contains(&"v.0".to_string()));
    }

    #[test]
    fn raw_pointees_are_walked_unless_released() {
        let mut pair = Pair { a: 1, b: 2, items: vec![] };
        let ptr: *mut Pair = &mut pair;
        let roots = move |rec: &mut Recorder| unsafe { rec.pointee("p", ptr.cast_const()) };
        let before = Snapshot::take(&roots);
        unsafe { (*ptr).b = 5 };
        let after = Snapshot::take(&roots);
        let changes = before.changes(&after);
        assert_eq!(paths(&changes), vec!["(*p).b".to_string()]);
        assert_eq!(changes[0].anchors.first(), Some(&range_of(&pair)));

        let skipped = Snapshot::take_releasing(&roots, &[ptr as usize]);
        assert_eq!(skipped.leaves().count(), 0);
        let null = Snapshot::take(&|rec| unsafe { rec.pointee("q", std::ptr::null::<u32>()) });
        assert_eq!(null.leaves().count(), 0);
    }
}
