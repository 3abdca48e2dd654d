// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deallocation tracking for `frees` clauses.
//!
//! Install the allocator in the crate that defines your harnesses:
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: covenant::TrackingAllocator = covenant::TrackingAllocator;
//! ```
//!
//! The allocator only records while a check variant watches its body, and it
//! never allocates itself: the logs are fixed-size and thread-local.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, Ordering};

const LOG_CAPACITY: usize = 1024;

/// A [`System`] wrapper that reports deallocations to the frame checker.
pub struct TrackingAllocator;

static INSTALLED: AtomicBool = AtomicBool::new(false);

struct AddressLog {
    addresses: [usize; LOG_CAPACITY],
    len: usize,
    overflowed: bool,
}

impl AddressLog {
    const fn new() -> Self {
        AddressLog { addresses: [0; LOG_CAPACITY], len: 0, overflowed: false }
    }

    fn push(&mut self, address: usize) {
        if self.len == LOG_CAPACITY {
            self.overflowed = true;
        } else {
            self.addresses[self.len] = address;
            self.len += 1;
        }
    }

    fn contains(&self, address: usize) -> bool {
        self.addresses[..self.len].contains(&address)
    }
}

thread_local! {
    static WATCHING: Cell<bool> = const { Cell::new(false) };
    static ALLOCATED: RefCell<AddressLog> = const { RefCell::new(AddressLog::new()) };
    static FREED: RefCell<AddressLog> = const { RefCell::new(AddressLog::new()) };
}

fn note(log: &'static std::thread::LocalKey<RefCell<AddressLog>>, ptr: *mut u8) {
    if ptr.is_null() || !WATCHING.try_with(Cell::get).unwrap_or(false) {
        return;
    }
    let _ = log.try_with(|log| {
        if let Ok(mut log) = log.try_borrow_mut() {
            log.push(ptr as usize);
        }
    });
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        INSTALLED.store(true, Ordering::Relaxed);
        let ptr = unsafe { System.alloc(layout) };
        note(&ALLOCATED, ptr);
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        INSTALLED.store(true, Ordering::Relaxed);
        let ptr = unsafe { System.alloc_zeroed(layout) };
        note(&ALLOCATED, ptr);
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        note(&FREED, ptr);
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() && new_ptr != ptr {
            note(&FREED, ptr);
            note(&ALLOCATED, new_ptr);
        }
        new_ptr
    }
}

/// Whether a [`TrackingAllocator`] serves this process.
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::Relaxed)
}

/// Start recording allocations and deallocations of this thread.
pub(crate) fn start_watching() {
    ALLOCATED.with(|log| *log.borrow_mut() = AddressLog::new());
    FREED.with(|log| *log.borrow_mut() = AddressLog::new());
    WATCHING.with(|flag| flag.set(true));
}

pub(crate) fn stop_watching() {
    let _ = WATCHING.try_with(|flag| flag.set(false));
}

/// What the watched code released.
#[derive(Debug, Default)]
pub(crate) struct Released {
    /// Blocks that existed before watching began and were freed since.
    pub(crate) preexisting: Vec<usize>,
    /// The log overflowed, so the list may be incomplete.
    pub(crate) incomplete: bool,
}

/// Stop watching and report the blocks the watched code released.
pub(crate) fn take_released() -> Released {
    stop_watching();
    ALLOCATED.with(|allocated| {
        FREED.with(|freed| {
            let allocated = allocated.borrow();
            let freed = freed.borrow();
            let preexisting = freed.addresses[..freed.len]
                .iter()
                .copied()
                .filter(|address| !allocated.contains(*address))
                .collect();
            Released { preexisting, incomplete: allocated.overflowed || freed.overflowed }
        })
    })
}
