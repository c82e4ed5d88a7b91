/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! A minimal test-and-test-and-set spinlock for the allocator's short,
//! never-blocking critical sections (free-list splice, deferred-queue
//! splice). The scheduler's runqueues use a ticket lock instead (fairness
//! matters there); here the critical sections are a handful of pointer
//! writes, so plain TTAS is enough.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

pub struct RawSpinlock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for RawSpinlock<T> {}
unsafe impl<T: Send> Sync for RawSpinlock<T> {}

impl<T> RawSpinlock<T> {
    pub const fn new(value: T) -> Self {
        RawSpinlock {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> RawSpinlockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
        RawSpinlockGuard { lock: self }
    }
}

impl<T: Default> Default for RawSpinlock<T> {
    fn default() -> Self {
        RawSpinlock::new(T::default())
    }
}

pub struct RawSpinlockGuard<'a, T> {
    lock: &'a RawSpinlock<T>,
}

impl<'a, T> Deref for RawSpinlockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<'a, T> DerefMut for RawSpinlockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<'a, T> Drop for RawSpinlockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
