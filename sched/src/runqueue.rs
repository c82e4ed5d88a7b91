/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Per-CPU priority runqueue: `priorities` FIFOs, a bitmap to find the
//! highest non-empty one in O(1), and a ticket spinlock over the pair.
//! Matches `include/sc.h`'s `Rq { lock, queue }` / `list[priorities]` /
//! `prio_top` trio, generalized from a fixed file-scope array into an
//! instance field so tests can build more than one runqueue per process.
//!
//! SCs are linked through `kobj::Sc::link_prev`/`link_next`; an SC is on at
//! most one queue (this runqueue, or some EC's donation queue in
//! [`crate::donate`]) at a time.

use crate::ticket::TicketLock;
use kobj::Sc;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicPtr, Ordering};

pub const PRIORITIES: usize = 256;
pub const DEFAULT_PRIO: u8 = 1;
pub const DEFAULT_QUANTUM: u64 = 10_000;

static_assertions::const_assert!(PRIORITIES <= 256);

#[derive(Clone, Copy, Default)]
struct Fifo {
    head: Option<NonNull<Sc>>,
    tail: Option<NonNull<Sc>>,
}

impl Fifo {
    fn push_back(&mut self, sc: NonNull<Sc>) {
        unsafe {
            (*sc.as_ptr()).link_prev = self.tail.map(|t| t.as_ptr());
            (*sc.as_ptr()).link_next = None;
        }
        match self.tail {
            Some(t) => unsafe { (*t.as_ptr()).link_next = Some(sc.as_ptr()) },
            None => self.head = Some(sc),
        }
        self.tail = Some(sc);
    }

    fn pop_front(&mut self) -> Option<NonNull<Sc>> {
        let sc = self.head?;
        let next = unsafe { (*sc.as_ptr()).link_next }.and_then(NonNull::new);
        self.head = next;
        match next {
            Some(n) => unsafe { (*n.as_ptr()).link_prev = None },
            None => self.tail = None,
        }
        unsafe {
            (*sc.as_ptr()).link_prev = None;
            (*sc.as_ptr()).link_next = None;
        }
        Some(sc)
    }

    fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// `bitmap[w]` bit `b` set means priority `w * 64 + b` has a non-empty FIFO.
struct Queues {
    fifos: [Fifo; PRIORITIES],
    bitmap: [u64; PRIORITIES / 64],
}

impl Queues {
    fn new() -> Self {
        Queues {
            fifos: [Fifo::default(); PRIORITIES],
            bitmap: [0; PRIORITIES / 64],
        }
    }

    fn mark(&mut self, prio: u8) {
        self.bitmap[prio as usize / 64] |= 1 << (prio as usize % 64);
    }

    fn unmark(&mut self, prio: u8) {
        self.bitmap[prio as usize / 64] &= !(1 << (prio as usize % 64));
    }

    /// Highest set bit, scanning words from the top (word `PRIORITIES/64 -
    /// 1` holds the highest priorities), or `None` if every queue is empty.
    fn highest(&self) -> Option<u8> {
        for (w, word) in self.bitmap.iter().enumerate().rev() {
            if *word != 0 {
                let bit = 63 - word.leading_zeros() as usize;
                return Some((w * 64 + bit) as u8);
            }
        }
        None
    }
}

/// One of these per CPU. `current` is read on the fast path (e.g. deciding
/// whether to raise [`crate::hazard::Hazard::SCHED`]) without taking the
/// queue lock; it is only ever written from [`RunQueue::schedule`].
pub struct RunQueue {
    queues: TicketLock<Queues>,
    current: AtomicPtr<Sc>,
}

unsafe impl Send for RunQueue {}
unsafe impl Sync for RunQueue {}

impl RunQueue {
    pub fn new() -> Self {
        RunQueue {
            queues: TicketLock::new(Queues::new()),
            current: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    pub fn current(&self) -> Option<NonNull<Sc>> {
        NonNull::new(self.current.load(Ordering::Acquire))
    }

    /// Pushes `sc` to the tail of its own priority's FIFO on this CPU.
    /// Callers must check `sc.cpu` against the local CPU id first; a
    /// mismatch means the enqueue belongs on a remote CPU's `RunQueue` and
    /// must instead go through that CPU's reschedule IPI (outside this
    /// crate's scope — `hal`/`kernel` own interrupt delivery).
    pub fn enqueue(&self, sc: NonNull<Sc>) {
        let prio = unsafe { sc.as_ref() }.priority;
        let mut q = self.queues.lock();
        q.fifos[prio as usize].push_back(sc);
        q.mark(prio);
    }

    /// Dequeues the highest-priority, longest-waiting SC and makes it
    /// current. On a tie with the previously-current SC's priority, the
    /// FIFO head always wins (deterministic, per the scheduler's fairness
    /// rule) — there is no separate "prefer current" branch to take.
    pub fn schedule(&self) -> Option<NonNull<Sc>> {
        let mut q = self.queues.lock();
        let prio = q.highest()?;
        let sc = q.fifos[prio as usize].pop_front();
        if q.fifos[prio as usize].is_empty() {
            q.unmark(prio);
        }
        drop(q);
        if let Some(sc) = sc {
            self.current.store(sc.as_ptr(), Ordering::Release);
        }
        sc
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        RunQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kobj::{Header, Kind};

    fn sc(priority: u8) -> Sc {
        Sc {
            header: Header::new(Kind::Sc, 0),
            priority,
            budget: DEFAULT_QUANTUM,
            remaining: DEFAULT_QUANTUM,
            owner: core::ptr::null_mut(),
            cpu: 0,
            link_prev: None,
            link_next: None,
        }
    }

    #[test]
    fn schedule_picks_highest_priority_first() {
        let rq = RunQueue::new();
        let mut low = sc(1);
        let mut high = sc(200);
        rq.enqueue(NonNull::from(&mut low));
        rq.enqueue(NonNull::from(&mut high));

        let picked = rq.schedule().unwrap();
        assert_eq!(unsafe { picked.as_ref() }.priority, 200);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let rq = RunQueue::new();
        let mut a = sc(5);
        let mut b = sc(5);
        rq.enqueue(NonNull::from(&mut a));
        rq.enqueue(NonNull::from(&mut b));

        let first = rq.schedule().unwrap();
        let second = rq.schedule().unwrap();
        assert_eq!(first.as_ptr(), &mut a as *mut Sc);
        assert_eq!(second.as_ptr(), &mut b as *mut Sc);
    }

    #[test]
    fn empty_runqueue_schedules_nothing() {
        let rq = RunQueue::new();
        assert!(rq.schedule().is_none());
    }

    #[test]
    fn requeue_after_quantum_goes_to_the_tail_of_its_priority() {
        let rq = RunQueue::new();
        let mut a = sc(5);
        let mut b = sc(5);
        rq.enqueue(NonNull::from(&mut a));
        rq.enqueue(NonNull::from(&mut b));

        let running = rq.schedule().unwrap();
        assert_eq!(running.as_ptr(), &mut a as *mut Sc);
        // Quantum expired: a goes back to the tail, behind b.
        rq.enqueue(running);
        let next = rq.schedule().unwrap();
        assert_eq!(next.as_ptr(), &mut b as *mut Sc);
    }

    #[test]
    fn current_reflects_the_last_scheduled_sc() {
        let rq = RunQueue::new();
        assert!(rq.current().is_none());
        let mut a = sc(1);
        rq.enqueue(NonNull::from(&mut a));
        rq.schedule();
        assert_eq!(rq.current().unwrap().as_ptr(), &mut a as *mut Sc);
    }
}
