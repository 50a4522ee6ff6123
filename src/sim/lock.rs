//! Cooperative FIFO channel locks.
//!
//! A [`ChannelLock`] guarantees that at most one logical transaction drives a
//! channel's wires at a time. Lock holders are identified by [`Ticket`]s.
//! Waiters queue in request order and are granted the lock strictly in that
//! order; a waiter that is not at the head of the queue keeps polling (one
//! poll per clock edge) until it is.
//!
//! The lock is not reentrant: a ticket that already owns the lock and
//! requests it again is not granted a second hold.
//!
//! # Usage
//!
//! ```
//! use axi_emu::sim::{ChannelLock, Ticket};
//!
//! let mut lock = ChannelLock::new("m_axil_wabusy");
//! let (a, b) = (Ticket::new(1), Ticket::new(2));
//!
//! lock.request(a);
//! lock.request(b);
//! assert!(lock.try_acquire(a));
//! assert!(!lock.try_acquire(b)); // stalls until `a` releases
//!
//! lock.release(a).unwrap();
//! assert!(lock.try_acquire(b));
//! ```

use std::collections::VecDeque;

use super::SimError;

/// Identity of a lock requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    /// Wrap a raw ticket number.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw ticket number.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Contention statistics for one lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockStats {
    /// Successful acquisitions.
    pub acquires: u64,
    /// Releases.
    pub releases: u64,
    /// Failed acquisition polls (one per stalled poll).
    pub stall_polls: u64,
    /// Longest queue observed.
    pub max_queue: usize,
}

/// FIFO mutual-exclusion lock for one driven channel.
#[derive(Debug)]
pub struct ChannelLock {
    name: String,
    owner: Option<Ticket>,
    waiters: VecDeque<Ticket>,
    stats: LockStats,
}

impl ChannelLock {
    /// Create an unlocked lock.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            waiters: VecDeque::new(),
            stats: LockStats::default(),
        }
    }

    /// Lock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current owner.
    pub fn owner(&self) -> Option<Ticket> {
        self.owner
    }

    /// True if some ticket holds the lock.
    pub fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    /// Number of queued waiters.
    pub fn queue_len(&self) -> usize {
        self.waiters.len()
    }

    /// Join the wait queue. Requesting twice does not queue twice.
    pub fn request(&mut self, ticket: Ticket) {
        if self.owner == Some(ticket) || self.waiters.contains(&ticket) {
            return;
        }
        self.waiters.push_back(ticket);
        self.stats.max_queue = self.stats.max_queue.max(self.waiters.len());
    }

    /// Try to take the lock. Succeeds only when the lock is free and
    /// `ticket` is at the head of the queue.
    ///
    /// A ticket that is not queued is queued first.
    pub fn try_acquire(&mut self, ticket: Ticket) -> bool {
        if self.owner == Some(ticket) {
            // Non-reentrant: a second hold is never granted.
            self.stats.stall_polls += 1;
            return false;
        }
        self.request(ticket);
        if self.owner.is_none() && self.waiters.front() == Some(&ticket) {
            self.waiters.pop_front();
            self.owner = Some(ticket);
            self.stats.acquires += 1;
            log::trace!("lock {} acquired by ticket {}", self.name, ticket.0);
            true
        } else {
            self.stats.stall_polls += 1;
            false
        }
    }

    /// Release the lock held by `ticket`.
    pub fn release(&mut self, ticket: Ticket) -> Result<(), SimError> {
        if self.owner != Some(ticket) {
            return Err(SimError::LockNotHeld {
                lock: self.name.clone(),
                ticket: ticket.0,
            });
        }
        self.owner = None;
        self.stats.releases += 1;
        log::trace!("lock {} released by ticket {}", self.name, ticket.0);
        Ok(())
    }

    /// Contention statistics.
    pub fn stats(&self) -> &LockStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncontended_acquire() {
        let mut lock = ChannelLock::new("l");
        let t = Ticket::new(7);
        assert!(lock.try_acquire(t));
        assert_eq!(lock.owner(), Some(t));
        lock.release(t).unwrap();
        assert!(!lock.is_locked());
        assert_eq!(lock.stats().acquires, 1);
        assert_eq!(lock.stats().releases, 1);
    }

    #[test]
    fn test_fifo_order() {
        let mut lock = ChannelLock::new("l");
        let (a, b, c) = (Ticket::new(1), Ticket::new(2), Ticket::new(3));
        assert!(lock.try_acquire(a));
        lock.request(c);
        lock.request(b);

        lock.release(a).unwrap();
        // b requested after c, so it must wait
        assert!(!lock.try_acquire(b));
        assert!(lock.try_acquire(c));
        assert!(!lock.try_acquire(b));
        lock.release(c).unwrap();
        assert!(lock.try_acquire(b));
        assert_eq!(lock.stats().max_queue, 2);
    }

    #[test]
    fn test_not_reentrant() {
        let mut lock = ChannelLock::new("l");
        let a = Ticket::new(1);
        assert!(lock.try_acquire(a));
        assert!(!lock.try_acquire(a));
        assert_eq!(lock.queue_len(), 0);
    }

    #[test]
    fn test_release_by_non_owner() {
        let mut lock = ChannelLock::new("m_wbusy");
        let a = Ticket::new(1);
        let b = Ticket::new(2);
        assert!(lock.try_acquire(a));
        let err = lock.release(b).unwrap_err();
        assert!(matches!(err, SimError::LockNotHeld { ticket: 2, .. }));
        assert_eq!(lock.owner(), Some(a));
    }

    #[test]
    fn test_stall_polls_counted() {
        let mut lock = ChannelLock::new("l");
        let (a, b) = (Ticket::new(1), Ticket::new(2));
        lock.try_acquire(a);
        lock.try_acquire(b);
        lock.try_acquire(b);
        assert_eq!(lock.stats().stall_polls, 2);
    }
}
