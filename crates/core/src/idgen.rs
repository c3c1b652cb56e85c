//! Process ID allocation for queue entries
//!
//! PIDs live in `1..=max` and are handed out cyclically starting just past
//! the last one issued, skipping any PID still attached to a live entry.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{self, AtomicU32};

/// Thread-safe cyclic PID allocator
pub struct PidAllocator {
    live: Mutex<HashSet<u32>>,
    next_pid: AtomicU32,
    max_pid: u32,
}

impl PidAllocator {
    pub fn new(max_pid: u32) -> Self {
        Self {
            live: Mutex::new(HashSet::new()),
            next_pid: AtomicU32::new(1),
            max_pid: max_pid.max(1),
        }
    }

    /// Find the PID the next call to [`allocate`](Self::allocate) would return
    /// without reserving it.
    pub fn peek(&self) -> Option<u32> {
        let live = self.live.lock();
        self.scan(&live)
    }

    /// Reserve the next free PID, or `None` when every PID is in use
    pub fn allocate(&self) -> Option<u32> {
        let mut live = self.live.lock();
        let pid = self.scan(&live)?;
        live.insert(pid);
        // A zero counter wraps back to 1 on the next scan.
        self.next_pid.store(pid.wrapping_add(1), atomic::Ordering::Relaxed);
        Some(pid)
    }

    /// Return a PID to the pool
    pub fn release(&self, pid: u32) -> bool {
        self.live.lock().remove(&pid)
    }

    fn scan(&self, live: &HashSet<u32>) -> Option<u32> {
        let mut pid = self.next_pid.load(atomic::Ordering::Relaxed);
        for _ in 0..self.max_pid {
            if pid > self.max_pid || pid == 0 {
                pid = 1;
            }
            if !live.contains(&pid) {
                return Some(pid);
            }
            pid = pid.wrapping_add(1);
        }
        None
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new(10000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_allocation() {
        let pids = PidAllocator::new(100);
        let p1 = pids.allocate().unwrap();
        let p2 = pids.allocate().unwrap();
        assert_eq!(p1, 1);
        assert_eq!(p2, 2);
        assert!(pids.release(p1));
        assert!(!pids.release(p1));
    }

    #[test]
    fn test_pid_wraps_and_skips_live() {
        let pids = PidAllocator::new(3);
        assert_eq!(pids.allocate(), Some(1));
        assert_eq!(pids.allocate(), Some(2));
        assert_eq!(pids.allocate(), Some(3));
        assert_eq!(pids.allocate(), None);

        assert!(pids.release(2));
        assert_eq!(pids.peek(), Some(2));
        assert_eq!(pids.allocate(), Some(2));
        assert_eq!(pids.allocate(), None);
    }

    #[test]
    fn test_pid_continues_past_last_issued() {
        let pids = PidAllocator::new(10);
        let first = pids.allocate().unwrap();
        pids.release(first);
        // Freed PIDs are not reused until the counter wraps around.
        assert_eq!(pids.allocate(), Some(2));
    }

    #[test]
    fn test_pid_wraps_at_u32_max() {
        let pids = PidAllocator::new(u32::MAX);
        pids.next_pid.store(u32::MAX, atomic::Ordering::Relaxed);
        assert_eq!(pids.allocate(), Some(u32::MAX));
        assert_eq!(pids.peek(), Some(1));
        assert_eq!(pids.allocate(), Some(1));
        assert_eq!(pids.allocate(), Some(2));
    }
}
