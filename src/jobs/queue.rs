// Fair Job Queue
//
// FIFO per owner, round-robin across owners. Dispatch skips owners who are at
// their concurrency cap without blocking anyone behind them.

use super::ScanId;
use crate::{Result, ScanError};
use std::collections::{HashMap, VecDeque};

/// Queue of scans waiting for a runner slot
#[derive(Debug)]
pub struct FairQueue {
    per_owner: HashMap<String, VecDeque<ScanId>>,
    /// Owners with queued work, in round-robin order
    rotation: VecDeque<String>,
    len: usize,
    capacity: usize,
}

impl FairQueue {
    /// Create new queue holding at most `capacity` scans
    pub fn new(capacity: usize) -> Self {
        Self {
            per_owner: HashMap::new(),
            rotation: VecDeque::new(),
            len: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// Scans queued for one owner
    pub fn queued_for(&self, owner: &str) -> usize {
        self.per_owner.get(owner).map(VecDeque::len).unwrap_or(0)
    }

    /// Enqueue a scan; fails when the queue is at capacity
    pub fn push(&mut self, owner: &str, scan_id: ScanId) -> Result<()> {
        if self.is_full() {
            return Err(ScanError::QueueFull {
                capacity: self.capacity,
            });
        }
        self.push_unbounded(owner, scan_id);
        Ok(())
    }

    /// Enqueue ignoring capacity (used when restoring queued jobs at startup)
    pub fn push_unbounded(&mut self, owner: &str, scan_id: ScanId) {
        let jobs = self.per_owner.entry(owner.to_string()).or_default();
        if jobs.is_empty() {
            self.rotation.push_back(owner.to_string());
        }
        jobs.push_back(scan_id);
        self.len += 1;
    }

    /// Remove a queued scan; returns whether it was queued
    pub fn remove(&mut self, scan_id: &ScanId) -> bool {
        let Some(owner) = self
            .per_owner
            .iter()
            .find(|(_, jobs)| jobs.contains(scan_id))
            .map(|(owner, _)| owner.clone())
        else {
            return false;
        };

        if let Some(jobs) = self.per_owner.get_mut(&owner) {
            jobs.retain(|id| id != scan_id);
            self.len -= 1;
            if jobs.is_empty() {
                self.per_owner.remove(&owner);
                self.rotation.retain(|o| o != &owner);
            }
        }
        true
    }

    /// Next scan to run. Visits each owner with queued work at most once,
    /// skipping owners for whom `can_run` is false.
    pub fn next<F>(&mut self, mut can_run: F) -> Option<(String, ScanId)>
    where
        F: FnMut(&str) -> bool,
    {
        for _ in 0..self.rotation.len() {
            let owner = self.rotation.pop_front()?;

            if !can_run(&owner) {
                self.rotation.push_back(owner);
                continue;
            }

            let jobs = self.per_owner.get_mut(&owner)?;
            let scan_id = jobs.pop_front()?;
            self.len -= 1;

            if jobs.is_empty() {
                self.per_owner.remove(&owner);
            } else {
                self.rotation.push_back(owner.clone());
            }
            return Some((owner, scan_id));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<ScanId> {
        (0..n).map(|_| ScanId::generate()).collect()
    }

    #[test]
    fn test_fifo_per_owner() {
        let mut queue = FairQueue::new(10);
        let jobs = ids(3);
        for id in &jobs {
            queue.push("alice", id.clone()).unwrap();
        }

        for expected in &jobs {
            let (owner, id) = queue.next(|_| true).unwrap();
            assert_eq!(owner, "alice");
            assert_eq!(&id, expected);
        }
        assert!(queue.next(|_| true).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_round_robin_across_owners() {
        let mut queue = FairQueue::new(10);
        let heavy = ids(4);
        for id in &heavy {
            queue.push("heavy", id.clone()).unwrap();
        }
        let light = ScanId::generate();
        queue.push("light", light.clone()).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| queue.next(|_| true))
            .map(|(owner, _)| owner)
            .collect();
        assert_eq!(order, vec!["heavy", "light", "heavy", "heavy", "heavy"]);
    }

    #[test]
    fn test_capped_owner_is_skipped() {
        let mut queue = FairQueue::new(10);
        queue.push("alice", ScanId::generate()).unwrap();
        queue.push("bob", ScanId::generate()).unwrap();

        let (owner, _) = queue.next(|owner| owner != "alice").unwrap();
        assert_eq!(owner, "bob");
        assert_eq!(queue.queued_for("alice"), 1);
        assert!(queue.next(|owner| owner != "alice").is_none());
    }

    #[test]
    fn test_capacity() {
        let mut queue = FairQueue::new(2);
        queue.push("a", ScanId::generate()).unwrap();
        queue.push("b", ScanId::generate()).unwrap();
        assert!(matches!(
            queue.push("c", ScanId::generate()),
            Err(ScanError::QueueFull { capacity: 2 })
        ));
        queue.push_unbounded("c", ScanId::generate());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_remove() {
        let mut queue = FairQueue::new(10);
        let jobs = ids(2);
        queue.push("alice", jobs[0].clone()).unwrap();
        queue.push("alice", jobs[1].clone()).unwrap();

        assert!(queue.remove(&jobs[0]));
        assert!(!queue.remove(&jobs[0]));
        assert_eq!(queue.len(), 1);

        let (_, next) = queue.next(|_| true).unwrap();
        assert_eq!(next, jobs[1]);

        assert!(!queue.remove(&ScanId::generate()));
    }
}
