//! Priority queue with delayed readiness.
//!
//! Tasks wait in a `delayed` heap ordered by `not_before` until they become
//! due, then move to a `ready` heap ordered by priority. A delayed task never
//! blocks a lower-priority task that is already ready.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::{Duration, Instant};

use super::task::{Priority, Task, TaskId};

/// Ready entry. Ordering is inverted so `BinaryHeap` pops the most urgent:
/// lowest priority value, then earliest `not_before`, then insertion order.
struct ReadyEntry<P> {
    key: (Priority, Instant, u64),
    task: Task<P>,
}

impl<P> PartialEq for ReadyEntry<P> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<P> Eq for ReadyEntry<P> {}

impl<P> PartialOrd for ReadyEntry<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for ReadyEntry<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key)
    }
}

/// Delayed entry, earliest `not_before` first.
struct DelayedEntry<P> {
    key: (Instant, u64),
    task: Task<P>,
}

impl<P> PartialEq for DelayedEntry<P> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<P> Eq for DelayedEntry<P> {}

impl<P> PartialOrd for DelayedEntry<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for DelayedEntry<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key)
    }
}

/// Outcome of [`ReadyQueue::pop_ready`].
#[derive(Debug)]
pub enum PopResult<P> {
    Ready(Task<P>),
    /// Nothing is due yet; the earliest delayed task becomes ready after
    /// `retry_after`.
    NotReady { retry_after: Duration },
    Empty,
}

pub struct ReadyQueue<P> {
    ready: BinaryHeap<ReadyEntry<P>>,
    delayed: BinaryHeap<DelayedEntry<P>>,
    ids: HashSet<TaskId>,
    next_sequence: u64,
}

impl<P> Default for ReadyQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> ReadyQueue<P> {
    pub fn new() -> Self {
        Self {
            ready: BinaryHeap::new(),
            delayed: BinaryHeap::new(),
            ids: HashSet::new(),
            next_sequence: 0,
        }
    }

    /// Insert a task. A task whose id is already queued is handed back.
    pub fn push(&mut self, mut task: Task<P>) -> Result<(), Task<P>> {
        if self.ids.contains(&task.id) {
            return Err(task);
        }
        task.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.insert(task);
        Ok(())
    }

    /// Put back a task popped from this queue that never ran. It keeps its
    /// insertion sequence, so it stays ahead of later equal-priority tasks.
    pub(crate) fn requeue(&mut self, task: Task<P>) -> Result<(), Task<P>> {
        if self.ids.contains(&task.id) {
            return Err(task);
        }
        self.insert(task);
        Ok(())
    }

    fn insert(&mut self, task: Task<P>) {
        self.ids.insert(task.id.clone());
        self.delayed.push(DelayedEntry { key: (task.not_before, task.sequence), task });
    }

    /// Pop the most urgent task whose `not_before` has passed.
    pub fn pop_ready(&mut self, now: Instant) -> PopResult<P> {
        self.promote(now);
        if let Some(entry) = self.ready.pop() {
            self.ids.remove(&entry.task.id);
            return PopResult::Ready(entry.task);
        }
        match self.delayed.peek() {
            Some(entry) => PopResult::NotReady {
                retry_after: entry.key.0.saturating_duration_since(now),
            },
            None => PopResult::Empty,
        }
    }

    fn promote(&mut self, now: Instant) {
        while self.delayed.peek().is_some_and(|e| e.key.0 <= now) {
            if let Some(DelayedEntry { task, .. }) = self.delayed.pop() {
                let key = (task.priority, task.not_before, task.sequence);
                self.ready.push(ReadyEntry { key, task });
            }
        }
    }

    /// Earliest instant at which some task is (or becomes) ready.
    pub fn peek_next_ready_time(&self) -> Option<Instant> {
        let ready = self.ready.iter().map(|e| e.key.1).min();
        let delayed = self.delayed.peek().map(|e| e.key.0);
        match (ready, delayed) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn len(&self) -> usize {
        self.ready.len() + self.delayed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.delayed.is_empty()
    }

    /// Tasks whose `not_before` is still in the future.
    pub fn delayed_len(&self, now: Instant) -> usize {
        self.delayed.iter().filter(|e| e.key.0 > now).count()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.ids.contains(id)
    }

    /// Remove a queued task by id.
    pub fn remove(&mut self, id: &TaskId) -> Option<Task<P>> {
        if !self.ids.remove(id) {
            return None;
        }
        if let Some(entry) = extract(&mut self.ready, |e| &e.task.id == id) {
            return Some(entry.task);
        }
        extract(&mut self.delayed, |e| &e.task.id == id).map(|e| e.task)
    }

    /// All queued tasks in dispatch order: priority, then `not_before`, then
    /// insertion. Stable across calls while the queue is unchanged.
    pub fn tasks(&self) -> Vec<&Task<P>> {
        let mut tasks: Vec<&Task<P>> = self
            .ready
            .iter()
            .map(|e| &e.task)
            .chain(self.delayed.iter().map(|e| &e.task))
            .collect();
        tasks.sort_by_key(|t| (t.priority, t.not_before, t.sequence));
        tasks
    }

    /// Remove every queued task, in dispatch order.
    pub fn drain(&mut self) -> Vec<Task<P>> {
        self.ids.clear();
        let mut tasks: Vec<Task<P>> = std::mem::take(&mut self.ready)
            .into_vec()
            .into_iter()
            .map(|e| e.task)
            .chain(std::mem::take(&mut self.delayed).into_vec().into_iter().map(|e| e.task))
            .collect();
        tasks.sort_by_key(|t| (t.priority, t.not_before, t.sequence));
        tasks
    }
}

/// Pull the first entry matching `pred` out of `heap`, rebuilding the rest.
fn extract<T: Ord>(heap: &mut BinaryHeap<T>, pred: impl Fn(&T) -> bool) -> Option<T> {
    if !heap.iter().any(&pred) {
        return None;
    }
    let mut found = None;
    let mut rest = Vec::with_capacity(heap.len());
    for entry in std::mem::take(heap).into_vec() {
        if found.is_none() && pred(&entry) {
            found = Some(entry);
        } else {
            rest.push(entry);
        }
    }
    *heap = BinaryHeap::from(rest);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::{TaskDefaults, TaskSpec};

    fn task(id: &str, priority: i32, not_before: Instant) -> Task<()> {
        let spec = TaskSpec::new(()).with_id(id).with_priority(priority).not_before(not_before);
        Task::from_spec(spec, &TaskDefaults::default(), not_before).unwrap()
    }

    fn pop_id(queue: &mut ReadyQueue<()>, now: Instant) -> Option<String> {
        match queue.pop_ready(now) {
            PopResult::Ready(t) => Some(t.id.to_string()),
            _ => None,
        }
    }

    #[test]
    fn pops_lowest_priority_value_first() {
        let now = Instant::now();
        let mut q = ReadyQueue::new();
        q.push(task("low", 100, now)).unwrap();
        q.push(task("critical", 0, now)).unwrap();
        q.push(task("normal", 50, now)).unwrap();

        assert_eq!(pop_id(&mut q, now).as_deref(), Some("critical"));
        assert_eq!(pop_id(&mut q, now).as_deref(), Some("normal"));
        assert_eq!(pop_id(&mut q, now).as_deref(), Some("low"));
        assert!(matches!(q.pop_ready(now), PopResult::Empty));
    }

    #[test]
    fn equal_priority_is_fifo() {
        let now = Instant::now();
        let mut q = ReadyQueue::new();
        for id in ["a", "b", "c"] {
            q.push(task(id, 50, now)).unwrap();
        }
        let order: Vec<_> = (0..3).filter_map(|_| pop_id(&mut q, now)).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn requeued_task_keeps_its_place() {
        let now = Instant::now();
        let mut q = ReadyQueue::new();
        for id in ["a", "b", "c"] {
            q.push(task(id, 50, now)).unwrap();
        }
        let a = match q.pop_ready(now) {
            PopResult::Ready(t) => t,
            other => panic!("expected Ready, got {other:?}"),
        };
        q.push(task("d", 50, now)).unwrap();
        q.requeue(a).unwrap();

        let ids: Vec<_> = q.tasks().iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
        let order: Vec<_> = (0..4).filter_map(|_| pop_id(&mut q, now)).collect();
        assert_eq!(order, ["a", "b", "c", "d"]);
    }

    #[test]
    fn delayed_task_is_withheld_until_due() {
        let now = Instant::now();
        let later = now + Duration::from_millis(200);
        let mut q = ReadyQueue::new();
        q.push(task("later", 0, later)).unwrap();

        match q.pop_ready(now) {
            PopResult::NotReady { retry_after } => assert_eq!(retry_after, Duration::from_millis(200)),
            other => panic!("expected NotReady, got {other:?}"),
        }
        assert_eq!(q.delayed_len(now), 1);
        assert_eq!(pop_id(&mut q, later).as_deref(), Some("later"));
    }

    #[test]
    fn delayed_urgent_task_does_not_block_ready_one() {
        let now = Instant::now();
        let mut q = ReadyQueue::new();
        q.push(task("urgent-later", 0, now + Duration::from_secs(5))).unwrap();
        q.push(task("lazy-now", 100, now)).unwrap();

        assert_eq!(pop_id(&mut q, now).as_deref(), Some("lazy-now"));
    }

    #[test]
    fn earlier_not_before_breaks_priority_ties() {
        let now = Instant::now();
        let mut q = ReadyQueue::new();
        q.push(task("second", 50, now)).unwrap();
        q.push(task("first", 50, now - Duration::from_millis(10))).unwrap();
        assert_eq!(pop_id(&mut q, now).as_deref(), Some("first"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let now = Instant::now();
        let mut q = ReadyQueue::new();
        q.push(task("x", 50, now)).unwrap();
        assert!(q.push(task("x", 10, now)).is_err());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_from_either_heap() {
        let now = Instant::now();
        let mut q = ReadyQueue::new();
        q.push(task("ready", 50, now)).unwrap();
        q.push(task("delayed", 50, now + Duration::from_secs(1))).unwrap();
        q.push(task("other", 50, now)).unwrap();
        // Promote the ready ones.
        let _ = q.pop_ready(now);

        assert!(q.remove(&TaskId::from("delayed")).is_some());
        assert!(q.remove(&TaskId::from("other")).is_some());
        assert!(q.remove(&TaskId::from("missing")).is_none());
        assert!(q.is_empty());
        assert!(!q.contains(&TaskId::from("other")));
    }

    #[test]
    fn next_ready_time_covers_both_heaps() {
        let now = Instant::now();
        let mut q = ReadyQueue::new();
        assert_eq!(q.peek_next_ready_time(), None);

        let soon = now + Duration::from_millis(50);
        q.push(task("soon", 50, soon)).unwrap();
        q.push(task("later", 50, now + Duration::from_secs(1))).unwrap();
        assert_eq!(q.peek_next_ready_time(), Some(soon));
    }

    #[test]
    fn tasks_listing_is_stable_and_ordered() {
        let now = Instant::now();
        let mut q = ReadyQueue::new();
        q.push(task("c", 100, now)).unwrap();
        q.push(task("a", 0, now + Duration::from_secs(1))).unwrap();
        q.push(task("b", 50, now)).unwrap();

        let first: Vec<_> = q.tasks().iter().map(|t| t.id.to_string()).collect();
        let second: Vec<_> = q.tasks().iter().map(|t| t.id.to_string()).collect();
        assert_eq!(first, ["a", "b", "c"]);
        assert_eq!(first, second);
    }
}
