//! Single-threaded deferred task queue.
//!
//! RULE: Tasks run on the thread that owns the queue, when the driver
//! drains it once per tick. Other threads may only submit through a
//! `RemoteScheduler`; their tasks are marshalled onto the owner's queue
//! at the start of the next drain and never run where they were sent from.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Settle the indices against the connected-set.
    Reconcile,
}

#[derive(Debug)]
pub struct TaskQueue {
    next_id:   TaskId,
    pending:   VecDeque<(TaskId, Task)>,
    remote_tx: Sender<Task>,
    remote_rx: Receiver<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (remote_tx, remote_rx) = mpsc::channel();
        Self {
            next_id: 1,
            pending: VecDeque::new(),
            remote_tx,
            remote_rx,
        }
    }

    /// Queue `task` for the next drain.
    pub fn schedule(&mut self, task: Task) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push_back((id, task));
        id
    }

    /// Returns false if the task already ran or was never queued.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.pending.iter().position(|(pending, _)| *pending == id) {
            Some(pos) => {
                self.pending.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.pending.iter().any(|(pending, _)| *pending == id)
    }

    /// A `Send` handle for submitting from other threads.
    pub fn remote(&self) -> RemoteScheduler {
        RemoteScheduler {
            tx: self.remote_tx.clone(),
        }
    }

    /// Everything queued up to now, in submission order.
    /// Tasks scheduled while the caller works through the batch wait for
    /// the next drain.
    pub fn drain(&mut self) -> Vec<(TaskId, Task)> {
        while let Ok(task) = self.remote_rx.try_recv() {
            self.schedule(task);
        }
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-thread submission handle.
#[derive(Debug, Clone)]
pub struct RemoteScheduler {
    tx: Sender<Task>,
}

impl RemoteScheduler {
    /// False once the owning queue has been dropped.
    pub fn defer(&self, task: Task) -> bool {
        self.tx.send(task).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_removes_pending_task() {
        let mut queue = TaskQueue::new();
        let id = queue.schedule(Task::Reconcile);
        assert!(queue.is_pending(id));
        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn drain_empties_the_queue() {
        let mut queue = TaskQueue::new();
        queue.schedule(Task::Reconcile);
        queue.schedule(Task::Reconcile);
        assert_eq!(queue.drain().len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn remote_tasks_arrive_on_next_drain() {
        let mut queue = TaskQueue::new();
        let remote = queue.remote();

        let handle = std::thread::spawn(move || remote.defer(Task::Reconcile));
        assert!(handle.join().expect("remote thread"));

        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1, Task::Reconcile);
    }
}
