//! Handing tasks to whoever runs them.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::{Error, Result};
use crate::Task;

/// Accepts tasks for asynchronous execution.
///
/// An accepted task runs at least once, and is retried if it fails. Tasks
/// may run concurrently and in any order.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    async fn schedule(&self, task: Task) -> Result<()>;
}

/// A task together with the number of times it already failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub task: Task,
    pub attempt: u32,
}

impl Envelope {
    pub fn new(task: Task) -> Self {
        Self { task, attempt: 0 }
    }

    /// The same task, one attempt later.
    pub fn retry(self) -> Self {
        Self {
            task: self.task,
            attempt: self.attempt + 1,
        }
    }
}

/// Sending half of the in-process task queue.
#[derive(Clone, Debug)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Envelope>,
}

/// Receiving half of the in-process task queue.
#[derive(Debug)]
pub struct TaskReceiver {
    receiver: mpsc::UnboundedReceiver<Envelope>,
}

/// Create an in-process task queue.
pub fn task_queue() -> (TaskQueue, TaskReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (TaskQueue { sender }, TaskReceiver { receiver })
}

impl TaskQueue {
    /// Put a task back on the queue, keeping its attempt count.
    pub fn requeue(&self, envelope: Envelope) -> Result<()> {
        let task = envelope.task.to_string();
        self.sender.send(envelope).map_err(|_| Error::Schedule {
            task,
            reason: "task queue is closed".to_string(),
        })
    }
}

#[async_trait]
impl TaskScheduler for TaskQueue {
    async fn schedule(&self, task: Task) -> Result<()> {
        debug!(%task, "scheduling task");
        self.requeue(Envelope::new(task))
    }
}

impl TaskReceiver {
    /// Next task, or `None` once every [`TaskQueue`] is dropped.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// Next task if one is queued right now.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }
}

/// Scheduler that only collects tasks; the caller decides when they run.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    tasks: Mutex<Vec<Task>>,
    capacity: Option<usize>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler that rejects every task after the first `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: Mutex::new(vec![]),
            capacity: Some(capacity),
        }
    }

    /// Tasks scheduled so far.
    pub async fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().await.clone()
    }

    /// Remove and return the tasks scheduled so far.
    pub async fn take(&self) -> Vec<Task> {
        std::mem::take(&mut *self.tasks.lock().await)
    }
}

#[async_trait]
impl TaskScheduler for ManualScheduler {
    async fn schedule(&self, task: Task) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if self.capacity.is_some_and(|capacity| tasks.len() >= capacity) {
            return Err(Error::Schedule {
                task: task.to_string(),
                reason: "scheduler is full".to_string(),
            });
        }
        tasks.push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobKey;

    #[tokio::test]
    async fn queue_delivers_scheduled_and_requeued_tasks() {
        let (queue, mut receiver) = task_queue();
        let task = Task::ReduceJob(JobKey::generate());

        queue.schedule(task.clone()).await.unwrap();
        let envelope = receiver.recv().await.unwrap();
        assert_eq!(envelope, Envelope::new(task.clone()));

        queue.requeue(envelope.retry()).unwrap();
        assert_eq!(receiver.recv().await.unwrap().attempt, 1);
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn closed_queue_rejects_tasks() {
        let (queue, receiver) = task_queue();
        drop(receiver);

        let err = queue.schedule(Task::ReduceJob(JobKey::generate())).await.unwrap_err();
        assert!(matches!(err, Error::Schedule { .. }));
    }

    #[tokio::test]
    async fn manual_scheduler_rejects_past_capacity() {
        let scheduler = ManualScheduler::with_capacity(1);
        let job = JobKey::generate();

        scheduler.schedule(Task::ReduceJob(job.clone())).await.unwrap();
        assert!(scheduler.schedule(Task::ReduceJob(job.clone())).await.is_err());
        assert_eq!(scheduler.take().await, vec![Task::ReduceJob(job)]);
        assert!(scheduler.tasks().await.is_empty());
    }
}
