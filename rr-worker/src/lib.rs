//! Worker side of the room ranking pipeline: staging batches of users,
//! reducing drained jobs, and the runtime that executes both.

use std::sync::Arc;

use common::config::Config;
use common::graph::SocialGraphSource;
use common::scheduler::{task_queue, TaskReceiver};
use common::store::KeyedStore;
use rr_coordinator::Coordinator;

pub mod batch;
pub mod core;
pub mod reduce;
pub mod runtime;

pub use crate::core::{Handled, RoomRankWorker};
pub use runtime::Runtime;

/// Wire a coordinator and a task runtime to one in-process queue.
///
/// Nothing runs until [`Runtime::run`] is given the returned receiver.
pub fn local_pipeline(
    store: Arc<dyn KeyedStore>,
    graph: Arc<dyn SocialGraphSource>,
    config: Config,
) -> (Coordinator, Runtime, TaskReceiver) {
    let (queue, receiver) = task_queue();
    let scheduler = Arc::new(queue.clone());

    let coordinator = Coordinator::new(store.clone(), scheduler.clone(), config.clone());
    let worker = RoomRankWorker::new(store, graph, scheduler);
    let runtime = Runtime::new(worker, queue, config);

    (coordinator, runtime, receiver)
}
