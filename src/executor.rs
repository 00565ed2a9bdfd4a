use futures::{
    future::{BoxFuture, FutureExt},
    task::{waker_ref, ArcWake, Context, Poll},
};
use futures_channel::oneshot;
use queues::{IsQueue, Queue};
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use crate::{TestError, TestResult};

type Ready = Arc<Mutex<Queue<Arc<Task>>>>;

/// Single-threaded cooperative task executor. Tasks are woken by trigger
/// resolution and drained in wake order; exactly one task polls at a time.
#[derive(Clone)]
pub(crate) struct Executor {
    ready: Ready,
    next_id: Arc<AtomicU64>,
    // id of the task currently being polled; 0 when idle. Lets a wait
    // attribute its pending entry to its owning coroutine.
    current: Arc<AtomicU64>,
}

impl Executor {
    pub fn new() -> Self {
        Executor {
            ready: Arc::new(Mutex::new(Queue::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            current: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn spawn(
        &self,
        future: impl Future<Output = TestResult> + Send + 'static,
        name: &str,
    ) -> JoinHandle {
        let (task, handle) = Task::new(self, future.boxed(), name);
        schedule(&self.ready, task);
        handle
    }

    fn next_task(&self) -> Option<Arc<Task>> {
        self.ready.lock().unwrap().remove().ok()
    }

    pub fn current_task(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Poll ready tasks until the queue drains. Stops with `Err` if more than
    /// `budget` tasks were polled, which bounds runaway zero-delay chains.
    pub fn run_once(&self, budget: u64) -> Result<u64, u64> {
        let mut polled = 0;
        while let Some(task) = self.next_task() {
            if polled >= budget {
                schedule(&self.ready, task);
                return Err(polled);
            }
            self.process(task);
            polled += 1;
        }
        Ok(polled)
    }

    fn process(&self, task: Arc<Task>) {
        match *task.state.lock().unwrap() {
            TaskState::Pending => {}
            // cancelled tasks are dropped without execution; completed tasks
            // can be re-woken by a raced trigger and are skipped
            TaskState::Cancelled | TaskState::Done => return,
        }

        let mut fut_slot = task.future.lock().unwrap();
        if let Some(mut fut) = fut_slot.take() {
            self.current.store(task.id, Ordering::Relaxed);
            let waker = waker_ref(&task);
            let context = &mut Context::from_waker(&waker);
            let result = match fut.as_mut().poll(context) {
                Poll::Pending => {
                    *fut_slot = Some(fut);
                    None
                }
                Poll::Ready(result) => Some(result),
            };
            self.current.store(0, Ordering::Relaxed);
            if let Some(result) = result {
                *task.state.lock().unwrap() = TaskState::Done;
                let mut tx_slot = task.join_tx.lock().unwrap();
                if let Some(tx) = tx_slot.take() {
                    let _ = tx.send(result);
                }
            }
        }
    }
}

#[derive(PartialEq)]
enum TaskState {
    Pending,
    Done,
    Cancelled,
}

pub(crate) struct Task {
    id: u64,
    #[allow(dead_code)]
    name: String,
    future: Mutex<Option<BoxFuture<'static, TestResult>>>,
    state: Mutex<TaskState>,
    join_tx: Mutex<Option<oneshot::Sender<TestResult>>>,
    ready: Ready,
}

impl Task {
    fn new(exec: &Executor, fut: BoxFuture<'static, TestResult>, name: &str) -> (Arc<Self>, JoinHandle) {
        let id = exec.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel::<TestResult>();
        let task = Arc::new(Task {
            id,
            name: name.to_string(),
            future: Mutex::new(Some(fut)),
            state: Mutex::new(TaskState::Pending),
            join_tx: Mutex::new(Some(tx)),
            ready: exec.ready.clone(),
        });
        let handle = JoinHandle {
            awaited_task: Some(task.clone()),
            join_rx: rx,
        };
        (task, handle)
    }

    /// Cooperative cancellation: the task is dropped at its next wake, never
    /// mid-poll. Dropping the future releases any pending wheel entry.
    pub fn cancel(&self) {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                TaskState::Pending => *state = TaskState::Cancelled,
                _ => return,
            }
        }
        self.future.lock().unwrap().take();
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule(&arc_self.ready, arc_self.clone());
    }
}

fn schedule(ready: &Ready, task: Arc<Task>) {
    ready.lock().unwrap().add(task).expect("error queueing task");
}

pub struct JoinHandle {
    awaited_task: Option<Arc<Task>>,
    join_rx: oneshot::Receiver<TestResult>,
}

impl JoinHandle {
    pub fn cancel(mut self) {
        if let Some(task) = self.awaited_task.take() {
            task.cancel();
        }
    }
}

impl Future for JoinHandle {
    type Output = TestResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TestError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
