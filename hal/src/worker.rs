//! Dedicated context thread for the OpenGL backend.
//!
//! A GL context is bound to the thread that made it current, so the device
//! owns one worker thread that creates the context and performs every native
//! call. Other threads hand it closures through a channel; jobs run strictly
//! in the order they were sent.

use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;

use crate::error::BackendError;
use crate::native::{GlContext, GlContextFactory};
use crate::types::{Features, Limits};

/// Work executed on the context thread.
pub(crate) type GlJob = Box<dyn FnOnce(&mut dyn GlContext) + Send>;

enum Message {
    Job(GlJob),
    Shutdown,
}

/// Handle to the context thread.
pub(crate) struct GlWorker {
    sender: mpsc::Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    features: Features,
    limits: Limits,
}

impl GlWorker {
    /// Start the thread and create the context on it.
    pub fn spawn(factory: GlContextFactory, name: &str) -> Result<Self, BackendError> {
        let (sender, receiver) = mpsc::channel::<Message>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(Features, Limits), BackendError>>(1);

        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                crate::set_thread_name!(&thread_name);
                let mut context = match factory() {
                    Ok(context) => context,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok((context.features(), context.limits())));
                drop(ready_tx);
                run(context.as_mut(), &receiver);
                log::debug!("GL worker {thread_name:?} stopped");
            })
            .map_err(|e| BackendError::Internal(format!("failed to spawn GL worker: {e}")))?;

        let thread_id = handle.thread().id();
        let (features, limits) = match ready_rx.recv() {
            Ok(Ok(caps)) => caps,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(BackendError::WorkerLost);
            }
        };

        Ok(Self {
            sender,
            thread: Mutex::new(Some(handle)),
            thread_id,
            features,
            limits,
        })
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Whether the calling thread is the context thread.
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queue a job without waiting for it.
    pub fn execute(&self, job: GlJob) -> Result<(), BackendError> {
        self.sender.send(Message::Job(job)).map_err(|_| BackendError::WorkerLost)
    }

    /// Run `f` on the context thread and wait for its result.
    ///
    /// Jobs queued earlier run first.
    pub fn call<R, F>(&self, f: F) -> Result<R, BackendError>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn GlContext) -> R + Send + 'static,
    {
        if self.is_worker_thread() {
            return Err(BackendError::Internal(
                "blocking GL call issued from the context thread".into(),
            ));
        }
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.execute(Box::new(move |ctx| {
            let _ = reply_tx.send(f(ctx));
        }))?;
        reply_rx.recv().map_err(|_| BackendError::WorkerLost)
    }

    /// Stop the thread after every queued job has run.
    ///
    /// Called from the context thread itself (the device was dropped by a
    /// job), the thread is detached and exits after the current job.
    pub fn shutdown(&self) {
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        let _ = self.sender.send(Message::Shutdown);
        if self.is_worker_thread() {
            return;
        }
        if handle.join().is_err() {
            log::error!("GL worker thread panicked");
        }
    }
}

impl Drop for GlWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(context: &mut dyn GlContext, receiver: &mpsc::Receiver<Message>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Job(job) => job(context),
            Message::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::soft::{KernelLibrary, SoftGpu};

    fn spawn_worker() -> GlWorker {
        let gpu = SoftGpu::new(KernelLibrary::new());
        GlWorker::spawn(gpu.gl_context_factory(), "test-gl").unwrap()
    }

    #[test]
    fn test_jobs_run_in_order_on_worker_thread() {
        let worker = spawn_worker();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..8 {
            let order = Arc::clone(&order);
            worker
                .execute(Box::new(move |_| {
                    order.lock().push((i, thread::current().name().map(str::to_string)));
                }))
                .unwrap();
        }
        worker.call(|_| ()).unwrap();

        let order = order.lock();
        assert_eq!(order.iter().map(|(i, _)| *i).collect::<Vec<_>>(), (0..8).collect::<Vec<_>>());
        assert!(order.iter().all(|(_, name)| name.as_deref() == Some("test-gl")));
    }

    #[test]
    fn test_call_returns_value() {
        let worker = spawn_worker();
        let limits = worker.call(|ctx| ctx.limits()).unwrap();
        assert_eq!(limits, worker.limits());
        assert!(!worker.is_worker_thread());
    }

    #[test]
    fn test_execute_after_shutdown_fails() {
        let worker = spawn_worker();
        worker.shutdown();
        worker.shutdown();
        assert_eq!(worker.execute(Box::new(|_| ())), Err(BackendError::WorkerLost));
    }

    #[test]
    fn test_factory_failure_is_reported() {
        let factory: GlContextFactory = Box::new(|| Err(BackendError::Unsupported("no context".into())));
        let result = GlWorker::spawn(factory, "failing");
        assert!(matches!(result, Err(BackendError::Unsupported(_))));
    }
}
