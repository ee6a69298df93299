//! Execution streams
//!
//! A stream is an in-order launch queue. Launches return as soon as the job
//! is queued; the stream's worker thread runs jobs one after another on the
//! device pool. Callers must synchronize before reading a destination.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use crate::device::Device;
use crate::error::Result;

static NEXT_STREAM_ID: AtomicUsize = AtomicUsize::new(0);

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run { label: &'static str, job: Job },
    Fence(oneshot::Sender<()>),
}

/// In-order asynchronous launch queue on one device
pub struct Stream {
    id: usize,
    device: Device,
    tx: Option<mpsc::UnboundedSender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").field("id", &self.id).finish()
    }
}

impl Stream {
    /// Create a stream with its own worker thread
    pub fn new(device: &Device) -> Result<Self> {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let worker_device = device.clone();
        let worker = std::thread::Builder::new()
            .name(format!("{}-stream-{}", device.config().thread_name_prefix, id))
            .spawn(move || run_worker(id, worker_device, rx))?;
        debug!(stream = id, "Stream created");
        Ok(Self {
            id,
            device: device.clone(),
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Stream on the process-wide device
    pub fn on_global_device() -> Result<Self> {
        Self::new(Device::global()?)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Queue `job` behind every earlier launch on this stream
    pub fn launch<F>(&self, label: &'static str, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        trace!(stream = self.id, kernel = label, "Queueing launch");
        self.send(Command::Run { label, job: Box::new(job) });
    }

    /// Block until every launch queued so far has finished.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`Stream::synchronized`] there.
    pub fn synchronize(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Fence(tx)) {
            let _ = rx.blocking_recv();
        }
    }

    /// Wait for every launch queued so far to finish
    pub async fn synchronized(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Fence(tx)) {
            let _ = rx.await;
        }
    }

    fn send(&self, command: Command) -> bool {
        match &self.tx {
            Some(tx) if tx.send(command).is_ok() => true,
            _ => {
                error!(stream = self.id, "Stream worker is gone; dropping command");
                false
            }
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain the queue and exit
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        debug!(stream = self.id, "Stream destroyed");
    }
}

fn run_worker(id: usize, device: Device, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Run { label, job } => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| device.install(job)));
                if outcome.is_err() {
                    error!(stream = id, kernel = label, "Device fault during kernel execution; aborting");
                    std::process::abort();
                }
            }
            Command::Fence(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    fn device() -> Device {
        Device::new(DeviceConfig { worker_threads: 2, ..Default::default() }).unwrap()
    }

    #[test]
    fn test_launches_run_in_order() {
        let stream = Stream::new(&device()).unwrap();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..16 {
            let log = Arc::clone(&log);
            stream.launch("order", move || log.lock().push(i));
        }
        stream.synchronize();
        assert_eq!(*log.lock(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_drop_drains_queue() {
        let counter = Arc::new(AtomicU32::new(0));
        {
            let stream = Stream::new(&device()).unwrap();
            for _ in 0..8 {
                let counter = Arc::clone(&counter);
                stream.launch("count", move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_async_synchronize() {
        let stream = Stream::new(&device()).unwrap();
        let flag = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&flag);
        stream.launch("flag", move || f.store(1, Ordering::SeqCst));
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(stream.synchronized());
        assert_eq!(flag.load(Ordering::SeqCst), 1);
    }
}
