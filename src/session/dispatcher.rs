//! Cross-thread dispatch
//!
//! A [`DispatchLoop`] is created on the thread that must observe results (the
//! owning thread) and hands out [`Dispatcher`]s. Work sent through a dispatcher
//! runs on the owning thread, one unit at a time, in the order it was queued.
//! A detached dispatcher has no owning thread and runs work inline.

use std::sync::mpsc;
use std::thread::{self, ThreadId};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Job(Job),
    Quit,
}

#[derive(Clone)]
struct Owner {
    thread: ThreadId,
    tx: mpsc::Sender<Message>,
}

/// Marshals work onto the owning thread, if there is one
#[derive(Clone)]
pub struct Dispatcher {
    owner: Option<Owner>,
}

impl Dispatcher {
    /// Dispatcher without an owning thread (headless)
    pub fn detached() -> Self {
        Self { owner: None }
    }

    /// Run `work` on the owning thread.
    ///
    /// With `is_async` the call returns as soon as the work is queued, otherwise
    /// it blocks until the owning thread has run it. Without an owning thread,
    /// or once the owning loop is gone, the work runs on the calling thread.
    pub fn run<F>(&self, work: F, is_async: bool)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(owner) = &self.owner else {
            work();
            return;
        };

        // Blocking on ourselves would never finish
        if !is_async && thread::current().id() == owner.thread {
            work();
            return;
        }

        if is_async {
            if let Err(mpsc::SendError(Message::Job(job))) =
                owner.tx.send(Message::Job(Box::new(work)))
            {
                debug!("Owning loop is gone, running dispatched work inline");
                job();
            }
            return;
        }

        let (done_tx, done_rx) = mpsc::channel::<()>();
        let job: Job = Box::new(move || {
            work();
            let _ = done_tx.send(());
        });

        match owner.tx.send(Message::Job(job)) {
            Ok(()) => {
                // Err here means the loop dropped the job unrun; nothing to wait for
                let _ = done_rx.recv();
            }
            Err(mpsc::SendError(Message::Job(job))) => {
                debug!("Owning loop is gone, running dispatched work inline");
                job();
            }
            Err(_) => {}
        }
    }
}

/// Stops a running [`DispatchLoop`]
#[derive(Clone)]
pub struct QuitHandle {
    tx: mpsc::Sender<Message>,
}

impl QuitHandle {
    pub fn quit(&self) {
        let _ = self.tx.send(Message::Quit);
    }
}

/// Work queue owned by the thread that creates it
pub struct DispatchLoop {
    thread: ThreadId,
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<Message>,
}

impl DispatchLoop {
    /// Create a loop owned by the current thread
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            thread: thread::current().id(),
            tx,
            rx,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            owner: Some(Owner {
                thread: self.thread,
                tx: self.tx.clone(),
            }),
        }
    }

    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run everything queued so far without blocking. Returns the number of
    /// units run. A pending quit request is left for [`run`](Self::run).
    #[cfg(test)]
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Job(job) => {
                    job();
                    ran += 1;
                }
                Message::Quit => {
                    // Re-queue so a later run() still sees it
                    let _ = self.tx.send(Message::Quit);
                    break;
                }
            }
        }
        ran
    }

    /// Process queued work until a quit request arrives, then drain what is
    /// left so no blocked caller waits forever.
    pub fn run(self) {
        debug!("Dispatch loop running");
        while let Ok(message) = self.rx.recv() {
            match message {
                Message::Job(job) => job(),
                Message::Quit => break,
            }
        }

        while let Ok(message) = self.rx.try_recv() {
            if let Message::Job(job) = message {
                job();
            }
        }
        debug!("Dispatch loop stopped");
    }
}

impl Default for DispatchLoop {
    fn default() -> Self {
        Self::new()
    }
}
