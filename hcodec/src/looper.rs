// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Single-threaded serialized executor.
//!
//! A [`MessageLoop`] owns one thread and one handler. Every message, whether
//! posted by a client, by the component's callback thread or by the handler
//! itself (delayed watchdogs), is processed on that thread in arrival order.
//! Delayed messages are ordered by deadline, ties by submission order.

use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    sync::mpsc::{self, RecvTimeoutError},
    thread::{JoinHandle, ThreadId},
    time::{Duration, Instant},
};

use tracing::{debug, error, trace};

use crate::{Error, Result};

/// Receives the messages of a [`MessageLoop`] on the loop thread.
pub(crate) trait Handler: Send + 'static {
    type Msg: Send + 'static;

    fn handle(&mut self, msg: Self::Msg);

    /// Called once on the loop thread after the last message.
    fn on_exit(&mut self) {}
}

enum Envelope<M> {
    Now(M),
    Delayed(Instant, M),
    Quit,
}

struct Timed<M> {
    deadline: Instant,
    seq: u64,
    msg: M,
}

impl<M> PartialEq for Timed<M> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<M> Eq for Timed<M> {}

impl<M> PartialOrd for Timed<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for Timed<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// One-shot reply slot of a synchronous request.
///
/// A reply is delivered exactly once: either explicitly through
/// [`Replier::send`] or, if the request is dropped unanswered, as an error.
pub(crate) struct Replier<R> {
    tx: Option<mpsc::SyncSender<Result<R>>>,
}

impl<R> Replier<R> {
    pub(crate) fn send(mut self, result: Result<R>) {
        if let Some(tx) = self.tx.take() {
            // The caller may have timed out and gone away; that is not an error here.
            let _ = tx.send(result);
        }
    }
}

impl<R> Drop for Replier<R> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(Error::Other("Request dropped without reply.".to_string())));
        }
    }
}

impl<R> std::fmt::Debug for Replier<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replier")
            .field("pending", &self.tx.is_some())
            .finish()
    }
}

/// Cloneable handle for posting into a loop.
pub(crate) struct LoopSender<M> {
    tx: mpsc::Sender<Envelope<M>>,
}

impl<M> Clone for LoopSender<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M: Send + 'static> LoopSender<M> {
    /// Fire-and-forget submission.
    pub(crate) fn post(&self, msg: M) -> Result<()> {
        self.tx
            .send(Envelope::Now(msg))
            .map_err(|_| Error::Other("Message loop has exited.".to_string()))
    }

    /// Submission processed no earlier than `delay` from now.
    pub(crate) fn post_delayed(&self, msg: M, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return self.post(msg);
        }
        self.tx
            .send(Envelope::Delayed(Instant::now() + delay, msg))
            .map_err(|_| Error::Other("Message loop has exited.".to_string()))
    }
}

/// Owner of the loop thread.
pub(crate) struct MessageLoop<M: Send + 'static> {
    sender: LoopSender<M>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl<M: Send + 'static> MessageLoop<M> {
    /// Spawns the loop thread. `build` receives a sender so the handler can
    /// post to itself and hand the sender to other threads.
    pub(crate) fn spawn<H, F>(name: String, build: F) -> Result<Self>
    where
        H: Handler<Msg = M>,
        F: FnOnce(LoopSender<M>) -> H,
    {
        let (tx, rx) = mpsc::channel();
        let sender = LoopSender { tx };
        let handler = build(sender.clone());
        let thread = std::thread::Builder::new()
            .name(name)
            .spawn(move || run(handler, rx))?;
        let thread_id = thread.thread().id();
        Ok(Self {
            sender,
            thread: Some(thread),
            thread_id,
        })
    }

    pub(crate) fn sender(&self) -> &LoopSender<M> {
        &self.sender
    }

    /// Returns `true` when called from the loop thread itself.
    pub(crate) fn is_loop_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    pub(crate) fn post(&self, msg: M) -> Result<()> {
        self.sender.post(msg)
    }

    /// Posts the message built by `make` and blocks for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no reply arrives within `timeout`. The
    /// request itself is not cancelled and will still be processed.
    pub(crate) fn send_sync<R, F>(&self, make: F, timeout: Duration) -> Result<R>
    where
        F: FnOnce(Replier<R>) -> M,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.sender.post(make(Replier { tx: Some(tx) }))?;
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Other("Message loop has exited.".to_string()))
            }
        }
    }

    /// Stops the loop after the messages already queued and joins the thread.
    pub(crate) fn quit(&mut self) {
        let _ = self.sender.tx.send(Envelope::Quit);
        if let Some(thread) = self.thread.take() {
            if self.is_loop_thread() {
                error!("Message loop asked to join itself; detaching instead");
                return;
            }
            if thread.join().is_err() {
                error!("Message loop thread panicked");
            }
        }
    }
}

impl<M: Send + 'static> Drop for MessageLoop<M> {
    fn drop(&mut self) {
        self.quit();
    }
}

fn run<H: Handler>(mut handler: H, rx: mpsc::Receiver<Envelope<H::Msg>>) {
    let mut delayed: BinaryHeap<Reverse<Timed<H::Msg>>> = BinaryHeap::new();
    let mut seq = 0u64;
    loop {
        let now = Instant::now();
        while delayed
            .peek()
            .is_some_and(|Reverse(timed)| timed.deadline <= now)
        {
            if let Some(Reverse(timed)) = delayed.pop() {
                trace!(seq = timed.seq, "Delivering delayed message");
                handler.handle(timed.msg);
            }
        }

        let envelope = match delayed.peek() {
            Some(Reverse(next)) => {
                match rx.recv_timeout(next.deadline.saturating_duration_since(now)) {
                    Ok(envelope) => envelope,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(envelope) => envelope,
                Err(_) => break,
            },
        };

        match envelope {
            Envelope::Now(msg) => handler.handle(msg),
            Envelope::Delayed(deadline, msg) => {
                seq += 1;
                delayed.push(Reverse(Timed { deadline, seq, msg }));
            }
            Envelope::Quit => break,
        }
    }
    debug!(dropped_delayed = delayed.len(), "Message loop exiting");
    handler.on_exit();
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    enum TestMsg {
        Push(u32),
        Echo(u32, Replier<u32>),
        Hang(Replier<u32>),
    }

    struct Recorder {
        seen: Arc<Mutex<Vec<u32>>>,
        parked: Vec<Replier<u32>>,
    }

    impl Handler for Recorder {
        type Msg = TestMsg;

        fn handle(&mut self, msg: TestMsg) {
            match msg {
                TestMsg::Push(value) => self.seen.lock().unwrap().push(value),
                TestMsg::Echo(value, reply) => reply.send(Ok(value * 2)),
                TestMsg::Hang(reply) => self.parked.push(reply),
            }
        }
    }

    fn spawn() -> (MessageLoop<TestMsg>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler_seen = seen.clone();
        let looper = MessageLoop::spawn("looper-test".to_string(), move |_| Recorder {
            seen: handler_seen,
            parked: Vec::new(),
        })
        .unwrap();
        (looper, seen)
    }

    #[test]
    fn preserves_order_and_delays() {
        let (looper, seen) = spawn();
        let sender = looper.sender().clone();
        sender
            .post_delayed(TestMsg::Push(3), Duration::from_millis(60))
            .unwrap();
        sender
            .post_delayed(TestMsg::Push(2), Duration::from_millis(30))
            .unwrap();
        sender.post(TestMsg::Push(1)).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn sync_call_replies_or_times_out() {
        let (looper, _) = spawn();
        let doubled = looper
            .send_sync(|reply| TestMsg::Echo(21, reply), Duration::from_secs(1))
            .unwrap();
        assert_eq!(doubled, 42);
        assert!(matches!(
            looper.send_sync(TestMsg::Hang, Duration::from_millis(20)),
            Err(Error::Timeout)
        ));
        assert!(!looper.is_loop_thread());
    }
}
