//! Asynchronous request <-> response unit exchanged with browsers.
//!
//! A [`Request`] carries an opaque message and a completion callback. The
//! provider that accepted it calls [`Request::complete`] exactly once, from
//! any thread; the callback then runs synchronously inside that call. The
//! message is never interpreted here: it is bytes in, bytes out.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;

/// Completion function, invoked once with the response message.
pub type Callback = Box<dyn FnOnce(Vec<u8>) + Send + 'static>;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(2);

// Completing twice is a provider bug: fatal in debug builds, logged and
// ignored in release unless `strict-completion` is enabled.
const FATAL_DOUBLE_COMPLETION: bool = cfg!(any(debug_assertions, feature = "strict-completion"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("request {id} has already been completed")]
    AlreadyCompleted { id: u64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("no reply received after {after:?}")]
    Timeout { after: Duration },
    #[error("request was dropped before completion")]
    Abandoned,
}

pub struct Request {
    id: u64,
    message: Vec<u8>,
    callback: Mutex<Option<Callback>>,
    completed: AtomicBool,
    discarded: AtomicBool,
}

impl Request {
    /// Create a new request holding `message`; `callback` runs on completion.
    pub fn create<F>(message: impl Into<Vec<u8>>, callback: F) -> Arc<Self>
    where
        F: FnOnce(Vec<u8>) + Send + 'static,
    {
        let callback: Callback = Box::new(callback);
        Arc::new(Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            message: message.into(),
            callback: Mutex::new(Some(callback)),
            completed: AtomicBool::new(false),
            discarded: AtomicBool::new(false),
        })
    }

    /// Create a request whose response is delivered to the returned [`Reply`].
    ///
    /// Dropping the `Reply` (for instance after a timeout) does not affect the
    /// provider: its late completion is accepted and silently dropped.
    pub fn with_reply(message: impl Into<Vec<u8>>) -> (Arc<Self>, Reply) {
        let (tx, rx) = oneshot::channel();
        let request = Self::create(message, move |response| {
            if tx.send(response).is_err() {
                tracing::debug!("reply receiver gone, dropping late response");
            }
        });
        let reply = Reply {
            request_id: request.id,
            rx,
        };
        (request, reply)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Complete the request and run its callback with `response`.
    ///
    /// Only the first call wins, even when several threads race. Any later
    /// call is a provider bug and never runs the callback again: debug builds
    /// (and release builds with `strict-completion`) panic, release builds log
    /// it and return `AlreadyCompleted`.
    pub fn complete(&self, response: impl Into<Vec<u8>>) -> Result<(), CompletionError> {
        if self
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::error!(request = self.id, "request completed more than once");
            if FATAL_DOUBLE_COMPLETION {
                panic!("request {} completed more than once", self.id);
            }
            return Err(CompletionError::AlreadyCompleted { id: self.id });
        }

        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback(response.into());
        }
        Ok(())
    }

    /// Give up on a pending request (typically after a rejection) so that
    /// dropping it is not reported as a leak.
    pub fn discard(&self) {
        self.discarded.store(true, Ordering::Release);
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        if !*self.completed.get_mut() && !*self.discarded.get_mut() {
            tracing::warn!(
                request = self.id,
                "request dropped while pending, its callback will never run"
            );
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("message_len", &self.message.len())
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Receiving side of [`Request::with_reply`].
#[derive(Debug)]
pub struct Reply {
    request_id: u64,
    rx: oneshot::Receiver<Vec<u8>>,
}

impl Reply {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub async fn recv(self) -> Result<Vec<u8>, ReplyError> {
        self.rx.await.map_err(|_| ReplyError::Abandoned)
    }

    /// Wait at most `after` for the response.
    pub async fn recv_timeout(self, after: Duration) -> Result<Vec<u8>, ReplyError> {
        let request_id = self.request_id;
        match tokio::time::timeout(after, self.recv()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(request = request_id, ?after, "provider did not complete in time");
                Err(ReplyError::Timeout { after })
            }
        }
    }

    /// Block the current thread until the response arrives.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(self) -> Result<Vec<u8>, ReplyError> {
        self.rx.blocking_recv().map_err(|_| ReplyError::Abandoned)
    }

    /// Blocking variant of [`Reply::recv_timeout`] for callers outside a runtime.
    pub fn blocking_recv_timeout(mut self, after: Duration) -> Result<Vec<u8>, ReplyError> {
        let deadline = Instant::now() + after;
        loop {
            if let Some(response) = self.try_recv()? {
                return Ok(response);
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(request = self.request_id, ?after, "provider did not complete in time");
                return Err(ReplyError::Timeout { after });
            }
            std::thread::sleep(BLOCKING_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Non-blocking poll; `Ok(None)` while the request is still pending.
    pub fn try_recv(&mut self) -> Result<Option<Vec<u8>>, ReplyError> {
        match self.rx.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(ReplyError::Abandoned),
        }
    }
}
