//! Per-transfer bandwidth limiting

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{Instant, Sleep};

/// Wraps a reader so that the average read rate stays at or below
/// `bytes_per_sec`. Each wrapper keeps its own budget.
pub struct Throttled<R> {
    inner: R,
    bytes_per_sec: Option<u64>,
    started: Instant,
    transferred: u64,
    pause: Option<Pin<Box<Sleep>>>,
}

impl<R> Throttled<R> {
    /// `None` or `Some(0)` disables throttling.
    pub fn new(inner: R, bytes_per_sec: Option<u64>) -> Self {
        Self {
            inner,
            bytes_per_sec: bytes_per_sec.filter(|rate| *rate > 0),
            started: Instant::now(),
            transferred: 0,
            pause: None,
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn schedule_pause(&mut self) {
        let Some(rate) = self.bytes_per_sec else {
            return;
        };

        let due = Duration::from_secs_f64(self.transferred as f64 / rate as f64);
        let elapsed = self.started.elapsed();
        if due > elapsed {
            self.pause = Some(Box::pin(tokio::time::sleep(due - elapsed)));
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Throttled<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;

        if let Some(pause) = this.pause.as_mut() {
            ready!(pause.as_mut().poll(cx));
            this.pause = None;
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let read = buf.filled().len() - before;

        this.transferred += read as u64;
        if read > 0 {
            this.schedule_pause();
        }

        Poll::Ready(Ok(()))
    }
}
