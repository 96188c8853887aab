//! Sample readers on top of a [`Receiver`].
//!
//! [`IqReader`] is a blocking iterator; [`AsyncIqReader`] moves the blocking
//! bulk reads to a background thread and hands the chunks over a bounded
//! channel as a [`futures::Stream`].

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use tracing::{debug, warn};

use crate::device::Receiver;
use crate::error::Result;
use crate::stream::{IqSample, RxStream, StreamArgs};
use crate::transport::Transport;

/// Chunks buffered between the reader thread and the consumer.
const CHANNEL_DEPTH: usize = 32;

/**
 * Synchronous I/Q Reader
 */
pub struct IqReader<'a, T: Transport, S: IqSample> {
    receiver: &'a Receiver<T>,
    stream: RxStream,
    buf: Vec<S>,
}

impl<'a, T: Transport, S: IqSample> IqReader<'a, T, S> {
    /// Set up and activate a stream in the format of `S`.
    pub fn new(receiver: &'a Receiver<T>, args: &StreamArgs) -> Self {
        let mut stream = receiver.setup_stream(S::FORMAT, args);
        receiver.activate_stream(&mut stream);
        let buf = vec![S::from_raw(0, 0); stream.mtu()];
        Self {
            receiver,
            stream,
            buf,
        }
    }

    pub fn stream(&self) -> &RxStream {
        &self.stream
    }
}

impl<T: Transport, S: IqSample> Iterator for IqReader<'_, T, S> {
    type Item = Result<Vec<S>>;

    /// Yields one chunk per bulk read, possibly empty when every pair was a
    /// dropout marker. Ends when a bulk read returns no bytes.
    fn next(&mut self) -> Option<Self::Item> {
        match self.receiver.read_stream(&mut self.stream, &mut self.buf) {
            Ok(n) => {
                if n == 0 && self.stream.last_read_len() == 0 {
                    return None;
                }
                Some(Ok(self.buf[..n].to_vec()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl<T: Transport, S: IqSample> Drop for IqReader<'_, T, S> {
    fn drop(&mut self) {
        self.receiver.deactivate_stream(&mut self.stream);
    }
}

/**
 * Asynchronous I/Q Reader
 */
pub struct AsyncIqReader<S: IqSample> {
    rx: tokio::sync::mpsc::Receiver<Result<Vec<S>>>,
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl<S: IqSample> AsyncIqReader<S> {
    /// Start streaming from `receiver` on a background thread.
    ///
    /// The thread ends after the first error, when a bulk read returns no
    /// bytes, or once the reader is dropped. Dropping the reader joins the
    /// thread, so its handle on `receiver` is released by then; this can
    /// block for up to one bulk timeout.
    pub fn new<T>(receiver: Arc<Receiver<T>>, args: &StreamArgs) -> Self
    where
        T: Transport + 'static,
    {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Vec<S>>>(CHANNEL_DEPTH);
        let stop = Arc::new(AtomicBool::new(false));

        let mut stream = receiver.setup_stream(S::FORMAT, args);
        receiver.activate_stream(&mut stream);
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            let mut buffer = vec![S::from_raw(0, 0); stream.mtu()];

            while !thread_stop.load(Ordering::Relaxed) {
                match receiver.read_stream(&mut stream, &mut buffer) {
                    Ok(n) => {
                        if n == 0 && stream.last_read_len() == 0 {
                            debug!("Bulk pipe returned no data, stopping reader");
                            break;
                        }
                        if n == 0 {
                            continue;
                        }
                        if tx.blocking_send(Ok(buffer[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Stream read failed: {}", e);
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }

            receiver.close_stream(stream);
        });

        Self {
            rx,
            stop,
            handle: Some(handle),
        }
    }
}

impl<S: IqSample> Stream for AsyncIqReader<S> {
    type Item = Result<Vec<S>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<S: IqSample> Drop for AsyncIqReader<S> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // unblocks a thread waiting on a full channel
        self.rx.close();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("I/Q reader thread panicked");
        }
    }
}
