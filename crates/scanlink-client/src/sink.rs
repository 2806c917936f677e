//! Sample sinks
//!
//! A sink consumes the batches an acquisition loop produces. Persistence and
//! rendering live outside this crate; the sinks here cover in-process use.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use scanlink_protocol::ScanBatch;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Consumer of scan batches
pub trait SampleSink: Send {
    fn accept(&mut self, batch: ScanBatch) -> io::Result<()>;

    /// Called once when acquisition ends
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: SampleSink + ?Sized> SampleSink for Box<S> {
    fn accept(&mut self, batch: ScanBatch) -> io::Result<()> {
        (**self).accept(batch)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Keeps every batch in memory
///
/// Clones share the same storage, so a test can keep one and hand the other
/// to a loop.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    batches: Arc<Mutex<Vec<ScanBatch>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<ScanBatch> {
        self.batches.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take(&self) -> Vec<ScanBatch> {
        std::mem::take(&mut *self.batches.lock())
    }
}

impl SampleSink for CollectingSink {
    fn accept(&mut self, batch: ScanBatch) -> io::Result<()> {
        self.batches.lock().push(batch);
        Ok(())
    }
}

/// Forwards batches to another thread (a live plotter, for example)
///
/// Never blocks acquisition: when the channel is full the batch is dropped
/// and counted. A disconnected receiver is reported as `BrokenPipe`.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<ScanBatch>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    pub fn new(tx: Sender<ScanBatch>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sink plus the receiving end of a channel holding `capacity` batches
    pub fn bounded(capacity: usize) -> (Self, Receiver<ScanBatch>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(tx), rx)
    }

    /// Batches dropped because the consumer fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SampleSink for ChannelSink {
    fn accept(&mut self, batch: ScanBatch) -> io::Result<()> {
        match self.tx.try_send(batch) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(batch)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(
                    "Consumer behind, dropped batch {} of {}",
                    batch.sequence(),
                    batch.device_tag()
                );
                Ok(())
            },
            Err(TrySendError::Disconnected(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "batch consumer disconnected",
            )),
        }
    }
}

/// Hands every batch to several sinks in order
///
/// Stops at the first sink that fails.
#[derive(Default)]
pub struct FanOutSink {
    sinks: Vec<Box<dyn SampleSink>>,
}

impl FanOutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl SampleSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn SampleSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl SampleSink for FanOutSink {
    fn accept(&mut self, batch: ScanBatch) -> io::Result<()> {
        let Some((last, rest)) = self.sinks.split_last_mut() else {
            return Ok(());
        };
        for sink in rest {
            sink.accept(batch.clone())?;
        }
        last.accept(batch)
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}
