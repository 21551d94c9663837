use std::thread::{self, JoinHandle};

use sg_core::error::PipelineError;
use sg_core::record::FeatureRecord;
use sg_core::traits::FeatureEmitter;

/// Runs an emitter on its own thread behind a bounded queue.
///
/// `send` only clones the record into the queue: it never waits on the
/// transport. When the queue is full the record is dropped and `send`
/// reports an [`PipelineError::EmitterFault`]. Failures of the inner
/// emitter come back through the next call to `send`.
///
/// Dropping the wrapper flushes what is queued, then joins the thread.
///
/// # Example
/// ```
/// use sg_core::{FeatureEmitter, FeatureRecord};
/// use sg_emit::{BufferedEmitter, JsonLinesEmitter};
///
/// let mut emitter = BufferedEmitter::spawn(JsonLinesEmitter::new(Vec::new()), 16).unwrap();
/// emitter.send(&FeatureRecord::silent(12, 0.0)).unwrap();
/// ```
pub struct BufferedEmitter {
    tx: Option<flume::Sender<FeatureRecord>>,
    errors: flume::Receiver<PipelineError>,
    worker: Option<JoinHandle<()>>,
    inner_name: &'static str,
}

impl BufferedEmitter {
    /// Move `inner` to a new `sg-emit` thread fed by a queue of `depth` records.
    ///
    /// # Errors
    /// Returns [`PipelineError::EmitterFault`] if the thread cannot be spawned.
    pub fn spawn<E: FeatureEmitter>(mut inner: E, depth: usize) -> Result<Self, PipelineError> {
        let depth = depth.max(1);
        let (tx, rx) = flume::bounded::<FeatureRecord>(depth);
        let (err_tx, errors) = flume::bounded(depth);
        let inner_name = inner.name();

        let worker = thread::Builder::new()
            .name("sg-emit".to_string())
            .spawn(move || {
                let mut failing = false;
                for record in rx {
                    match inner.send(&record) {
                        Ok(()) => failing = false,
                        Err(e) => {
                            if !failing {
                                log::debug!("{inner_name} failed on the emit thread: {e}");
                            }
                            failing = true;
                            // full: the analysis side has not picked up the previous ones yet
                            let _ = err_tx.try_send(e);
                        }
                    }
                }
                log::debug!("Emit thread for {inner_name} finished");
            })
            .map_err(|e| PipelineError::EmitterFault(format!("cannot spawn emit thread: {e}")))?;

        Ok(Self {
            tx: Some(tx),
            errors,
            worker: Some(worker),
            inner_name,
        })
    }

    /// Records waiting for the emit thread.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tx.as_ref().map_or(0, flume::Sender::len)
    }
}

impl FeatureEmitter for BufferedEmitter {
    fn send(&mut self, record: &FeatureRecord) -> Result<(), PipelineError> {
        let Some(tx) = &self.tx else {
            return Err(PipelineError::EmitterFault(format!("{} is shut down", self.inner_name)));
        };
        match tx.try_send(record.clone()) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(_)) => {
                return Err(PipelineError::EmitterFault(format!(
                    "{} queue full, record dropped",
                    self.inner_name
                )));
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                return Err(PipelineError::EmitterFault(format!(
                    "{} emit thread is gone",
                    self.inner_name
                )));
            }
        }
        self.errors.try_recv().map_or(Ok(()), Err)
    }

    fn name(&self) -> &'static str {
        self.inner_name
    }
}

impl Drop for BufferedEmitter {
    fn drop(&mut self) {
        // closing the queue lets the thread drain it and exit
        self.tx = None;
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::error!("Emit thread for {} panicked", self.inner_name);
        }
    }
}
