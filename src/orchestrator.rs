//! Pipeline Orchestrator (spec.md §4.7): spawns the capture-producer and
//! encode-consumer threads, coordinates shutdown through [`StopToken`] and
//! the frame queue's producer-done signal, and enforces the
//! capture-duration timeout from the calling thread.
//!
//! Thread naming ("capture"/"encode") follows the teacher's own
//! `thread::Builder` convention in its worker-pool helper, generalized from
//! an N-thread pool down to this crate's fixed two-thread producer/consumer
//! shape, and `std::thread::scope` replaces the teacher's manual
//! `catch_unwind` bookkeeping since a scoped thread's panic already
//! surfaces through `JoinHandle::join`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::capture::PlatformCapturer;
use crate::error::{CatResult, Error};
use crate::gifenc::{GifAssembler, GifConfig};
use crate::progress::ProgressReporter;
use crate::queue::FrameQueue;
use crate::rect::Rect;
use crate::tap::FrameTap;

/// Drives one capture-to-GIF session end to end (spec.md §4.7 state
/// diagram: producer/consumer tasks plus a timeout-driven shutdown).
pub struct Pipeline;

impl Pipeline {
    /// Captures `region` (or the full display, if `None`) for `duration`,
    /// encoding the resulting frames into `gif_config.path`.
    ///
    /// Returns the first error either thread encountered. A fatal error in
    /// either task requests shutdown of the other (spec.md §4.7:
    /// "propagates the error through the join"); a partial GIF is still
    /// finalized on a consumer error ("best-effort close").
    pub fn run(
        capturer: Box<dyn PlatformCapturer>,
        region: Option<Rect>,
        gif_config: GifConfig,
        duration: Duration,
        progress: &mut dyn ProgressReporter,
    ) -> CatResult<()> {
        let queue = Arc::new(FrameQueue::new());

        let mut tap: FrameTap<Arc<FrameQueue>> = FrameTap::new(capturer, Arc::clone(&queue));
        if let Some(rect) = region {
            tap.set_region(rect);
        }
        tap.set_frame_handler(Box::new(|queue: &mut Arc<FrameQueue>, frame| {
            queue.push(frame);
            Ok(())
        }));
        // Must be taken before `begin()` consumes `tap` on the producer thread.
        let stop_token = tap.stop_token();

        thread::scope(|scope| -> CatResult<()> {
            let producer_queue = Arc::clone(&queue);
            let producer = thread::Builder::new()
                .name("capture".to_string())
                .spawn_scoped(scope, move || {
                    let result = tap.begin();
                    // Posts both the "new-frame" and "producer-done" signals
                    // (spec.md §4.3), waking a consumer blocked on an empty queue.
                    producer_queue.close();
                    result
                })
                .map_err(|e| Error::Internal(format!("failed to spawn capture thread: {e}")))?;

            let consumer_queue = Arc::clone(&queue);
            let consumer = thread::Builder::new()
                .name("encode".to_string())
                .spawn_scoped(scope, move || Self::encode_loop(&consumer_queue, gif_config, progress))
                .map_err(|e| Error::Internal(format!("failed to spawn encode thread: {e}")))?;

            thread::sleep(duration);
            // The only cancellation primitive (spec.md §5); idempotent and
            // callable here even though `tap` itself has already moved.
            stop_token.stop();

            let producer_result = producer.join().map_err(|_| Error::Internal("capture thread panicked".into()))?;
            let consumer_result = consumer.join().map_err(|_| Error::Internal("encode thread panicked".into()))?;

            // The capture failure is usually the root cause of a subsequent
            // encode failure, so surface it first.
            producer_result.and(consumer_result)
        })
    }

    fn encode_loop(queue: &FrameQueue, gif_config: GifConfig, progress: &mut dyn ProgressReporter) -> CatResult<()> {
        let mut gif = GifAssembler::new(gif_config);
        gif.init()?;

        let mut encode_result = Ok(());
        while let Some(frame) = queue.pop_blocking() {
            if let Err(e) = gif.add_frame(frame.image.buffer(), frame.duration_ms) {
                encode_result = Err(e);
                break;
            }
            if !progress.increase() {
                break;
            }
        }

        let close_result = gif.close();
        progress.done(if encode_result.is_ok() && close_result.is_ok() { "done" } else { "failed" });
        encode_result.and(close_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SyntheticCapturer, SyntheticFrame};
    use crate::progress::NoProgress;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    #[test]
    fn end_to_end_capture_produces_a_gif() {
        let frames: Vec<SyntheticFrame> = (0..8)
            .map(|i| SyntheticFrame { bgra: [i * 20, i * 10, 255 - i * 20, 255], hold: StdDuration::from_millis(2) })
            .collect();
        let capturer = Box::new(SyntheticCapturer::new(4, 4, frames));

        let dir = tempdir().unwrap();
        let gif_config = GifConfig::new(4, 4, dir.path().join("out.gif"));

        let mut progress = NoProgress;
        Pipeline::run(capturer, None, gif_config, StdDuration::from_millis(50), &mut progress).unwrap();

        let bytes = std::fs::read(dir.path().join("out.gif")).unwrap();
        assert_eq!(&bytes[0..6], b"GIF89a");
    }

    #[test]
    fn zero_duration_run_closes_cleanly_without_writing_a_file() {
        // No samples means no frame ever reaches `add_frame`, so the GIF
        // writer is never opened; `close()` on an empty session is a no-op.
        let capturer = Box::new(SyntheticCapturer::new(2, 2, vec![]));
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.gif");
        let gif_config = GifConfig::new(2, 2, &path);
        let mut progress = NoProgress;
        let result = Pipeline::run(capturer, None, gif_config, StdDuration::from_millis(0), &mut progress);
        assert!(result.is_ok());
        assert!(!path.exists());
    }
}
