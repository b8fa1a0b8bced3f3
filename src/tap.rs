//! Frame Tap (spec.md §4.2): a generic adapter that binds a user-supplied
//! context and frame handler to a [`PlatformCapturer`], converting OS-layer
//! frame events into typed [`Frame`]s with durations.
//!
//! This is also where the "previous frame + timestamp diff" duration
//! bookkeeping from spec.md §4.1 lives: the capturer only hands over raw,
//! timestamp-less samples; the tap is what turns a stream of samples into a
//! stream of `Frame { image, duration_ms }`, always one sample behind
//! (spec.md §9: "introduces a one-frame latency in the output stream;
//! acceptable for a capture tool").
//!
//! The raw capturer callback and the call to `begin()` run on the same
//! thread (the backend's poll loop *is* `begin()`), so the handler is
//! invoked directly from inside the raw callback as each sample lands —
//! there's no second thread to hand frames off to. The handler still needs
//! to be reachable after `begin()` returns, for the final tail frame, so
//! it's kept behind an `Arc<Mutex<_>>` shared between the closure and this
//! function rather than captured by value in two places.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::capture::{PlatformCapturer, StopToken};
use crate::error::{CatResult, Error};
use crate::image::{Frame, ImageData, PixelFormat};
use crate::rect::Rect;

pub type FrameHandler<Ctx> = Box<dyn FnMut(&mut Ctx, Frame) -> CatResult<()> + Send>;

struct PendingSample {
    image: ImageData,
    at: Instant,
}

/// State shared between the raw capturer callback and `begin()`'s own
/// thread once the capture loop returns. `handler` lives here rather than
/// on the stack because it must be reachable both from inside the 'static
/// raw callback (per frame) and from `begin()` after `self.capturer.begin()`
/// returns (for the tail frame).
struct Shared<Ctx> {
    ctx: Ctx,
    handler: FrameHandler<Ctx>,
    pending: Option<PendingSample>,
    last_duration_ms: Option<f64>,
    error: Option<Error>,
}

/// Binds a [`PlatformCapturer`] to a user context and a typed frame handler.
pub struct FrameTap<Ctx> {
    capturer: Box<dyn PlatformCapturer>,
    ctx: Ctx,
    handler: Option<FrameHandler<Ctx>>,
    /// Duration given to the final frame if the stream ends without a
    /// following sample to diff against. Defaults to the prior frame's
    /// duration (spec.md §4.1).
    tail_duration_ms: Option<f64>,
}

impl<Ctx: Send + 'static> FrameTap<Ctx> {
    pub fn new(capturer: Box<dyn PlatformCapturer>, ctx: Ctx) -> Self {
        Self { capturer, ctx, handler: None, tail_duration_ms: None }
    }

    pub fn set_region(&mut self, rect: Rect) {
        self.capturer.set_region(rect);
    }

    pub fn set_frame_handler(&mut self, handler: FrameHandler<Ctx>) {
        self.handler = Some(handler);
    }

    /// Overrides the default tail-duration rule (repeat the previous frame's
    /// duration) with a fixed value.
    pub fn set_tail_duration_ms(&mut self, ms: f64) {
        self.tail_duration_ms = Some(ms);
    }

    /// A handle that can request shutdown from another thread while
    /// [`Self::begin`] (which consumes `self`) is running on the producer
    /// thread. Must be obtained before calling `begin`.
    pub fn stop_token(&self) -> StopToken {
        self.capturer.stop_token()
    }

    /// Starts capture. Blocks until [`Self::end`]-equivalent (the
    /// capturer's `end()`) is called from another thread, or a fatal error
    /// occurs. Panics with a clear message if no frame handler was set
    /// (spec.md §4.2).
    pub fn begin(mut self) -> CatResult<()> {
        let handler =
            self.handler.take().unwrap_or_else(|| panic!("FrameTap::begin called without set_frame_handler"));
        let tail_duration_ms = self.tail_duration_ms;
        let stop_token = self.capturer.stop_token();

        let shared = Arc::new(Mutex::new(Shared {
            ctx: self.ctx,
            handler,
            pending: None,
            last_duration_ms: None,
            error: None,
        }));
        let shared_for_callback = Arc::clone(&shared);
        let stop_token_for_callback = stop_token.clone();

        self.capturer.set_frame_handler(Box::new(move |sample| {
            let now = Instant::now();
            let image = match ImageData::new(sample.data.to_vec(), sample.width, sample.height, PixelFormat::Bgra8) {
                Ok(img) => img,
                Err(_) => return,
            };
            let mut state = shared_for_callback.lock().unwrap_or_else(|e| e.into_inner());
            if state.error.is_some() {
                // Already failed; stop_token.stop() was already requested.
                return;
            }
            if let Some(prev) = state.pending.take() {
                let duration_ms = now.duration_since(prev.at).as_secs_f64() * 1000.0;
                state.last_duration_ms = Some(duration_ms);
                let frame = Frame::new(prev.image, duration_ms);
                let Shared { ctx, handler, .. } = &mut *state;
                if let Err(e) = handler(ctx, frame) {
                    state.error = Some(e);
                    stop_token_for_callback.stop();
                    return;
                }
            }
            state.pending = Some(PendingSample { image, at: now });
        }));

        let begin_result = self.capturer.begin();

        let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(e) = state.error.take() {
            return Err(e);
        }

        // Emit the final buffered sample with the tail duration.
        let tail_result = match state.pending.take() {
            Some(prev) => {
                let tail_ms = tail_duration_ms
                    .or(state.last_duration_ms)
                    .unwrap_or(Duration::from_secs_f64(1.0 / 60.0).as_secs_f64() * 1000.0);
                let Shared { ctx, handler, .. } = &mut *state;
                handler(ctx, Frame::new(prev.image, tail_ms))
            }
            None => Ok(()),
        };

        begin_result?;
        tail_result
    }

    /// Requests graceful shutdown; forwards to the underlying capturer.
    pub fn end(&mut self) -> CatResult<()> {
        self.capturer.end()
    }
}
