//! Real screen capture via the `scrap` crate (macOS Quartz, Windows DXGI/GDI,
//! Linux X11), grounded on the same crate and polling idiom the `cap`
//! example in the retrieval pack uses for its `Capturer`/`Display` dance
//! (`capture/scrap.rs`): `Capturer::frame()` is a pull API that returns
//! `WouldBlock` until a new frame is ready, rather than pushing frames from
//! a background thread, so `begin()`'s poll loop plays the role of the
//! "backend-owned thread" spec.md §4.1 describes.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use scrap::{Capturer, Display};

use crate::error::{CatResult, Error};
use crate::image::{ImageData, PixelFormat};
use crate::rect::Rect;

use super::{Backend, PlatformCapturer, RawFrameHandler, RawSample};

/// Minimum interval between samples, enforced here so a backend that can
/// poll faster than 60Hz doesn't waste cycles oversampling (spec.md §6:
/// "minimum-frame-interval 1/60 s enforced at the capture layer").
const MIN_FRAME_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / 60);

pub struct ScrapCapturer {
    capturer: Capturer,
    screen_width: u32,
    screen_height: u32,
    region: Option<(u32, u32, u32, u32)>,
    handler: Option<RawFrameHandler>,
    stop: Arc<AtomicBool>,
    dropped_samples: u64,
}

impl ScrapCapturer {
    pub fn primary() -> CatResult<Self> {
        let display = Display::primary().map_err(|e| Error::CaptureInitFailed(e.to_string()))?;
        let screen_width = display.width() as u32;
        let screen_height = display.height() as u32;
        let capturer = Capturer::new(display).map_err(|e| Error::CaptureInitFailed(e.to_string()))?;
        Ok(Self {
            capturer,
            screen_width,
            screen_height,
            region: None,
            handler: None,
            stop: Arc::new(AtomicBool::new(false)),
            dropped_samples: 0,
        })
    }

    /// Number of transient (null-buffer / would-block-past-retry) samples
    /// dropped since construction — counted and logged, not fatal (spec.md §4.1).
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }
}

impl PlatformCapturer for ScrapCapturer {
    fn screenshot(&mut self, rect: Option<Rect>) -> CatResult<ImageData> {
        let region = match rect {
            Some(r) => Some(r.clamped_to_screen(self.screen_width, self.screen_height)?),
            None => None,
        };
        let stride;
        let (w, h) = (self.capturer.width(), self.capturer.height());
        let frame = loop {
            match self.capturer.frame() {
                Ok(frame) => break frame,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }
                Err(e) => return Err(Error::CaptureBackendFailed(e.to_string())),
            }
        };
        stride = frame.len() / h;
        let full = ImageData::crop_from_strided(&frame, stride, w as u32, h as u32, PixelFormat::Bgra8)?;
        match region {
            None => Ok(full),
            Some((x, y, rw, rh)) => crop_region(&full, x, y, rw, rh),
        }
    }

    fn begin(&mut self) -> CatResult<()> {
        let mut handler = self.handler.take().ok_or_else(|| Error::Internal("no frame handler set".into()))?;
        self.stop.store(false, Ordering::SeqCst);
        let mut last_sample = Instant::now() - MIN_FRAME_INTERVAL;

        while !self.stop.load(Ordering::SeqCst) {
            let elapsed = last_sample.elapsed();
            if elapsed < MIN_FRAME_INTERVAL {
                thread::sleep(MIN_FRAME_INTERVAL - elapsed);
            }

            let (w, h) = (self.capturer.width(), self.capturer.height());
            let frame = match self.capturer.frame() {
                Ok(frame) => frame,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "capture backend reported a fatal error");
                    return Err(Error::CaptureBackendFailed(e.to_string()));
                }
            };
            if frame.is_empty() {
                self.dropped_samples += 1;
                tracing::debug!(dropped = self.dropped_samples, "dropped empty sample buffer");
                continue;
            }
            let stride = frame.len() / h;
            let cropped = match ImageData::crop_from_strided(&frame, stride, w as u32, h as u32, PixelFormat::Bgra8) {
                Ok(img) => img,
                Err(e) => {
                    self.dropped_samples += 1;
                    tracing::debug!(error = %e, dropped = self.dropped_samples, "dropped malformed sample");
                    continue;
                }
            };
            let cropped = match self.region {
                Some((x, y, rw, rh)) => crop_region(&cropped, x, y, rw, rh)?,
                None => cropped,
            };
            last_sample = Instant::now();
            handler(RawSample { data: cropped.buffer(), width: cropped.width(), height: cropped.height() });
        }

        self.handler = Some(handler);
        Ok(())
    }

    fn end(&mut self) -> CatResult<()> {
        self.stop.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_region(&mut self, rect: Rect) {
        self.region = rect.clamped_to_screen(self.screen_width, self.screen_height).ok();
    }

    fn set_frame_handler(&mut self, handler: RawFrameHandler) {
        self.handler = Some(handler);
    }

    fn backend(&self) -> Backend {
        Backend::current()
    }

    fn stop_token(&self) -> super::StopToken {
        super::StopToken::new(Arc::clone(&self.stop))
    }
}

fn crop_region(full: &ImageData, x: u32, y: u32, w: u32, h: u32) -> CatResult<ImageData> {
    let full_stride = full.width() as usize * 4;
    let x_off = x as usize * 4;
    let mut out = Vec::with_capacity(w as usize * h as usize * 4);
    for row in y as usize..(y + h) as usize {
        let start = row * full_stride + x_off;
        out.extend_from_slice(&full.buffer()[start..start + w as usize * 4]);
    }
    ImageData::new(out, w, h, PixelFormat::Bgra8)
}
