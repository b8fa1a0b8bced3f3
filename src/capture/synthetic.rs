//! Deterministic in-process capturer used by the test suite (and, behind
//! `feature = "test-util"`, by downstream callers who want a capturer that
//! doesn't touch the display). Grounded on the same producer/frame-callback
//! shape as [`super::scrap_backend::ScrapCapturer`], but synthesizes frames
//! instead of polling a display.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{CatResult, Error};
use crate::rect::Rect;

use super::{Backend, PlatformCapturer, RawFrameHandler, RawSample};

/// A single synthetic frame: a solid color, a row stride (which may pad
/// past `width * 4` to exercise the cropping path), and how long `begin()`
/// should hold it before producing the next one.
#[derive(Clone, Copy)]
pub struct SyntheticFrame {
    pub bgra: [u8; 4],
    pub hold: Duration,
}

pub struct SyntheticCapturer {
    width: u32,
    height: u32,
    /// Extra bytes appended to each row before the next row starts, to
    /// exercise spec.md §8's "stride > width*4" boundary case.
    row_padding: usize,
    frames: Vec<SyntheticFrame>,
    handler: Option<RawFrameHandler>,
    stop: Arc<AtomicBool>,
}

impl SyntheticCapturer {
    pub fn new(width: u32, height: u32, frames: Vec<SyntheticFrame>) -> Self {
        Self { width, height, row_padding: 0, frames, handler: None, stop: Arc::new(AtomicBool::new(false)) }
    }

    pub fn with_row_padding(mut self, padding_bytes: usize) -> Self {
        self.row_padding = padding_bytes;
        self
    }

    fn padded_buffer(&self, color: [u8; 4]) -> (Vec<u8>, usize) {
        let row_bytes = self.width as usize * 4;
        let stride = row_bytes + self.row_padding;
        let mut buf = vec![0u8; stride * self.height as usize];
        for row in 0..self.height as usize {
            for col in 0..self.width as usize {
                let at = row * stride + col * 4;
                buf[at..at + 4].copy_from_slice(&color);
            }
        }
        (buf, stride)
    }
}

impl PlatformCapturer for SyntheticCapturer {
    fn screenshot(&mut self, _rect: Option<Rect>) -> CatResult<crate::image::ImageData> {
        let color = self.frames.first().map(|f| f.bgra).unwrap_or([0, 0, 0, 255]);
        let (buf, stride) = self.padded_buffer(color);
        crate::image::ImageData::crop_from_strided(&buf, stride, self.width, self.height, crate::image::PixelFormat::Bgra8)
    }

    fn begin(&mut self) -> CatResult<()> {
        let mut handler = self.handler.take().ok_or_else(|| Error::Internal("no frame handler set".into()))?;
        self.stop.store(false, Ordering::SeqCst);
        for frame in &self.frames {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let (buf, stride) = self.padded_buffer(frame.bgra);
            let cropped =
                crate::image::ImageData::crop_from_strided(&buf, stride, self.width, self.height, crate::image::PixelFormat::Bgra8)?;
            handler(RawSample { data: cropped.buffer(), width: self.width, height: self.height });
            thread::sleep(frame.hold);
        }
        self.handler = Some(handler);
        Ok(())
    }

    fn end(&mut self) -> CatResult<()> {
        self.stop.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_region(&mut self, rect: Rect) {
        if let Ok((_, _, w, h)) = rect.clamped_to_screen(self.width, self.height) {
            self.width = w;
            self.height = h;
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crops_padded_rows_before_invoking_handler() {
        let mut cap = SyntheticCapturer::new(2, 2, vec![SyntheticFrame { bgra: [9, 9, 9, 255], hold: Duration::ZERO }])
            .with_row_padding(16);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        cap.set_frame_handler(Box::new(move |sample| {
            seen2.lock().unwrap().push(sample.data.to_vec());
        }));
        cap.begin().unwrap();
        let frames = seen.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 2 * 2 * 4);
        assert!(frames[0].chunks_exact(4).all(|px| px == [9, 9, 9, 255]));
    }

    #[test]
    fn end_before_begin_is_idempotent_and_noop() {
        let mut cap = SyntheticCapturer::new(1, 1, vec![]);
        assert!(cap.end().is_ok());
        assert!(cap.end().is_ok());
    }
}
