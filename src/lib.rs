//! `jif`: cross-platform screen-region capture to animated GIF.
//!
//! A user declares a rectangular screen region, starts a live capture, and
//! receives a stream of BGRA pixel frames with per-frame durations; this
//! crate encodes that stream into a GIF89a with user-controlled color
//! reduction (median-cut) and dithering (Floyd–Steinberg).
//!
//! The core of this crate is the image pipeline — [`quantize`] and
//! [`dither`] — plus the producer/consumer streaming architecture that
//! decouples a platform capture callback from the encoder
//! ([`tap`], [`queue`], [`orchestrator`]). Platform capture backends, the
//! GIF byte-stream writer, and CLI argument parsing are consumed through
//! narrow interfaces rather than reimplemented here.

#[macro_use]
extern crate quick_error;

pub mod capture;
pub mod dither;
mod error;
pub mod gifenc;
pub mod image;
pub mod orchestrator;
pub mod progress;
pub mod quantize;
pub mod queue;
pub mod rect;
pub mod tap;

pub use crate::capture::{Backend, PlatformCapturer, StopToken};
pub use crate::error::{CatResult, Error};
pub use crate::gifenc::{GifAssembler, GifConfig};
pub use crate::image::{Frame, ImageData, PixelFormat};
pub use crate::orchestrator::Pipeline;
pub use crate::quantize::{quantize, quantize_combined, ColorLookup, QuantizeResult};
pub use crate::queue::FrameQueue;
pub use crate::rect::Rect;
pub use crate::tap::FrameTap;
