//! Platform Capturer (spec.md §4.1): one capability interface, one concrete
//! implementation per platform behind a tagged variant — no deep class
//! hierarchy (spec.md §9 design notes).
//!
//! `jif` does not speak to ScreenCaptureKit, GDI/DXGI or the Wayland
//! capture portals directly: those are explicitly out of scope (spec.md §1).
//! [`ScrapCapturer`] delegates to the `scrap` crate, which already unifies
//! macOS/Windows/Linux-X11 capture behind one API — the same crate the `cap`
//! example in the retrieval pack uses for the same purpose.

#[cfg(feature = "capture")]
mod scrap_backend;
#[cfg(feature = "capture")]
pub use scrap_backend::ScrapCapturer;

mod synthetic;
#[cfg(any(test, feature = "test-util"))]
pub use synthetic::{SyntheticCapturer, SyntheticFrame};
#[cfg(not(any(test, feature = "test-util")))]
pub(crate) use synthetic::{SyntheticCapturer, SyntheticFrame};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::CatResult;
use crate::rect::Rect;

/// A cheap, cloneable handle that requests a capturer stop from any thread,
/// independent of the `&mut self` borrow `begin()` holds for its duration
/// (spec.md §5: "`end()` ... may be called from any thread").
///
/// Every [`PlatformCapturer`] backend stores the flag this wraps behind its
/// own `Arc<AtomicBool>`; `stop_token()` just clones that same `Arc` out
/// before `begin()` takes ownership of the capturer on the producer thread.
#[derive(Clone)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub(crate) fn new(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Which platform-specific capture path is in effect. A tagged variant
/// rather than a class hierarchy (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MacOs,
    Windows,
    Linux,
}

impl Backend {
    /// Resolves the backend for the platform this binary was built for.
    pub const fn current() -> Self {
        #[cfg(target_os = "macos")]
        {
            Self::MacOs
        }
        #[cfg(target_os = "windows")]
        {
            Self::Windows
        }
        #[cfg(all(not(target_os = "macos"), not(target_os = "windows")))]
        {
            Self::Linux
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MacOs => "macOS",
            Self::Windows => "Windows",
            Self::Linux => "Linux",
        })
    }
}

/// One raw sample as delivered by the backend: already cropped to a tightly
/// packed BGRA buffer for the configured region (spec.md §4.1 — the
/// capturer, not the handler, is responsible for the stride crop).
pub struct RawSample<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

pub type RawFrameHandler = Box<dyn FnMut(RawSample<'_>) + Send>;

/// Polymorphic capability exposed by every platform backend (spec.md §4.1).
pub trait PlatformCapturer: Send {
    /// Synchronous one-shot screenshot. `rect = None` means the full primary display.
    fn screenshot(&mut self, rect: Option<Rect>) -> CatResult<crate::image::ImageData>;

    /// Starts continuous capture. Blocks the calling thread until [`Self::end`]
    /// is called or a fatal backend error occurs.
    fn begin(&mut self) -> CatResult<()>;

    /// Requests graceful shutdown. Idempotent, callable from any thread.
    fn end(&mut self) -> CatResult<()>;

    fn set_region(&mut self, rect: Rect);

    fn set_frame_handler(&mut self, handler: RawFrameHandler);

    fn backend(&self) -> Backend;

    /// A handle that can request shutdown concurrently with a `begin()`
    /// call in progress on another thread. See [`StopToken`].
    fn stop_token(&self) -> StopToken;
}
