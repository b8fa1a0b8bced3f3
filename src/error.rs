//! Error taxonomy (spec.md §7).

use std::io;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        PlatformUnsupported(backend: String) {
            display("screen capture is not supported on this platform ({backend})")
        }
        CaptureInitFailed(msg: String) {
            display("capture could not be initialized: {msg}")
        }
        CaptureBackendFailed(msg: String) {
            display("capture backend failed: {msg}")
        }
        InvalidConfig(msg: String) {
            display("invalid configuration: {msg}")
        }
        QuantizerInvalidInput(msg: String) {
            display("invalid input to quantizer: {msg}")
        }
        GifOpenFailed(msg: String) {
            display("could not open GIF output: {msg}")
        }
        GifWriteFailed(msg: String) {
            display("could not write GIF frame: {msg}")
        }
        GifCloseFailed(msg: String) {
            display("could not finalize GIF output: {msg}")
        }
        GifAllocFailed(msg: String) {
            display("GIF encoder allocation failed: {msg}")
        }
        GifInvalidIndex {
            display("palette index out of range")
        }
        GifUninitialized {
            display("GIF assembler used before init()")
        }
        QueueEmpty {
            display("frame queue is empty")
        }
        Io(err: io::Error) {
            display("I/O error: {err}")
            from()
        }
        Internal(msg: String) {
            display("internal error: {msg}")
        }
    }
}

impl From<gif::EncodingError> for Error {
    fn from(err: gif::EncodingError) -> Self {
        Self::GifWriteFailed(err.to_string())
    }
}

impl From<gif_dispose::Error> for Error {
    fn from(err: gif_dispose::Error) -> Self {
        Self::GifWriteFailed(err.to_string())
    }
}

/// Result type used throughout the crate, named after the teacher crate's own alias.
pub type CatResult<T> = Result<T, Error>;
