//! GIF Assembler (spec.md §4.6): drives the quantizer and ditherer per
//! frame, converts durations to GIF centiseconds, and emits frames through
//! the `gif`/`gif-dispose` writer primitives with transparency-by-difference
//! and minimal difference-window trimming. Adapted from the teacher's
//! `remap_frames`/`trim_image` in `lib.rs`, generalized from imagequant's
//! palette to this crate's own median-cut quantizer and dropping the
//! multi-stage thread pipeline (one caller thread drives this directly).

use std::fs::File;
use std::path::PathBuf;

use gif::{DisposalMethod, ExtensionData};
use imgref::Img;
use rgb::RGBA8;

use crate::dither::floyd_steinberg;
use crate::error::{CatResult, Error};
use crate::quantize::{self, ColorLookup};

/// Immutable once constructed (spec.md §3: `GifConfig`).
#[derive(Debug, Clone)]
pub struct GifConfig {
    pub width: u32,
    pub height: u32,
    pub path: PathBuf,
    pub use_dithering: bool,
    pub use_local_palette: bool,
    /// Target palette size, a power of two in `2..=256` (spec.md §4.4).
    pub palette_size: u16,
}

impl GifConfig {
    pub fn new(width: u32, height: u32, path: impl Into<PathBuf>) -> Self {
        Self { width, height, path: path.into(), use_dithering: true, use_local_palette: true, palette_size: 256 }
    }
}

#[derive(PartialEq, Eq, Debug)]
enum State {
    Idle,
    Open,
    Closed,
}

/// A frame after quantization, held back one step so the assembler can tell
/// whether it may be trimmed once the next frame (or `close()`) arrives;
/// the first and last frames in a stream are always kept full-size
/// (spec.md §4.6, mirroring the teacher's "must keep first and last frame").
struct Staged {
    indices: Vec<u8>,
    palette: Vec<[u8; 3]>,
    centiseconds: u16,
}

/// Drives quantization, dithering and GIF emission for one encoding session
/// (spec.md §4.6 state machine: `Idle -> Open -> Closed`).
pub struct GifAssembler {
    config: GifConfig,
    state: State,
    writer: Option<gif::Encoder<File>>,
    screen: Option<gif_dispose::Screen>,
    buffered: Vec<(Vec<u8>, f64)>,
    staged: Option<Staged>,
    emitted_any: bool,
}

impl GifAssembler {
    pub fn new(config: GifConfig) -> Self {
        Self { config, state: State::Idle, writer: None, screen: None, buffered: Vec::new(), staged: None, emitted_any: false }
    }

    pub fn init(&mut self) -> CatResult<()> {
        if self.state != State::Idle {
            return Err(Error::GifUninitialized);
        }
        self.state = State::Open;
        Ok(())
    }

    /// Quantizes (and optionally dithers) one BGRA frame and queues it for
    /// emission. In global-palette mode the frame is only buffered here;
    /// quantization against the combined palette happens at `close()`
    /// (spec.md §4.6: "deferred global-palette construction").
    pub fn add_frame(&mut self, bgra: &[u8], duration_ms: f64) -> CatResult<()> {
        if self.state != State::Open {
            return Err(Error::GifUninitialized);
        }
        if !self.config.use_local_palette {
            self.buffered.push((bgra.to_vec(), duration_ms));
            return Ok(());
        }
        self.ensure_writer(None)?;
        let staged = self.quantize_one(bgra, duration_ms, None)?;
        self.stage_and_emit(staged)
    }

    /// Finalizes the GIF stream. Idempotent: returns `Ok(())` on every call
    /// after the first (spec.md §4.6).
    pub fn close(&mut self) -> CatResult<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        let result = self.close_inner();
        self.state = State::Closed;
        self.writer = None; // drops the encoder, flushing the trailer and closing the file
        result
    }

    fn close_inner(&mut self) -> CatResult<()> {
        if !self.config.use_local_palette {
            self.drain_global_buffer()?;
        }
        if let Some(last) = self.staged.take() {
            self.emit(last, true)?;
        }
        Ok(())
    }

    fn drain_global_buffer(&mut self) -> CatResult<()> {
        if self.buffered.is_empty() {
            return Ok(());
        }
        let refs: Vec<&[u8]> = self.buffered.iter().map(|(bgra, _)| bgra.as_slice()).collect();
        let palette = quantize::quantize_combined(&refs, self.config.width, self.config.height, self.config.palette_size)?;
        self.ensure_writer(Some(&palette))?;

        let buffered = std::mem::take(&mut self.buffered);
        for (bgra, duration_ms) in buffered {
            let staged = self.quantize_one(&bgra, duration_ms, Some(&palette))?;
            self.stage_and_emit(staged)?;
        }
        Ok(())
    }

    fn stage_and_emit(&mut self, staged: Staged) -> CatResult<()> {
        if let Some(prev) = self.staged.take() {
            self.emit(prev, false)?;
        }
        self.staged = Some(staged);
        Ok(())
    }

    fn quantize_one(&self, bgra: &[u8], duration_ms: f64, forced_palette: Option<&[[u8; 3]]>) -> CatResult<Staged> {
        let (width, height) = (self.config.width, self.config.height);
        let lookup = match forced_palette {
            Some(palette) => ColorLookup::from_palette(palette.to_vec()),
            None => ColorLookup::build(bgra, width, height, self.config.palette_size)?,
        };
        let indices = if self.config.use_dithering {
            floyd_steinberg(bgra, width, height, &lookup)?
        } else {
            bgra.chunks_exact(4).map(|px| lookup.index_of(px[2], px[1], px[0])).collect()
        };
        Ok(Staged { indices, palette: lookup.palette.clone(), centiseconds: centiseconds_from_ms(duration_ms) })
    }

    /// Opens the output file and writes the GIF header exactly once. The
    /// global color table, if any, must be known up front (spec.md §6:
    /// "a single global palette with `NO_GLOBAL_TABLE` cleared"), which is
    /// why global-palette mode defers this until the combined palette has
    /// been computed.
    fn ensure_writer(&mut self, global_palette: Option<&[[u8; 3]]>) -> CatResult<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        let file = File::create(&self.config.path).map_err(|e| Error::GifOpenFailed(e.to_string()))?;
        let global_bytes: Vec<u8> = global_palette.map(palette_to_bytes).unwrap_or_default();
        let mut encoder = gif::Encoder::new(file, self.config.width as u16, self.config.height as u16, &global_bytes)
            .map_err(|e| Error::GifOpenFailed(e.to_string()))?;
        encoder.write_extension(ExtensionData::Repetitions(gif::Repeat::Infinite))?;
        self.writer = Some(encoder);
        self.screen =
            Some(gif_dispose::Screen::new(self.config.width as usize, self.config.height as usize, RGBA8::new(0, 0, 0, 0), None));
        Ok(())
    }

    fn emit(&mut self, staged: Staged, is_last: bool) -> CatResult<()> {
        let Staged { mut indices, palette, centiseconds } = staged;
        let (width, height) = (self.config.width as usize, self.config.height as usize);
        let is_first = !self.emitted_any;
        let pal_rgba: Vec<RGBA8> = palette.iter().map(|c| RGBA8::new(c[0], c[1], c[2], 255)).collect();

        let screen = self.screen.as_mut().ok_or(Error::GifUninitialized)?;
        let mut screen_after_dispose = screen.dispose();

        let transparent_index = if is_first {
            None
        } else {
            let background: Vec<RGBA8> =
                screen_after_dispose.pixels().rows().flat_map(|row| row.iter().copied()).collect();
            find_transparent_index(&mut indices, &pal_rgba, &background)
        };

        let (left, top, trimmed_width, trimmed_height, trimmed_indices) = if is_first || is_last {
            (0u16, 0u16, width, height, indices)
        } else {
            match bounding_box(&indices, width, height, transparent_index) {
                Some((x, y, w, h)) => (x as u16, y as u16, w, h, crop_indices(&indices, width, x, y, w, h)),
                None => (0u16, 0u16, 1, 1, vec![transparent_index.unwrap_or(0)]),
            }
        };

        let image_for_blit = Img::new(trimmed_indices.clone(), trimmed_width, trimmed_height);
        screen_after_dispose.then_blit(
            Some(&pal_rgba),
            DisposalMethod::Keep,
            left,
            top,
            image_for_blit.as_ref(),
            transparent_index,
        )?;

        let frame = gif::Frame {
            delay: centiseconds,
            dispose: DisposalMethod::Keep,
            transparent: transparent_index,
            needs_user_input: false,
            top,
            left,
            width: trimmed_width as u16,
            height: trimmed_height as u16,
            interlaced: false,
            palette: if self.config.use_local_palette { Some(palette_to_bytes(&palette)) } else { None },
            buffer: trimmed_indices.into(),
        };

        self.writer.as_mut().ok_or(Error::GifUninitialized)?.write_frame(&frame)?;
        self.emitted_any = true;
        Ok(())
    }
}

fn palette_to_bytes(palette: &[[u8; 3]]) -> Vec<u8> {
    palette.iter().flat_map(|c| c.iter().copied()).collect()
}

/// Marks indices that are always background-colored wherever they occur as
/// transparent, remapping any runner-up background-matching index into the
/// first one chosen (spec.md §4.6: "transparency-by-difference"; the
/// dedup mirrors the teacher's "palette may have multiple transparent
/// indices" handling in `remap_frames`).
fn find_transparent_index(indices: &mut [u8], palette: &[RGBA8], background: &[RGBA8]) -> Option<u8> {
    let mut total = vec![0u32; palette.len()];
    let mut matches = vec![0u32; palette.len()];
    for (&idx, &bg) in indices.iter().zip(background.iter()) {
        total[idx as usize] += 1;
        if palette[idx as usize] == bg {
            matches[idx as usize] += 1;
        }
    }

    let mut transparent_index = None;
    for idx in 0..palette.len() {
        if total[idx] == 0 || total[idx] != matches[idx] {
            continue;
        }
        match transparent_index {
            None => transparent_index = Some(idx as u8),
            Some(kept) => {
                for v in indices.iter_mut() {
                    if *v as usize == idx {
                        *v = kept;
                    }
                }
            }
        }
    }
    transparent_index
}

/// Smallest rectangle containing every pixel that isn't `transparent_index`.
/// `None` if the whole frame is transparent.
fn bounding_box(indices: &[u8], width: usize, height: usize, transparent_index: Option<u8>) -> Option<(usize, usize, usize, usize)> {
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (width, 0usize, height, 0usize);
    let mut any = false;
    for y in 0..height {
        for x in 0..width {
            if Some(indices[y * width + x]) == transparent_index {
                continue;
            }
            any = true;
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    any.then(|| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

fn crop_indices(indices: &[u8], width: usize, x: usize, y: usize, w: usize, h: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(w * h);
    for row in y..y + h {
        let start = row * width + x;
        out.extend_from_slice(&indices[start..start + w]);
    }
    out
}

/// Milliseconds to GIF centiseconds, round-half-to-even (spec.md §9 Open
/// Question c).
fn centiseconds_from_ms(duration_ms: f64) -> u16 {
    let cs = duration_ms.max(0.0) / 10.0;
    let floor = cs.floor();
    let diff = cs - floor;
    let rounded = if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    };
    rounded.clamp(0.0, u16::MAX as f64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn solid_bgra(color: [u8; 4], w: u32, h: u32) -> Vec<u8> {
        color.iter().copied().cycle().take(w as usize * h as usize * 4).collect()
    }

    #[test]
    fn rejects_use_before_init() {
        let dir = tempdir().unwrap();
        let mut gif = GifAssembler::new(GifConfig::new(2, 2, dir.path().join("out.gif")));
        assert!(gif.add_frame(&solid_bgra([0, 0, 0, 255], 2, 2), 16.0).is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut gif = GifAssembler::new(GifConfig::new(2, 2, dir.path().join("out.gif")));
        gif.init().unwrap();
        gif.add_frame(&solid_bgra([10, 20, 30, 255], 2, 2), 16.0).unwrap();
        gif.close().unwrap();
        gif.close().unwrap(); // second call is a no-op, returns Ok
        assert!(dir.path().join("out.gif").exists());
    }

    #[test]
    fn local_palette_mode_writes_a_frame_per_call() {
        let dir = tempdir().unwrap();
        let mut config = GifConfig::new(4, 4, dir.path().join("out.gif"));
        config.use_local_palette = true;
        let mut gif = GifAssembler::new(config);
        gif.init().unwrap();
        for c in [[0, 0, 0, 255], [50, 50, 50, 255], [100, 100, 100, 255]] {
            gif.add_frame(&solid_bgra(c, 4, 4), 16.0).unwrap();
        }
        gif.close().unwrap();
        let bytes = std::fs::read(dir.path().join("out.gif")).unwrap();
        assert_eq!(&bytes[0..6], b"GIF89a");
    }

    #[test]
    fn global_palette_mode_defers_until_close() {
        let dir = tempdir().unwrap();
        let mut config = GifConfig::new(4, 4, dir.path().join("out.gif"));
        config.use_local_palette = false;
        config.palette_size = 2;
        let mut gif = GifAssembler::new(config);
        gif.init().unwrap();
        gif.add_frame(&solid_bgra([0, 0, 0, 255], 4, 4), 16.0).unwrap();
        assert!(!dir.path().join("out.gif").exists()); // nothing written yet, still buffering
        gif.add_frame(&solid_bgra([255, 255, 255, 255], 4, 4), 16.0).unwrap();
        gif.close().unwrap();
        assert!(dir.path().join("out.gif").exists());
    }

    #[test]
    fn centisecond_rounding_is_half_to_even() {
        assert_eq!(centiseconds_from_ms(25.0), 2); // 2.5 -> even (2)
        assert_eq!(centiseconds_from_ms(35.0), 4); // 3.5 -> even (4)
        assert_eq!(centiseconds_from_ms(16.0), 2); // 1.6 -> rounds up
        assert_eq!(centiseconds_from_ms(-5.0), 0); // clamped at zero
    }

    #[test]
    fn bounding_box_is_none_for_all_transparent() {
        let indices = vec![0u8; 9];
        assert!(bounding_box(&indices, 3, 3, Some(0)).is_none());
    }

    #[test]
    fn bounding_box_finds_minimal_window() {
        // 3x3, only the center pixel is non-transparent.
        let mut indices = vec![0u8; 9];
        indices[4] = 1;
        assert_eq!(bounding_box(&indices, 3, 3, Some(0)), Some((1, 1, 1, 1)));
    }
}
