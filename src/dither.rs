//! Floyd–Steinberg Ditherer (spec.md §4.5).
//!
//! Works on a private BGRA copy so the caller's buffer is never mutated,
//! and walks strictly row-major so a pixel is always quantized after every
//! contribution to it has landed (spec.md §4.5 ordering guarantee — this
//! rules out parallelizing across rows).

use crate::error::{CatResult, Error};
use crate::quantize::ColorLookup;

/// Floyd–Steinberg weights, denominator 16 (spec.md GLOSSARY).
const WEIGHTS: [(i32, i32, u8); 4] = [
    (1, 0, 7),  // right
    (-1, 1, 3), // down-left
    (0, 1, 5),  // down
    (1, 1, 1),  // down-right
];

/// Dithers a tightly packed BGRA frame against `lookup`'s palette, returning
/// a `width * height` index buffer. Every output byte is `< lookup.palette.len()`.
pub fn floyd_steinberg(bgra: &[u8], width: u32, height: u32, lookup: &ColorLookup) -> CatResult<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let expected = w * h * 4;
    if bgra.len() != expected {
        return Err(Error::QuantizerInvalidInput(format!(
            "expected {expected} BGRA bytes for {width}x{height}, got {}",
            bgra.len()
        )));
    }

    // Working copy: one [r, g, b] per pixel, row-major. Channels always
    // stay in 0..=255 because every write is clamped before storing.
    let mut working = vec![[0u8; 3]; w * h];
    for (px, out) in bgra.chunks_exact(4).zip(working.iter_mut()) {
        *out = [px[2], px[1], px[0]]; // BGRA -> RGB
    }

    let mut indices = vec![0u8; w * h];

    for y in 0..h {
        for x in 0..w {
            let at = y * w + x;
            let [r, g, b] = working[at];
            let index = lookup.index_of(r, g, b);
            indices[at] = index;

            let palette = lookup.palette_color(index);
            let error = [r as i32 - palette[0] as i32, g as i32 - palette[1] as i32, b as i32 - palette[2] as i32];

            for &(dx, dy, weight) in &WEIGHTS {
                let nx = x as i64 + dx as i64;
                let ny = y as i64 + dy as i64;
                if nx < 0 || ny < 0 || nx as usize >= w || ny as usize >= h {
                    continue; // out-of-bounds neighbors are skipped without redistribution
                }
                let nat = ny as usize * w + nx as usize;
                for c in 0..3 {
                    let contribution = error[c] * weight as i32 / 16;
                    let v = working[nat][c] as i32 + contribution;
                    working[nat][c] = v.clamp(0, 255) as u8;
                }
            }
        }
    }

    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgra(pixels: &[[u8; 3]]) -> Vec<u8> {
        pixels.iter().flat_map(|p| [p[2], p[1], p[0], 255]).collect()
    }

    #[test]
    fn spec_example_snaps_and_propagates_error() {
        let image = bgra(&[[60, 60, 60], [60, 60, 60], [0, 0, 0], [0, 0, 0]]);
        let lookup = ColorLookup::from_palette(vec![[0, 0, 0], [100, 100, 100]]);
        let indices = floyd_steinberg(&image, 2, 2, &lookup).unwrap();
        assert_eq!(indices, vec![1, 0, 0, 0]);
    }

    #[test]
    fn zero_error_image_is_identity_with_nearest_indexing() {
        let image = bgra(&[[0, 0, 0], [100, 100, 100], [100, 100, 100], [0, 0, 0]]);
        let lookup = ColorLookup::from_palette(vec![[0, 0, 0], [100, 100, 100]]);
        let indices = floyd_steinberg(&image, 2, 2, &lookup).unwrap();
        assert_eq!(indices, vec![0, 1, 1, 0]);
    }

    #[test]
    fn preserves_buffer_length_and_valid_indices() {
        let image = bgra(&[[1, 2, 3], [4, 5, 6], [7, 8, 9], [10, 11, 12]]);
        let lookup = ColorLookup::from_palette(vec![[0, 0, 0], [255, 255, 255]]);
        let indices = floyd_steinberg(&image, 2, 2, &lookup).unwrap();
        assert_eq!(indices.len(), 4);
        assert!(indices.iter().all(|&i| (i as usize) < lookup.palette.len()));
    }
}
