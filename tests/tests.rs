//! End-to-end tests driving the public API the way an embedding
//! application would: build frames, hand them to a [`jif::GifAssembler`],
//! then decode the resulting GIF back with the `gif`/`gif-dispose` crates
//! to check what actually landed on disk. Mirrors the teacher's own
//! `tests/tests.rs`, which decoded its `Writer`'s output the same way,
//! generalized from imagequant-remapped frames to this crate's own
//! median-cut palette and index buffers.

use gif_dispose::Screen;
use jif::{GifAssembler, GifConfig};
use rgb::RGBA8;
use tempfile::tempdir;

fn solid_bgra(color: [u8; 4], w: u32, h: u32) -> Vec<u8> {
    color.iter().copied().cycle().take(w as usize * h as usize * 4).collect()
}

fn decode_frames(path: &std::path::Path) -> Vec<(Vec<RGBA8>, u16)> {
    let file = std::fs::File::open(path).unwrap();
    let mut opts = gif::DecodeOptions::new();
    opts.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = opts.read_info(file).unwrap();
    let mut screen = Screen::new_decoder(&decoder);

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        screen.blit_frame(frame).unwrap();
        frames.push((screen.pixels.as_ref().pixels().collect(), frame.delay));
    }
    frames
}

#[test]
fn solid_color_frame_round_trips_within_5bit_cell_tolerance() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("solid.gif");
    let mut gif = GifAssembler::new(GifConfig::new(4, 4, &path));
    gif.init().unwrap();
    gif.add_frame(&solid_bgra([30, 60, 90, 255], 4, 4), 100.0).unwrap();
    gif.close().unwrap();

    let frames = decode_frames(&path);
    assert_eq!(frames.len(), 1);
    let (pixels, _) = &frames[0];
    for p in pixels {
        // BGRA -> RGB on the way in; 5-bit quantization cells are 8 wide,
        // so the stored value can be off by up to 4 from true nearest.
        assert!((p.r as i32 - 90).abs() <= 4, "r={}", p.r);
        assert!((p.g as i32 - 60).abs() <= 4, "g={}", p.g);
        assert!((p.b as i32 - 30).abs() <= 4, "b={}", p.b);
    }
}

#[test]
fn multi_frame_local_palette_session_preserves_frame_count_and_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("local.gif");
    let mut gif = GifAssembler::new(GifConfig::new(4, 4, &path));
    gif.init().unwrap();

    let colors = [[10, 10, 10, 255], [80, 80, 80, 255], [200, 200, 200, 255], [250, 250, 250, 255]];
    for (i, c) in colors.iter().enumerate() {
        gif.add_frame(&solid_bgra(*c, 4, 4), 10.0 * (i as f64 + 1.0)).unwrap();
    }
    gif.close().unwrap();

    let frames = decode_frames(&path);
    assert_eq!(frames.len(), colors.len());
    // Brightness should increase monotonically, frame over frame.
    let brightness: Vec<u16> = frames.iter().map(|(px, _)| px[0].r as u16 + px[0].g as u16 + px[0].b as u16).collect();
    assert!(brightness.windows(2).all(|w| w[1] >= w[0]));
}

#[test]
fn global_palette_session_yields_one_palette_for_all_frames() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("global.gif");
    let mut config = GifConfig::new(4, 4, &path);
    config.use_local_palette = false;
    config.palette_size = 256;
    let mut gif = GifAssembler::new(config);
    gif.init().unwrap();

    // A gradient over 10 frames, matching spec.md scenario 5.
    for i in 0..10u8 {
        let shade = i * 25;
        gif.add_frame(&solid_bgra([shade, shade, shade, 255], 4, 4), 16.0).unwrap();
    }
    gif.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[0..6], b"GIF89a");

    let file = std::fs::File::open(&path).unwrap();
    let mut opts = gif::DecodeOptions::new();
    opts.set_color_output(gif::ColorOutput::Indexed);
    let decoder = opts.read_info(file).unwrap();
    // A single global palette means no per-frame local palette is present.
    assert!(decoder.global_palette().is_some());
}

#[test]
fn close_is_idempotent_and_does_not_corrupt_the_stream() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("idempotent.gif");
    let mut gif = GifAssembler::new(GifConfig::new(2, 2, &path));
    gif.init().unwrap();
    gif.add_frame(&solid_bgra([1, 2, 3, 255], 2, 2), 16.0).unwrap();
    gif.close().unwrap();
    gif.close().unwrap();

    let frames = decode_frames(&path);
    assert_eq!(frames.len(), 1);
}
