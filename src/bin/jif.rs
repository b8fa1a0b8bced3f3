//! `jif` CLI (spec.md §6): `jif [-r WxH] [-d SECONDS] [-o PATH] [-c XxY]`.
//!
//! Argument parsing uses `clap`'s derive API (the teacher's own CLI binary
//! uses the builder API; both are equally idiomatic clap 4, and derive
//! suits `jif`'s small flat flag set better than the teacher's much larger
//! video-decoding flag surface).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use jif::progress::NoProgress;
use jif::{GifConfig, Pipeline, Rect};

#[derive(Parser, Debug)]
#[command(name = "jif")]
#[command(about = "Capture a screen region to an animated GIF")]
struct Args {
    /// Region size to capture, WxH in pixels (required)
    #[arg(short = 'r', long = "resolution")]
    resolution: Option<String>,

    /// Capture duration in seconds (required)
    #[arg(short = 'd', long = "duration")]
    duration: Option<String>,

    /// Output GIF path
    #[arg(short = 'o', long = "output", default_value = "out.gif")]
    output: PathBuf,

    /// Top-left coordinate of the capture region, XxY in pixels
    #[arg(short = 'c', long = "coords", default_value = "0x0")]
    coords: String,

    /// Increase log verbosity; repeat for more (-vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable Floyd-Steinberg dithering
    #[arg(long = "no-dither")]
    no_dither: bool,

    /// Use a single global palette instead of a per-frame local palette
    #[arg(long = "global-palette")]
    global_palette: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let Some((width, height)) = args.resolution.as_deref().and_then(parse_dims) else {
        eprintln!("error: missing or invalid -r WxH resolution");
        return ExitCode::from(1);
    };

    let Some(duration_secs) = args.duration.as_deref().and_then(|s| s.parse::<f64>().ok()).filter(|d| *d > 0.0) else {
        eprintln!("error: missing or invalid -d SECONDS duration");
        return ExitCode::from(2);
    };

    let Some((x, y)) = parse_dims(&args.coords) else {
        eprintln!("error: invalid -c XxY coordinate");
        return ExitCode::from(3);
    };

    let rect = match Rect::new(x as f64, y as f64, width as f64, height as f64) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(3);
        }
    };

    let capturer = match build_capturer() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(4);
        }
    };

    let mut gif_config = GifConfig::new(width, height, &args.output);
    gif_config.use_dithering = !args.no_dither;
    gif_config.use_local_palette = !args.global_palette;

    let mut progress = NoProgress;
    match Pipeline::run(capturer, Some(rect), gif_config, Duration::from_secs_f64(duration_secs), &mut progress) {
        Ok(()) => {
            let shown = dunce::canonicalize(&args.output).unwrap_or(args.output);
            eprintln!("wrote {}", shown.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(4)
        }
    }
}

/// Parses a `WxH`-shaped flag value into `(w, h)`. Rejects anything
/// non-numeric, zero, or missing the separator.
fn parse_dims(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once('x').or_else(|| s.split_once('X'))?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

#[cfg(feature = "capture")]
fn build_capturer() -> jif::CatResult<Box<dyn jif::PlatformCapturer>> {
    Ok(Box::new(jif::capture::ScrapCapturer::primary()?))
}

#[cfg(not(feature = "capture"))]
fn build_capturer() -> jif::CatResult<Box<dyn jif::PlatformCapturer>> {
    Err(jif::Error::PlatformUnsupported("built without the `capture` feature".into()))
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default_level = match verbose {
        0 => "jif=warn",
        1 => "jif=info",
        _ => "jif=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_dims() {
        assert_eq!(parse_dims("640x480"), Some((640, 480)));
        assert_eq!(parse_dims("10X20"), Some((10, 20)));
    }

    #[test]
    fn rejects_malformed_dims() {
        assert_eq!(parse_dims("640"), None);
        assert_eq!(parse_dims("0x10"), None);
        assert_eq!(parse_dims("abcxdef"), None);
    }
}
