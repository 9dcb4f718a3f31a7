//! Loop preparation demonstration
//!
//! Decodes a range of an audio file, loops it and writes the stream that a
//! playback engine would pull to a WAV file.
//!
//! Run with:
//! ```bash
//! # Loop 12.0s..16.0s of a track eight times
//! cargo run --example loop_demo -- tune.mp3 12000 16000 8
//!
//! # Let the practice policy choose the loop count, write to a custom path
//! cargo run --example loop_demo -- tune.flac 3000 5500 practice /tmp/phrase.wav
//!
//! # Materialize the loop instead of serving it virtually
//! LOOP_DELIVERY=materialized cargo run --example loop_demo -- tune.mp3 0 2000 3
//! ```

use anyhow::{bail, Context, Result};
use core_loop::{
    ByteStream, ClipLooper, ClipRequest, DeliveryPreference, LoopConfig, LoopSession, ReadOutcome,
};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

fn main() -> Result<()> {
    let level = env::var("LOOP_LOG")
        .ok()
        .map(|value| value.parse::<LogLevel>())
        .transpose()?
        .unwrap_or(LogLevel::Info);
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(level),
    )?;

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 3 {
        bail!("usage: loop_demo <file> <start_ms> <end_ms> [loops|practice] [out.wav]");
    }

    let source = PathBuf::from(&args[0]);
    let start_ms: u64 = args[1].parse().context("start_ms must be an integer")?;
    let end_ms: u64 = args[2].parse().context("end_ms must be an integer")?;
    let out_path = args
        .get(4)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("loop.wav"));

    let mut config = LoopConfig::default();
    if env::var("LOOP_DELIVERY").as_deref() == Ok("materialized") {
        config.delivery = DeliveryPreference::Materialized;
    }
    let looper = ClipLooper::new(config)?;

    let request = match args.get(3).map(String::as_str) {
        None | Some("practice") => {
            ClipRequest::for_practice(&source, start_ms, end_ms, &looper.config().repeat)
        }
        Some(loops) => {
            let loops = loops.parse().context("loops must be a positive integer")?;
            ClipRequest::new(&source, start_ms, end_ms, loops)
        }
    };

    let session = LoopSession::new(looper);
    let started = Instant::now();
    let prepared = session.prepare(&request)?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        sample_rate = prepared.format.sample_rate,
        channels = prepared.format.channels,
        loop_count = prepared.plan.loop_count,
        strategy = ?prepared.plan.strategy,
        start_offset_us = prepared.report.start_offset_us,
        fade_frames = prepared.fade.fade_frames,
        "Clip prepared"
    );

    let mut stream = prepared.open_stream();
    let total = stream.open(0)?;
    let mut out = BufWriter::new(
        File::create(&out_path).with_context(|| format!("creating {}", out_path.display()))?,
    );
    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0u64;
    while let ReadOutcome::Data(n) = stream.read(&mut buf)? {
        out.write_all(&buf[..n])?;
        written += n as u64;
    }
    stream.close();
    out.flush()?;

    if written != total {
        bail!("stream declared {} bytes but delivered {}", total, written);
    }
    info!(
        bytes = written,
        loop_seconds = prepared.loop_duration().as_secs_f64(),
        total_seconds = prepared.duration().as_secs_f64(),
        out = %out_path.display(),
        "Loop written"
    );

    session.release();
    Ok(())
}
