//! Loop stream delivery tests
//!
//! Exercises the engine-facing pull protocol over both delivery strategies:
//! - total length reported by `open`
//! - byte-by-byte reproduction of the repeated clip
//! - reopen at an offset, as a seeking engine does
//! - independent streams over one shared resource

use bytes::Bytes;
use core_loop::wav;
use core_loop::{
    build_header, ByteStream, LoopError, LoopResource, LoopStrategy, LoopStreamSource,
    ReadOutcome, WavHeader, WAV_HEADER_LEN,
};
use std::io::Cursor;
use std::sync::Arc;
use std::thread;

fn canonical(frames: usize, channels: u16) -> Bytes {
    let samples: Vec<i16> = (0..frames * channels as usize)
        .map(|i| (i as i16).wrapping_mul(37))
        .collect();
    Bytes::from(
        samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect::<Vec<u8>>(),
    )
}

fn drain(stream: &mut LoopStreamSource, chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    while let ReadOutcome::Data(n) = stream.read(&mut buf).unwrap() {
        out.extend_from_slice(&buf[..n]);
    }
    out
}

fn repeated(pcm: &[u8], n: usize) -> Vec<u8> {
    pcm.repeat(n)
}

#[test]
fn test_virtual_stream_reports_n_times_l() {
    let pcm = canonical(100, 2);
    let mut stream = LoopStreamSource::new(LoopResource::virtual_loop(pcm.clone(), 7, None));

    assert_eq!(stream.open(0).unwrap(), 7 * pcm.len() as u64);
    assert_eq!(drain(&mut stream, 1), repeated(&pcm, 7));
    // Still exhausted on every further read
    assert_eq!(stream.read(&mut [0u8; 16]).unwrap(), ReadOutcome::EndOfStream);
    stream.close();
}

#[test]
fn test_reads_never_cross_a_loop_seam() {
    let pcm = canonical(10, 1);
    let mut stream = LoopStreamSource::new(LoopResource::virtual_loop(pcm.clone(), 3, None));
    stream.open(15).unwrap();

    let mut buf = vec![0u8; 64];
    assert_eq!(stream.read(&mut buf).unwrap(), ReadOutcome::Data(5));
    assert_eq!(&buf[..5], &pcm[15..]);
    assert_eq!(stream.read(&mut buf).unwrap(), ReadOutcome::Data(20));
    assert_eq!(&buf[..20], &pcm[..]);
}

#[test]
fn test_reopen_at_offset_resumes_mid_loop() {
    let pcm = canonical(50, 2);
    let single = pcm.len() as u64;
    let mut stream = LoopStreamSource::new(LoopResource::virtual_loop(pcm.clone(), 4, None));

    stream.open(0).unwrap();
    let _ = stream.read(&mut [0u8; 32]).unwrap();
    stream.close();
    assert!(matches!(stream.read(&mut [0u8; 4]), Err(LoopError::NotOpen)));

    let offset = 2 * single + 12;
    stream.open(offset).unwrap();
    assert_eq!(stream.position(), Some(offset));
    let tail = drain(&mut stream, 33);
    assert_eq!(tail, repeated(&pcm, 4)[offset as usize..]);
}

#[test]
fn test_open_past_end_reads_end_of_stream() {
    let pcm = canonical(8, 2);
    let mut stream = LoopStreamSource::new(LoopResource::virtual_loop(pcm.clone(), 2, None));
    let total = stream.open(1_000).unwrap();
    assert_eq!(total, 2 * pcm.len() as u64);
    assert_eq!(stream.read(&mut [0u8; 8]).unwrap(), ReadOutcome::EndOfStream);
}

#[test]
fn test_zero_length_resources_fail_to_open() {
    let mut empty = LoopStreamSource::new(LoopResource::virtual_loop(Bytes::new(), 5, None));
    assert!(matches!(empty.open(0), Err(LoopError::InvalidStream(_))));

    let mut no_loops =
        LoopStreamSource::new(LoopResource::virtual_loop(canonical(4, 1), 0, None));
    assert!(matches!(no_loops.open(0), Err(LoopError::InvalidStream(_))));
    assert!(!no_loops.is_open());
}

#[test]
fn test_virtual_and_materialized_deliver_identical_bytes() {
    let channels = 2;
    let pcm = canonical(441, channels);
    let loops = 5;
    let header =
        build_header(pcm.len() as u64, pcm.len() as u64 * loops as u64, 44_100, channels, 16)
            .unwrap();

    let mut virtual_stream =
        LoopStreamSource::new(LoopResource::virtual_loop(pcm.clone(), loops, Some(header)));
    let mut linear = LoopStreamSource::new(LoopResource::materialized(&pcm, loops, &header));
    assert_eq!(virtual_stream.resource().strategy(), LoopStrategy::Virtual);
    assert_eq!(linear.resource().strategy(), LoopStrategy::Materialized);

    let total_v = virtual_stream.open(0).unwrap();
    let total_m = linear.open(0).unwrap();
    assert_eq!(total_v, total_m);
    assert_eq!(total_v, WAV_HEADER_LEN as u64 + loops as u64 * pcm.len() as u64);

    let a = drain(&mut virtual_stream, 1000);
    let b = drain(&mut linear, 4096);
    assert_eq!(a, b);
    assert_eq!(a.len() as u64, total_v);
}

#[test]
fn test_streamed_file_parses_as_wav() {
    let channels = 2;
    let pcm = canonical(300, channels);
    let loops = 3;
    let header =
        build_header(pcm.len() as u64, pcm.len() as u64 * loops as u64, 22_050, channels, 16)
            .unwrap();

    let mut stream =
        LoopStreamSource::new(LoopResource::virtual_loop(pcm.clone(), loops, Some(header)));
    stream.open(0).unwrap();
    let file = drain(&mut stream, 777);

    let parsed = WavHeader::parse(&file).unwrap();
    assert_eq!(parsed.sample_rate, 22_050);
    assert_eq!(parsed.channels, channels);
    assert_eq!(parsed.data_size as usize, file.len() - WAV_HEADER_LEN);

    let reader = hound::WavReader::new(Cursor::new(file)).unwrap();
    assert_eq!(reader.spec().sample_rate, 22_050);
    assert_eq!(reader.spec().channels, channels);
    assert_eq!(reader.duration() as usize, 300 * loops as usize);
}

#[test]
fn test_container_ceiling() {
    let single = 1_000_000u64;
    let max = wav::max_loops_for_container(single);
    assert!(build_header(single, single * max as u64, 44_100, 2, 16).is_ok());

    let err = build_header(single, single * (max as u64 + 1), 44_100, 2, 16).unwrap_err();
    assert!(matches!(err, LoopError::ContainerOverflow { .. }));
}

#[test]
fn test_streams_share_one_resource_across_threads() {
    let pcm = canonical(1_000, 2);
    let resource = Arc::new(LoopResource::virtual_loop(pcm.clone(), 6, None));
    let expected = Arc::new(repeated(&pcm, 6));

    let handles: Vec<_> = [64usize, 500, 4096, 1]
        .into_iter()
        .map(|chunk| {
            let resource = Arc::clone(&resource);
            let expected = Arc::clone(&expected);
            thread::spawn(move || {
                let mut stream = LoopStreamSource::new((*resource).clone());
                stream.open(0).unwrap();
                assert_eq!(drain(&mut stream, chunk), *expected);
                stream.close();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
