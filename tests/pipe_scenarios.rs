//! End-to-end pipe scenarios against a real ffmpeg.
//!
//! Each test returns early when ffmpeg is not on PATH.

use assert_matches::assert_matches;
use bytes::Bytes;
use ffpipe_av::{
    Arguments, FfmpegCommand, Outcome, RawVideoFrame, RawVideoPipeSource, StreamPipeSink,
    StreamPipeSource,
};
use ffpipe_core::{Error, FfmpegConfig, VideoFormat};
use std::path::Path;
use tempfile::tempdir;

const WIDTH: u32 = 256;
const HEIGHT: u32 = 256;
const FRAMES: usize = 64;

fn ffmpeg_config(pipe_dir: &Path) -> Option<FfmpegConfig> {
    if which::which("ffmpeg").is_err() {
        eprintln!("ffmpeg not found on PATH, skipping");
        return None;
    }
    Some(FfmpegConfig {
        temporary_files_folder: Some(pipe_dir.to_path_buf()),
        log_level: Some("error".to_string()),
        cancel_grace_secs: 1,
        ..FfmpegConfig::default()
    })
}

fn frame(width: u32, height: u32, shade: u8) -> RawVideoFrame {
    let len = (width * height * 3) as usize;
    RawVideoFrame::new(
        VideoFormat::new(width, height, "rgb24"),
        Bytes::from(vec![shade; len]),
    )
}

fn socket_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).count())
        .unwrap_or(0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_raw_frames_to_gray_in_memory() {
    let dir = tempdir().unwrap();
    let Some(config) = ffmpeg_config(dir.path()) else {
        return;
    };

    let frames = (0..FRAMES).map(|i| frame(WIDTH, HEIGHT, (i * 3) as u8));
    let mut out = Vec::new();

    let mut args = Arguments::new();
    args.pipe_dir(dir.path());
    args.input_pipe(RawVideoPipeSource::new(frames).with_frame_rate(30.0))
        .unwrap();
    args.args(["-pix_fmt", "gray"]);
    args.output_pipe(StreamPipeSink::new(&mut out).with_format("rawvideo"));

    let outcome = FfmpegCommand::new(&config, args).run().await;

    assert!(outcome.is_success(), "unexpected outcome: {:?}", outcome);
    let gray_frame = (WIDTH * HEIGHT) as usize;
    assert!(!out.is_empty());
    assert_eq!(out.len() % gray_frame, 0);
    assert_eq!(socket_count(dir.path()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mismatched_frame_fails_run() {
    let dir = tempdir().unwrap();
    let Some(config) = ffmpeg_config(dir.path()) else {
        return;
    };

    let frames = (0..FRAMES).map(|i| {
        if i == 40 {
            frame(320, HEIGHT, 0)
        } else {
            frame(WIDTH, HEIGHT, 128)
        }
    });

    let mut args = Arguments::new();
    args.pipe_dir(dir.path());
    args.input_pipe(RawVideoPipeSource::new(frames).with_frame_rate(30.0))
        .unwrap();
    args.args(["-pix_fmt", "gray"]);
    args.output_pipe(StreamPipeSink::new(tokio::io::sink()).with_format("rawvideo"));

    let outcome = FfmpegCommand::new(&config, args).run().await;

    let failure = outcome.as_failure().expect("run should fail");
    assert_matches!(
        &failure.cause,
        Error::FormatMismatch { index: 40, expected, actual }
            if expected == "256x256 rgb24" && actual == "320x256 rgb24"
    );
    assert_eq!(socket_count(dir.path()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bad_option_fails_without_connecting() {
    let dir = tempdir().unwrap();
    let Some(config) = ffmpeg_config(dir.path()) else {
        return;
    };

    let mut args = Arguments::new();
    args.pipe_dir(dir.path());
    args.arg("-definitely-not-an-option");
    args.input_pipe(StreamPipeSource::new(&b"never read"[..]).with_format("matroska"))
        .unwrap();
    args.args(["-f", "null", "-"]);

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        FfmpegCommand::new(&config, args).run(),
    )
    .await
    .expect("run should not hang");

    let failure = outcome.as_failure().expect("run should fail");
    assert_ne!(failure.exit_code, Some(0));
    assert_eq!(socket_count(dir.path()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_before_start() {
    let dir = tempdir().unwrap();
    let Some(config) = ffmpeg_config(dir.path()) else {
        return;
    };

    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();

    let mut args = Arguments::new();
    args.pipe_dir(dir.path());
    args.input_pipe(RawVideoPipeSource::new((0..4).map(|_| frame(WIDTH, HEIGHT, 0))))
        .unwrap();
    args.args(["-f", "null", "-"]);

    let outcome = FfmpegCommand::new(&config, args)
        .cancellable(cancel)
        .run()
        .await;
    assert_matches!(outcome, Outcome::Cancelled);
}
