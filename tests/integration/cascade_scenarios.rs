// Per-job target sequencing: cascade sources, fallback, skips and cancellation

use plexopt::engine::{
    AccelMode, CancelToken, CascadeResolver, EncodedWith, OPTIMIZED_720P, OPTIMIZED_1080P,
    RunOptions, TargetState, WorkerIdentity, output_path,
};
use plexopt::ui::StatusBoard;
use std::fs;
use std::sync::Arc;

use crate::common::fakes::{
    AUDIO_ONLY, FakeProber, FakeTranscoder, Script, StatusRecorder, media,
};
use crate::common::{Library, context, no_nvenc, nvenc, run_job, write_file};

const P1080: &str = OPTIMIZED_1080P.label;
const P720: &str = OPTIMIZED_720P.label;

#[test]
fn test_gpu_worker_encodes_both_and_cascades() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let transcoder = Arc::new(FakeTranscoder::new());
    let ctx = context(
        Arc::new(FakeProber::new()),
        transcoder.clone(),
        nvenc(),
        lib.options(),
    );

    let (report, board) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    let out1080 = output_path(&job.source_path, P1080);
    let out720 = output_path(&job.source_path, P720);
    assert_eq!(
        report.summary(),
        "Optimized-1080p: encoded(GPU) | Optimized-720p: encoded(GPU)"
    );
    assert_eq!(report.code(), 0);
    assert_eq!(report.outcome(P1080).unwrap().input, job.source_path);
    assert_eq!(report.outcome(P720).unwrap().input, out1080);

    let calls = transcoder.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].source, out1080);
    assert_eq!(calls[1].header, "[GPU#1] Optimized-720p [src=1080p]");
    assert!(calls.iter().all(|c| c.mode == AccelMode::Hardware));

    let written = fs::read_to_string(&out720).unwrap();
    assert!(written.contains("Optimized-1080p"));

    let pane = &board.snapshot()[0];
    assert_eq!(pane.lines[0], "[GPU#1] Optimized-720p [src=1080p]");
}

#[test]
fn test_hardware_failure_falls_back_to_software() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let transcoder = Arc::new(
        FakeTranscoder::new().script(P1080, AccelMode::Hardware, Script::Fail(1)),
    );
    let ctx = context(
        Arc::new(FakeProber::new()),
        transcoder.clone(),
        nvenc(),
        lib.options(),
    );

    let (report, _) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    let first = report.outcome(P1080).unwrap();
    assert_eq!(first.state, TargetState::Succeeded(EncodedWith::CpuFallback));
    assert_eq!(first.attempts, [AccelMode::Hardware, AccelMode::Software]);
    assert_eq!(first.status_line(), "Optimized-1080p: encoded(CPU-fallback)");
    assert_eq!(
        transcoder.modes_for(P1080),
        [AccelMode::Hardware, AccelMode::Software]
    );

    let software = transcoder
        .calls()
        .into_iter()
        .find(|c| c.label == P1080 && c.mode == AccelMode::Software)
        .unwrap();
    assert!(software.log_path.to_string_lossy().ends_with("Movie__Optimized-1080p-CPU.log"));
    assert_eq!(software.header, "[GPU#1] Optimized-1080p [src=orig] (CPU)");

    // The fallback output still feeds the next target
    assert_eq!(
        report.outcome(P720).unwrap().state,
        TargetState::Succeeded(EncodedWith::Gpu)
    );
    assert_eq!(
        report.outcome(P720).unwrap().input,
        output_path(&job.source_path, P1080)
    );
}

#[test]
fn test_no_nvenc_goes_straight_to_software() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let transcoder = Arc::new(FakeTranscoder::new());
    let ctx = context(
        Arc::new(FakeProber::new()),
        transcoder.clone(),
        no_nvenc(),
        lib.options(),
    );

    let (report, _) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    assert_eq!(
        report.summary(),
        "Optimized-1080p: encoded(CPU) | Optimized-720p: encoded(CPU)"
    );
    assert!(
        transcoder
            .calls()
            .iter()
            .all(|c| c.mode == AccelMode::Software)
    );
    assert_eq!(report.outcome(P1080).unwrap().attempts, [AccelMode::Software]);
}

#[test]
fn test_cpu_worker_never_uses_hardware() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let transcoder = Arc::new(FakeTranscoder::new());
    let ctx = context(
        Arc::new(FakeProber::new()),
        transcoder.clone(),
        nvenc(),
        lib.options(),
    );

    let (report, _) = run_job(&ctx, &job, "CPU#1", AccelMode::Software, &CancelToken::new());

    assert_eq!(report.code(), 0);
    let calls = transcoder.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.mode == AccelMode::Software));
    assert!(
        calls
            .iter()
            .all(|c| c.log_path.to_string_lossy().ends_with("-CPU.log"))
    );
    assert_eq!(calls[0].header, "[CPU#1] Optimized-1080p [src=orig] (CPU)");
}

#[test]
fn test_cancel_during_first_target_leaves_rest_pending() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let transcoder = Arc::new(
        FakeTranscoder::new().script(P1080, AccelMode::Hardware, Script::CancelDuring),
    );
    let ctx = context(
        Arc::new(FakeProber::new()),
        transcoder.clone(),
        nvenc(),
        lib.options(),
    );
    let cancel = CancelToken::new();

    let (report, _) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &cancel);

    assert!(report.cancelled);
    assert_eq!(report.outcome(P1080).unwrap().state, TargetState::Cancelled);
    assert_eq!(report.outcome(P720).unwrap().state, TargetState::Pending);
    assert_eq!(report.summary(), "cancelled");
    assert_eq!(report.code(), 0);

    // No software retry after a cancelled hardware attempt
    assert_eq!(transcoder.calls().len(), 1);
    // The partial zero-byte output was cleaned up
    assert!(!output_path(&job.source_path, P1080).exists());
}

#[test]
fn test_cancel_after_first_target_keeps_its_result() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let transcoder = Arc::new(
        FakeTranscoder::new().script(P1080, AccelMode::Hardware, Script::SucceedThenCancel),
    );
    let ctx = context(
        Arc::new(FakeProber::new()),
        transcoder.clone(),
        nvenc(),
        lib.options(),
    );

    let (report, _) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    assert!(report.cancelled);
    assert_eq!(report.summary(), "Optimized-1080p: encoded(GPU)");
    assert_eq!(report.outcome(P720).unwrap().state, TargetState::Pending);
    assert_eq!(transcoder.calls().len(), 1);
}

#[test]
fn test_second_run_skips_existing_outputs() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    write_file(&output_path(&job.source_path, P1080), b"done");
    write_file(&output_path(&job.source_path, P720), b"done");
    let transcoder = Arc::new(FakeTranscoder::new());
    let prober = Arc::new(FakeProber::new());
    let ctx = context(prober.clone(), transcoder.clone(), nvenc(), lib.options());

    let (report, board) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    assert_eq!(
        report.summary(),
        "Optimized-1080p: skipped(exists) | Optimized-720p: skipped(exists)"
    );
    assert_eq!(report.code(), 0);
    assert!(transcoder.calls().is_empty());
    assert!(prober.probed().is_empty());
    assert_eq!(board.snapshot()[0].lines[2], "Status: skipped(exists)");
    // The existing 1080p output is still the cascade source for the header
    assert_eq!(board.snapshot()[0].lines[0], "[GPU#1] Optimized-720p [src=1080p]");
}

#[test]
fn test_rerun_of_same_job_is_idempotent() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let transcoder = Arc::new(FakeTranscoder::new());
    let ctx = context(
        Arc::new(FakeProber::new()),
        transcoder.clone(),
        nvenc(),
        lib.options(),
    );

    let (first, _) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());
    assert_eq!(
        first.summary(),
        "Optimized-1080p: encoded(GPU) | Optimized-720p: encoded(GPU)"
    );
    let out1080 = output_path(&job.source_path, P1080);
    let out720 = output_path(&job.source_path, P720);
    let written = (
        fs::read_to_string(&out1080).unwrap(),
        fs::read_to_string(&out720).unwrap(),
    );

    let (second, _) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    assert_eq!(
        second.summary(),
        "Optimized-1080p: skipped(exists) | Optimized-720p: skipped(exists)"
    );
    assert_eq!(second.code(), 0);
    assert_eq!(transcoder.calls().len(), 2);
    assert_eq!(fs::read_to_string(&out1080).unwrap(), written.0);
    assert_eq!(fs::read_to_string(&out720).unwrap(), written.1);
}

#[test]
fn test_pane_announces_each_attempt() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let board = StatusBoard::new(["GPU#1"]);
    let recorder = Arc::new(StatusRecorder::new(
        board.clone(),
        "GPU#1",
        FakeTranscoder::new().script(P1080, AccelMode::Hardware, Script::Fail(1)),
    ));
    let ctx = context(
        Arc::new(FakeProber::new()),
        recorder.clone(),
        nvenc(),
        lib.options(),
    );
    let identity = WorkerIdentity::new("GPU#1", AccelMode::Hardware);
    let pane = board.pane("GPU#1");

    let report = CascadeResolver::new(&ctx, &identity, &pane, &CancelToken::new()).run_job(&job);

    assert_eq!(report.code(), 0);
    assert_eq!(
        recorder.seen(),
        [
            "Status: encoding(GPU)",
            "Status: fallback-to-CPU",
            "Status: encoding(GPU)",
        ]
    );
}

#[test]
fn test_cpu_pane_announces_software_attempts() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let board = StatusBoard::new(["CPU#1"]);
    let recorder = Arc::new(StatusRecorder::new(
        board.clone(),
        "CPU#1",
        FakeTranscoder::new(),
    ));
    let ctx = context(
        Arc::new(FakeProber::new()),
        recorder.clone(),
        nvenc(),
        lib.options(),
    );
    let identity = WorkerIdentity::new("CPU#1", AccelMode::Software);
    let pane = board.pane("CPU#1");

    CascadeResolver::new(&ctx, &identity, &pane, &CancelToken::new()).run_job(&job);

    assert_eq!(
        recorder.seen(),
        ["Status: encoding(CPU)", "Status: encoding(CPU)"]
    );
}

#[test]
fn test_zero_byte_leftover_is_re_encoded() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let out1080 = output_path(&job.source_path, P1080);
    write_file(&out1080, b"");
    let transcoder = Arc::new(FakeTranscoder::new());
    let ctx = context(
        Arc::new(FakeProber::new()),
        transcoder.clone(),
        nvenc(),
        lib.options(),
    );

    let (report, _) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    assert_eq!(
        report.outcome(P1080).unwrap().state,
        TargetState::Succeeded(EncodedWith::Gpu)
    );
    assert!(fs::metadata(&out1080).unwrap().len() > 0);
    assert_eq!(transcoder.calls().len(), 2);
}

#[test]
fn test_force_overwrites_existing_outputs() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let out1080 = output_path(&job.source_path, P1080);
    write_file(&out1080, b"stale");
    write_file(&output_path(&job.source_path, P720), b"stale");
    let transcoder = Arc::new(FakeTranscoder::new());
    let options = RunOptions {
        force: true,
        ..lib.options()
    };
    let ctx = context(Arc::new(FakeProber::new()), transcoder.clone(), nvenc(), options);

    let (report, _) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    assert_eq!(report.code(), 0);
    assert_eq!(transcoder.calls().len(), 2);
    assert_ne!(fs::read(&out1080).unwrap(), b"stale");
}

#[test]
fn test_probe_failure_skips_target_and_continues() {
    let lib = Library::new();
    let job = lib.source("Broken.mkv");
    let transcoder = Arc::new(FakeTranscoder::new());
    let prober = Arc::new(FakeProber::new().failing(&job.source_path));
    let ctx = context(prober, transcoder.clone(), nvenc(), lib.options());

    let (report, board) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    assert_eq!(
        report.summary(),
        "Optimized-1080p: failed(ffprobe) | Optimized-720p: failed(ffprobe)"
    );
    assert_eq!(report.code(), 1);
    assert!(transcoder.calls().is_empty());
    let pane = &board.snapshot()[0];
    assert!(pane.lines[2].starts_with("ffprobe: "));
    assert_eq!(pane.lines[3], "Status: failed(ffprobe)");
}

#[test]
fn test_failed_dependency_falls_back_to_original() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let transcoder = Arc::new(
        FakeTranscoder::new()
            .script(P1080, AccelMode::Hardware, Script::FailEmpty(187))
            .script(P1080, AccelMode::Software, Script::FailEmpty(187)),
    );
    let ctx = context(
        Arc::new(FakeProber::new()),
        transcoder.clone(),
        nvenc(),
        lib.options(),
    );

    let (report, _) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    let first = report.outcome(P1080).unwrap();
    assert_eq!(first.state, TargetState::Failed { exit_code: 187 });
    assert_eq!(first.status_line(), "Optimized-1080p: failed(ffmpeg rc=187)");
    assert!(!first.output.exists());

    let second = report.outcome(P720).unwrap();
    assert_eq!(second.input, job.source_path);
    assert_eq!(second.state, TargetState::Succeeded(EncodedWith::Gpu));
    assert_eq!(report.code(), 187);
}

#[test]
fn test_exit_zero_without_output_is_a_failure() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let transcoder = Arc::new(
        FakeTranscoder::new().script(P1080, AccelMode::Software, Script::NoOutput),
    );
    let ctx = context(
        Arc::new(FakeProber::new()),
        transcoder.clone(),
        no_nvenc(),
        lib.options(),
    );

    let (report, _) = run_job(&ctx, &job, "CPU#1", AccelMode::Software, &CancelToken::new());

    assert_eq!(
        report.outcome(P1080).unwrap().state,
        TargetState::Failed { exit_code: 1 }
    );
    assert_eq!(report.outcome(P720).unwrap().input, job.source_path);
}

#[test]
fn test_cascade_disabled_reads_original() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let transcoder = Arc::new(FakeTranscoder::new());
    let options = RunOptions {
        cascade: false,
        ..lib.options()
    };
    let ctx = context(Arc::new(FakeProber::new()), transcoder.clone(), nvenc(), options);

    let (report, _) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    assert_eq!(report.code(), 0);
    let calls = transcoder.calls();
    assert!(calls.iter().all(|c| c.source == job.source_path));
    assert_eq!(calls[1].header, "[GPU#1] Optimized-720p [src=orig]");
}

#[test]
fn test_source_without_video_fails_build() {
    let lib = Library::new();
    let job = lib.source("Album.mkv");
    let transcoder = Arc::new(FakeTranscoder::new());
    let prober = Arc::new(FakeProber::new().with_media(&job.source_path, media(AUDIO_ONLY)));
    let ctx = context(prober, transcoder.clone(), nvenc(), lib.options());

    let (report, board) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    assert_eq!(
        report.summary(),
        "Optimized-1080p: failed(build) | Optimized-720p: failed(build)"
    );
    assert_eq!(report.code(), 1);
    assert!(transcoder.calls().is_empty());
    assert!(board.snapshot()[0].lines[2].starts_with("Build error: "));
}

#[test]
fn test_spawn_error_counts_as_failed_attempt() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let transcoder = Arc::new(
        FakeTranscoder::new()
            .script(P1080, AccelMode::Software, Script::SpawnError)
            .script(P720, AccelMode::Software, Script::SpawnError),
    );
    let ctx = context(
        Arc::new(FakeProber::new()),
        transcoder.clone(),
        no_nvenc(),
        lib.options(),
    );

    let (report, _) = run_job(&ctx, &job, "CPU#1", AccelMode::Software, &CancelToken::new());

    assert_eq!(
        report.summary(),
        "Optimized-1080p: failed(ffmpeg rc=1) | Optimized-720p: failed(ffmpeg rc=1)"
    );
    assert_eq!(report.code(), 1);
}
