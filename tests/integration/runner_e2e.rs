// Whole-job run through the real subprocess adapter, with a shell script
// standing in for ffmpeg

use anyhow::Result;
use plexopt::engine::{
    AccelMode, Attempt, AttemptResult, CancelToken, EncodedWith, FfmpegTranscoder,
    OPTIMIZED_720P, OPTIMIZED_1080P, TargetState, Transcoder, attempt_log_path, output_path,
};
use plexopt::ui::PaneHandle;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::common::fakes::FakeProber;
use crate::common::{Library, context, nvenc, run_job, write_file};

/// Writes the destination (the argument before `-progress`) and reports progress
const FAKE_FFMPEG: &str = r#"
dest=""
prev=""
for a in "$@"; do
  if [ "$a" = "-progress" ]; then dest="$prev"; fi
  prev="$a"
done
printf 'out_time=00:00:02.000000\nfps=30.0\nspeed=1.5x\ntotal_size=2048\n'
echo "deprecated pixel format used" >&2
printf 'encoded' > "$dest"
printf 'progress=end\n'
"#;

/// Runs every plan through `sh <script>` with the plan's arguments appended
struct ScriptedFfmpeg {
    script: PathBuf,
    inner: FfmpegTranscoder,
}

impl Transcoder for ScriptedFfmpeg {
    fn transcode(
        &self,
        attempt: &Attempt<'_>,
        pane: &PaneHandle,
        cancel: &CancelToken,
    ) -> Result<AttemptResult> {
        let mut plan = attempt.plan.clone().with_program("sh");
        let mut args = vec![OsString::from(&self.script)];
        args.append(&mut plan.args);
        plan.args = args;
        let wrapped = Attempt {
            plan: &plan,
            header: attempt.header.clone(),
            log_path: attempt.log_path.clone(),
        };
        self.inner.transcode(&wrapped, pane, cancel)
    }
}

#[test]
fn test_job_runs_through_subprocess_adapter() {
    let lib = Library::new();
    let job = lib.source("Movie.mkv");
    let script = lib.root().join("fake-ffmpeg.sh");
    write_file(&script, FAKE_FFMPEG.as_bytes());

    let transcoder = Arc::new(ScriptedFfmpeg {
        script,
        inner: FfmpegTranscoder::new(Duration::from_millis(200)),
    });
    let ctx = context(Arc::new(FakeProber::new()), transcoder, nvenc(), lib.options());

    let (report, board) = run_job(&ctx, &job, "GPU#1", AccelMode::Hardware, &CancelToken::new());

    assert_eq!(
        report.outcome(OPTIMIZED_1080P.label).unwrap().state,
        TargetState::Succeeded(EncodedWith::Gpu)
    );
    assert_eq!(
        report.outcome(OPTIMIZED_720P.label).unwrap().state,
        TargetState::Succeeded(EncodedWith::Gpu)
    );

    let out1080 = output_path(&job.source_path, OPTIMIZED_1080P.label);
    let out720 = output_path(&job.source_path, OPTIMIZED_720P.label);
    assert_eq!(fs::read_to_string(&out1080).unwrap(), "encoded");
    assert_eq!(fs::read_to_string(&out720).unwrap(), "encoded");

    let log1080 = attempt_log_path(&lib.log_dir(), &job.source_path, OPTIMIZED_1080P.label, "");
    let text = fs::read_to_string(&log1080).unwrap();
    assert!(text.contains("h264_nvenc"));
    assert!(text.contains("[STDERR] deprecated pixel format used"));
    assert!(text.trim_end().ends_with("# STATUS: SUCCESS"));

    // The 720p attempt read the 1080p output and is logged under that input's name
    let log720 = attempt_log_path(&lib.log_dir(), &out1080, OPTIMIZED_720P.label, "");
    let text = fs::read_to_string(&log720).unwrap();
    assert!(text.contains("Movie (Optimized-1080p).mp4"));
    assert!(text.contains("scale=1280:720"));
    assert!(text.trim_end().ends_with("# STATUS: SUCCESS"));

    let pane = &board.snapshot()[0];
    assert_eq!(pane.lines[0], "[GPU#1] Optimized-720p [src=1080p]");
    assert_eq!(pane.lines[2], "Status: done.");
}
