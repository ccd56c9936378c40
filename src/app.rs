use crate::cli::{Cli, Commands, RunArgs};
use anyhow::{Context, Result};
use plexopt::config::Config;
use plexopt::engine::{
    self, AccelMode, BudgetPlan, CancelToken, Capabilities, DispatchConfig, Dispatcher,
    EncodeRequest, EngineContext, FfmpegTranscoder, FfprobeProber, Job, Prober, RunOptions,
    MAX_CPU_WORKERS, MAX_GPU_WORKERS, RunSummary, TARGETS,
};
use plexopt::ui::{RenderMode, clamp_interval, restore_terminal};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

/// Missing tools, bad root, no workers
const EXIT_PRECONDITION: i32 = 2;

/// Second Ctrl+C
const EXIT_INTERRUPTED: i32 = 130;

/// Effective run settings: CLI flags over config values over built-in defaults.
#[derive(Debug, Clone, PartialEq)]
struct Settings {
    force: bool,
    gpu_workers: u32,
    cpu_workers: u32,
    cpu_threads: u32,
    gpu_filter_threads: u32,
    cpu_budget_for_gpu: u32,
    gpu_decode: bool,
    refresh: Duration,
    log_dir: PathBuf,
    cascade: bool,
    plain: bool,
}

impl Settings {
    fn resolve(config: &Config, args: &RunArgs) -> Self {
        let d = &config.defaults;
        Self {
            force: args.force || d.overwrite,
            gpu_workers: args
                .gpu_workers
                .unwrap_or(d.gpu_workers)
                .min(MAX_GPU_WORKERS),
            cpu_workers: args
                .cpu_workers
                .unwrap_or(d.cpu_workers)
                .min(MAX_CPU_WORKERS),
            cpu_threads: args.cpu_threads.unwrap_or(d.cpu_threads),
            gpu_filter_threads: args.gpu_filter_threads.unwrap_or(d.gpu_filter_threads),
            cpu_budget_for_gpu: args.cpu_budget_for_gpu.unwrap_or(d.cpu_budget_for_gpu),
            gpu_decode: args.gpu_decode || d.gpu_decode,
            refresh: clamp_interval(args.refresh.unwrap_or(d.refresh_secs)),
            log_dir: args.log_dir.clone().unwrap_or_else(|| d.log_dir.clone()),
            cascade: !args.no_cascade && d.cascade,
            plain: args.plain || config.display.plain,
        }
    }

    fn budget(&self, caps: &Capabilities) -> BudgetPlan {
        BudgetPlan {
            gpu_workers: self.gpu_workers,
            cpu_budget_for_gpu: self.cpu_budget_for_gpu,
            gpu_filter_threads: self.gpu_filter_threads,
            cpu_threads: self.cpu_threads,
            full_gpu_pipeline: caps.full_gpu_pipeline(),
        }
    }

    fn render_mode(&self) -> RenderMode {
        if self.plain || !std::io::stdout().is_terminal() {
            RenderMode::Plain
        } else {
            RenderMode::Tui
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().context("Could not determine current directory")?,
    };
    let resolved = root
        .canonicalize()
        .with_context(|| format!("Invalid directory: {}", root.display()))?;
    anyhow::ensure!(resolved.is_dir(), "Invalid directory: {}", resolved.display());
    Ok(resolved)
}

pub fn run(cli: Cli) {
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(EXIT_PRECONDITION);
        }
    };
    let settings = Settings::resolve(&config, &cli.run);

    if let Some(command) = cli.command {
        match command {
            Commands::CheckFfmpeg => handle_check_ffmpeg(&settings),
            Commands::Scan { root } => handle_scan(root.or(cli.root)),
            Commands::DryRun { root } => handle_dry_run(root.or(cli.root), &settings),
            Commands::InitConfig => handle_init_config(cli.config.as_deref()),
        }
        return;
    }

    match handle_run(cli.root, &settings, cli.verbose) {
        Ok(Some(summary)) => print_summary(&summary),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(EXIT_PRECONDITION);
        }
    }
}

fn handle_check_ffmpeg(settings: &Settings) {
    match engine::check_tools() {
        Ok((ffmpeg, ffprobe)) => {
            println!("ffmpeg found: {}", ffmpeg);
            println!("ffprobe found: {}", ffprobe);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }

    let caps = Capabilities::detect(true);
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    println!("NVENC ({}): {}", engine::VIDEO_CODEC_GPU, yes_no(caps.nvenc));
    println!("scale_cuda: {}", yes_no(caps.scale_cuda));
    if !caps.nvenc {
        println!("GPU workers will encode with {}.", engine::VIDEO_CODEC_CPU);
    } else if settings.gpu_decode && !caps.scale_cuda {
        println!("--gpu-decode requested but scale_cuda is missing; decode/scale stay on the CPU.");
    }
}

/// Walk `root` and keep sources above the baseline resolution
fn find_jobs(root: &Path, prober: &dyn Prober) -> Result<engine::CandidateScan> {
    let files = engine::scan(root)
        .with_context(|| format!("Error scanning directory: {}", root.display()))?;
    Ok(engine::build_job_queue(files, prober))
}

fn handle_scan(root: Option<PathBuf>) {
    let root = match resolve_root(root) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(EXIT_PRECONDITION);
        }
    };
    println!("Scanning directory: {}", root.display());

    match find_jobs(&root, &FfprobeProber) {
        Ok(found) => {
            for job in &found.jobs {
                println!(
                    "- {} ({}x{})",
                    job.source_path.display(),
                    job.probed_width,
                    job.probed_height
                );
            }
            println!(
                "Candidates (>1080p): {} | Skipped (<=1080p): {}",
                found.jobs.len(),
                found.skipped.len()
            );
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Print the commands one job would run. Cascaded inputs are shown as the
/// dependency's planned output.
fn print_job_plan(job: &Job, settings: &Settings, caps: &Capabilities, prober: &dyn Prober) {
    println!("# {}", job.source_path.display());
    let media = match prober.probe(&job.source_path) {
        Ok(media) => media,
        Err(e) => {
            println!("  failed(ffprobe): {}", e);
            return;
        }
    };

    let mode = if settings.gpu_workers > 0 && caps.nvenc {
        AccelMode::Hardware
    } else {
        AccelMode::Software
    };
    let budget = settings.budget(caps);
    let threads = match mode {
        AccelMode::Hardware => budget.gpu_allotment(),
        AccelMode::Software => budget.cpu_allotment(),
    };

    for target in TARGETS {
        let destination = engine::output_path(&job.source_path, target.label);
        let finished = std::fs::metadata(&destination).is_ok_and(|m| m.len() > 0);
        if !settings.force && finished {
            println!("  {}: skipped(exists)", target.label);
            continue;
        }
        let input = match target.depends_on {
            Some(dep) if settings.cascade => engine::output_path(&job.source_path, dep),
            _ => job.source_path.clone(),
        };
        let request = EncodeRequest {
            source: &input,
            destination: &destination,
            target,
            mode,
            threads,
            full_gpu_pipeline: caps.full_gpu_pipeline(),
            media: &media,
        };
        match engine::build_encode_plan(&request) {
            Ok(plan) => println!("  {}: {}", target.label, engine::format_ffmpeg_cmd(&plan)),
            Err(e) => println!("  {}: failed(build): {}", target.label, e),
        }
    }
}

fn handle_dry_run(root: Option<PathBuf>, settings: &Settings) {
    let root = match resolve_root(root) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(EXIT_PRECONDITION);
        }
    };
    println!("Dry run: building ffmpeg commands for {}", root.display());

    let prober = FfprobeProber;
    let caps = Capabilities::detect(settings.gpu_decode);
    match find_jobs(&root, &prober) {
        Ok(found) => {
            for job in &found.jobs {
                print_job_plan(job, settings, &caps, &prober);
            }
            println!("Total jobs: {}", found.jobs.len());
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_init_config(path: Option<&Path>) {
    let path = match path.map(Path::to_path_buf).map_or_else(Config::config_path, Ok) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    match Config::load_from(&path) {
        Ok(cfg) => {
            println!("Config loaded successfully from {}", path.display());
            println!("{:#?}", cfg);
        }
        Err(e) => {
            println!("Config missing or invalid: {:#}", e);
            println!("Creating default config...");

            if let Err(err) = Config::default().save_to(&path) {
                eprintln!("Failed to save default config: {:#}", err);
                process::exit(1);
            }
            println!("Default config saved to {}", path.display());
        }
    }
}

/// First Ctrl+C cancels the run; a second one exits immediately.
fn install_interrupt_handler(cancel: &CancelToken) {
    let token = cancel.clone();
    let installed = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            // The renderer may still own the alternate screen
            if std::io::stdout().is_terminal() {
                let _ = restore_terminal(&mut std::io::stdout());
            }
            process::exit(EXIT_INTERRUPTED);
        }
        token.cancel();
    });
    if let Err(e) = installed {
        tracing::warn!(error = %e, "could not install Ctrl+C handler");
    }
}

/// Full run. `Ok(None)` means there was nothing to do.
fn handle_run(
    root: Option<PathBuf>,
    settings: &Settings,
    verbose: bool,
) -> Result<Option<RunSummary>> {
    engine::check_tools().context("ffmpeg/ffprobe not found in PATH")?;
    let root = resolve_root(root)?;
    anyhow::ensure!(
        settings.gpu_workers.saturating_add(settings.cpu_workers) > 0,
        "at least one GPU or CPU worker is required"
    );

    let log_path = engine::init_tracing(&settings.log_dir, verbose)?;
    let log_dir = settings
        .log_dir
        .canonicalize()
        .unwrap_or_else(|_| settings.log_dir.clone());
    println!("[INFO] Logs: {}", log_dir.display());
    tracing::info!(root = %root.display(), log = %log_path.display(), "run starting");

    let caps = Capabilities::detect(settings.gpu_decode);
    if !caps.nvenc && settings.gpu_workers > 0 {
        eprintln!("[WARN] NVENC not found; GPU workers will encode on the CPU.");
    }
    if settings.gpu_decode && caps.nvenc && !caps.scale_cuda {
        println!("[INFO] scale_cuda unavailable; decode/scale stay on the CPU thread budget.");
    }
    tracing::info!(
        nvenc = caps.nvenc,
        scale_cuda = caps.scale_cuda,
        full_gpu_pipeline = caps.full_gpu_pipeline(),
        "capabilities"
    );

    let prober: Arc<dyn Prober> = Arc::new(FfprobeProber);
    let found = find_jobs(&root, prober.as_ref())?;
    println!(
        "[INFO] Candidates (>1080p): {} | Skipped (<=1080p): {}",
        found.jobs.len(),
        found.skipped.len()
    );
    if found.jobs.is_empty() {
        println!("No files above 1080p found.");
        return Ok(None);
    }

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);

    let ctx = Arc::new(EngineContext {
        prober,
        transcoder: Arc::new(FfmpegTranscoder::new(settings.refresh)),
        capabilities: caps,
        budget: settings.budget(&caps),
        options: RunOptions {
            force: settings.force,
            cascade: settings.cascade,
            log_dir: settings.log_dir.clone(),
        },
    });
    let dispatcher = Dispatcher::new(
        ctx,
        DispatchConfig {
            gpu_workers: settings.gpu_workers,
            cpu_workers: settings.cpu_workers,
            refresh: settings.refresh,
            render_mode: Some(settings.render_mode()),
        },
    );

    dispatcher.run(found.jobs, &cancel).map(Some)
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.reports {
        println!(
            "[{:>3}] {} ({}): {}",
            report.code(),
            report.source.display(),
            report.worker,
            report.summary()
        );
    }
    println!(
        "Jobs: {} ok, {} failed, {} interrupted, {} not started",
        summary.succeeded(),
        summary.failed(),
        summary.interrupted(),
        summary.not_started
    );
    if summary.cancelled {
        println!("Interrupted.");
    }
}
