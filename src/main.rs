use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use vtpc_core::lifecycle::Lifecycle;
use vtpc_core::logger;
use vtpc_core::monitor::MonitorSession;
use vtpc_core::orchestrator::Compiler;
use vtpc_core::platform::create_platform;
use vtpc_core::settings::{Settings, Timeouts};
use vtpc_core::sleep::settle;
use vtpc_core::types::{CompileOptions, CompileResult};

const USAGE: &str = "usage: vtpc <file.vtp> [--recompile-all|-r] [--verbose|-V] [--stub] [--json]";

struct Args {
    file: PathBuf,
    recompile_all: bool,
    verbose: bool,
    stub: bool,
    json: bool,
}

fn parse_args() -> Result<Args> {
    let mut file = None;
    let mut args = Args { file: PathBuf::new(), recompile_all: false, verbose: false, stub: false, json: false };
    for a in std::env::args().skip(1) {
        match a.as_str() {
            "--recompile-all" | "-r" => args.recompile_all = true,
            "--verbose" | "-V" => args.verbose = true,
            "--stub" => args.stub = true,
            "--json" => args.json = true,
            s if s.starts_with('-') => bail!("unknown flag {}\n{}", s, USAGE),
            s if file.is_none() => file = Some(PathBuf::from(s)),
            _ => bail!("expected exactly one file\n{}", USAGE),
        }
    }
    let Some(file) = file else { bail!("file path required\n{}", USAGE) };
    if file.extension().and_then(|e| e.to_str()) != Some("vtp") {
        bail!("file must have .vtp extension");
    }
    args.file = file;
    Ok(args)
}

fn resolve_file(file: &Path, must_exist: bool) -> Result<PathBuf> {
    if must_exist && !file.exists() {
        bail!("file does not exist: {}", file.display());
    }
    if file.is_absolute() {
        return Ok(file.to_path_buf());
    }
    Ok(std::env::current_dir().context("reading working directory")?.join(file))
}

fn print_result(result: &CompileResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    let time = result.compile_time.map(|t| format!("{:.2}s", t)).unwrap_or_else(|| "-".into());
    println!(
        "errors: {}  warnings: {}  notices: {}  time: {}",
        result.errors, result.warnings, result.notices, time
    );
    if let Some(size) = &result.size {
        println!("size: {}", size);
    }
    Ok(())
}

/// Launch, compile, clean up. Ok(false) when the compile reported errors.
fn run(args: &Args) -> Result<bool> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let settings = Settings::load(&cwd.join("vtpc.json"));
    let log_path = logger::init(&cwd.join("logs"), args.verbose || settings.verbose)?;
    logger::debug(&format!("logging to {}", log_path.display()));

    let file = resolve_file(&args.file, !args.stub)?;
    let deps = create_platform(args.stub);
    let timeouts = if args.stub { Timeouts::quick() } else { settings.timeouts.clone() };

    let app = settings.app_path();
    if !args.stub && !app.exists() {
        bail!("VTPro not found at {}\nset VTPRO_PATH or app_path in vtpc.json", app.display());
    }
    let lifecycle = Lifecycle::new(deps.clone(), timeouts.clone());
    let pid = lifecycle.launch(&app, &file)?;
    let session = Arc::new(MonitorSession::new());
    let monitor = lifecycle.start_monitoring(session.clone(), Some(pid));

    logger::info("Waiting for VTPro to fully launch...");
    let Some(hwnd) = lifecycle.wait_for_appear(pid, timeouts.window_appear) else {
        logger::error("Timeout waiting for the main window to appear");
        lifecycle.force_cleanup(None, Some(pid));
        bail!("timed out waiting for VTPro window to appear");
    };
    if !lifecycle.wait_for_ready(hwnd, timeouts.window_ready) {
        lifecycle.cleanup(hwnd, Some(pid));
        bail!("window appeared but is not responding properly");
    }
    logger::info("Waiting for UI to settle...");
    settle(timeouts.ui_settle);

    lifecycle.wait_for_file_loaded(&session, Some(pid), timeouts.window_ready);
    lifecycle.handle_post_load_dialogs(&session);

    let pid_slot = Arc::new(AtomicU32::new(0));
    let opts = CompileOptions {
        file_path: file,
        recompile_all: args.recompile_all,
        hwnd,
        pid: Some(pid),
        pid_slot: Some(pid_slot.clone()),
        completion: settings.completion,
        ..Default::default()
    };
    let outcome = Compiler::new(deps, timeouts).compile(&session, &opts);

    let pid = match pid_slot.load(Ordering::SeqCst) {
        0 => pid,
        p => p,
    };
    lifecycle.cleanup(hwnd, Some(pid));
    monitor.stop();

    let (result, ok) = match outcome {
        Ok(r) => (r, true),
        Err(f) => {
            logger::error(&format!("Compilation failed: {}", f));
            (f.result, false)
        }
    };
    logger::info(&format!(
        "Compilation complete: {} error(s), {} warning(s), {} notice(s)",
        result.errors, result.warnings, result.notices
    ));
    print_result(&result, args.json)?;
    Ok(ok && !result.has_errors)
}

fn main() -> ExitCode {
    let outcome = parse_args().and_then(|args| run(&args));
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            // Console output goes through the logger once it is up
            if logger::log_path().is_some() {
                logger::error(&format!("{:#}", e));
            } else {
                eprintln!("ERROR: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}
