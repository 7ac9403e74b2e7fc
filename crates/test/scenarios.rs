use std::time::Duration;

use libtest_mimic::{Arguments, Failed, Trial};

use vtpc_core::orchestrator::FailureReason;
use vtpc_core::platform::stub::{StubDesktop, Trigger, WindowSpec};
use vtpc_core::platform::WindowManager;
use vtpc_core::types::*;
use vtpc_test::{app_with, details, statistics, Outcome, Scenario};

fn check(cond: bool, what: &str) -> Result<(), Failed> {
    if cond {
        Ok(())
    } else {
        Err(what.into())
    }
}

fn run(scenario: &Scenario) -> Result<Outcome, Failed> {
    scenario.run("demo.vtp").map_err(|e| Failed::from(format!("{:#}", e)))
}

fn simulated_compile_reports_warning() -> Result<(), Failed> {
    let s = Scenario::simulated();
    let out = run(&s)?;

    check(out.succeeded(), "compile should succeed")?;
    check(out.result.warnings == 1 && out.result.errors == 0, "one warning, no errors")?;
    check(out.result.compile_time == Some(0.42), "compile time from statistics dialog")?;
    check(
        out.result.warning_messages
            == vec!["WARNING (LGSPLS1001) Object \"Video1\" on Page \"Main\" has an unassigned Smart Object ID."],
        "wrapped warning is joined",
    )?;
    check(s.desk.clicked().iter().any(|(_, t)| t == "&No"), "save prompt declined")?;
    check(!s.desk.is_window(out.hwnd), "main window closed")?;
    check(s.desk.terminated().is_empty(), "no forced termination")?;
    Ok(())
}

fn recompile_all_sends_alt_f12() -> Result<(), Failed> {
    let mut s = Scenario::simulated();
    s.recompile_all = true;
    let out = run(&s)?;

    check(out.succeeded(), "compile should succeed")?;
    let chords: Vec<Chord> = s.desk.keystrokes().into_iter().map(|k| k.chord).collect();
    check(chords == vec![Chord::RECOMPILE_ALL], "only Alt+F12 is sent")?;
    Ok(())
}

fn main_window_log_strategy() -> Result<(), Failed> {
    let mut s = Scenario::simulated();
    s.completion = CompletionStrategy::MainWindowLog;
    let out = run(&s)?;

    check(out.succeeded(), "compile should succeed")?;
    check(out.result.warnings == 1, "summary line counts")?;
    check(out.result.size.as_deref() == Some("18,588,092 bytes"), "program size captured")?;
    check(out.result.project_size.as_deref() == Some("512 Kb"), "project size captured")?;
    check(out.result.warning_messages.len() == 1, "inline warning captured")?;
    Ok(())
}

fn errors_fail_the_run() -> Result<(), Failed> {
    let s = Scenario::new(app_with(vec![
        WindowSpec::new("Compiling...").lasting(Duration::from_millis(20)),
        statistics(0, 1, 2).after(Duration::from_millis(25)),
        details(&[
            "ERROR (LGSPLS3001) Join 12 on \"Button1\"",
            "is out of range.",
            "NOTICE (LGSPLS4001) Page \"Setup\" is unused.",
            "ERROR (LGSPLS3002) Missing image \"logo.png\"",
        ])
        .after(Duration::from_millis(30)),
    ]));
    let out = run(&s)?;

    check(out.failure == Some(FailureReason::CompilationErrors(2)), "failure names the error count")?;
    check(out.result.has_errors, "result has errors")?;
    check(out.result.error_messages.len() == 2, "two error messages")?;
    check(out.result.error_messages[0].ends_with("is out of range."), "continuation joined")?;
    check(out.result.notice_messages.len() == 1, "one notice")?;
    check(!s.desk.is_window(out.hwnd), "application closed after errors")?;
    Ok(())
}

fn incomplete_symbols_aborts() -> Result<(), Failed> {
    let s = Scenario::new(app_with(vec![WindowSpec::new("Incomplete Symbols")
        .child(ChildControl::new("Edit", "Symbol 'Slider 3' on page 'Audio' has no analog join assigned to it."))]));
    let out = run(&s)?;

    check(out.failure == Some(FailureReason::IncompleteSymbols), "incomplete symbols reported")?;
    check(out.result.errors == 1 && out.result.error_messages.len() == 1, "one synthetic error")?;
    check(s.desk.find("Incomplete Symbols").is_none(), "dialog closed")?;
    Ok(())
}

fn silent_application_times_out() -> Result<(), Failed> {
    let mut s = Scenario::new(app_with(Vec::new()));
    s.timeouts.compile = Duration::from_millis(150);
    let out = run(&s)?;

    check(out.failure == Some(FailureReason::Timeout(Duration::from_millis(150))), "timeout reported")?;
    check(out.result.error_messages.len() == 1, "one synthetic error")?;
    check(out.result.error_messages[0].starts_with("Compilation timeout"), "timeout message")?;
    Ok(())
}

fn convert_prompt_is_confirmed() -> Result<(), Failed> {
    let desk = app_with(vec![WindowSpec::new("Convert/Compile")]);
    desk.once(Trigger::Key(Chord::CONFIRM), vec![statistics(0, 0, 0)]);
    let s = Scenario::new(desk);
    let out = run(&s)?;

    check(out.succeeded(), "compile should succeed")?;
    let chords: Vec<Chord> = s.desk.keystrokes().into_iter().map(|k| k.chord).collect();
    check(chords == vec![Chord::COMPILE, Chord::CONFIRM], "F12 then Enter")?;
    Ok(())
}

fn key_event_fallback() -> Result<(), Failed> {
    let s = Scenario::simulated();
    s.desk.set_send_input_fails(true);
    let out = run(&s)?;

    check(out.succeeded(), "compile should succeed through the fallback")?;
    check(s.desk.keystrokes().len() == 1, "trigger delivered exactly once")?;
    Ok(())
}

fn post_load_warning_is_dismissed() -> Result<(), Failed> {
    let desk = app_with(vec![statistics(0, 0, 0)]);
    desk.once(Trigger::Launch, vec![WindowSpec::new("VisionTools(R) Pro-e").after(Duration::from_millis(15))]);
    let s = Scenario::new(desk);
    let out = run(&s)?;

    check(out.succeeded(), "compile should succeed")?;
    check(
        s.desk.closed().iter().any(|(_, label)| label == "VisionTools(R) Pro-e"),
        "warning dialog closed before compiling",
    )?;
    Ok(())
}

fn wrong_foreground_sends_nothing() -> Result<(), Failed> {
    let s = Scenario::simulated();
    s.desk.force_foreground(0x42, 1);
    let out = run(&s)?;

    check(out.failure == Some(FailureReason::WrongForegroundWindow), "wrong window reported")?;
    check(s.desk.keystrokes().is_empty(), "no keystrokes sent")?;
    Ok(())
}

fn missing_main_window_terminates_process() -> Result<(), Failed> {
    let mut s = Scenario::new(StubDesktop::new());
    s.timeouts.window_appear = Duration::from_millis(50);
    check(s.run("demo.vtp").is_err(), "run fails without a main window")?;
    check(s.desk.terminated().len() == 1, "process terminated")?;
    Ok(())
}

fn main() {
    let args = Arguments::from_args();
    let tests = vec![
        Trial::test("simulated_compile_reports_warning", simulated_compile_reports_warning),
        Trial::test("recompile_all_sends_alt_f12", recompile_all_sends_alt_f12),
        Trial::test("main_window_log_strategy", main_window_log_strategy),
        Trial::test("errors_fail_the_run", errors_fail_the_run),
        Trial::test("incomplete_symbols_aborts", incomplete_symbols_aborts),
        Trial::test("silent_application_times_out", silent_application_times_out),
        Trial::test("convert_prompt_is_confirmed", convert_prompt_is_confirmed),
        Trial::test("key_event_fallback", key_event_fallback),
        Trial::test("post_load_warning_is_dismissed", post_load_warning_is_dismissed),
        Trial::test("wrong_foreground_sends_nothing", wrong_foreground_sends_nothing),
        Trial::test("missing_main_window_terminates_process", missing_main_window_terminates_process),
    ];
    libtest_mimic::run(&args, tests).exit();
}
