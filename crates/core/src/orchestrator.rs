use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::dialogs::{DialogAction, DialogKind, DISCARD_BUTTON};
use crate::input::Injector;
use crate::logger;
use crate::monitor::MonitorSession;
use crate::parser;
use crate::platform::Deps;
use crate::settings::Timeouts;
use crate::sleep::settle;
use crate::types::*;

const INCOMPLETE_SYMBOLS_MESSAGE: &str =
    "Incomplete Symbols: The program contains incomplete symbols and cannot be compiled";
const FOREGROUND_MESSAGE: &str = "Failed to bring VTPro to foreground - cannot send keystrokes";
const WRONG_WINDOW_MESSAGE: &str = "Wrong window in foreground - cannot safely send keystrokes";
/// Edit controls shorter than this hold labels, not the symbol list.
const DETAIL_TEXT_MIN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("failed to bring VTPro to foreground - cannot send keystrokes")]
    ForegroundUnavailable,
    #[error("wrong window in foreground - cannot safely send keystrokes")]
    WrongForegroundWindow,
    #[error("program contains incomplete symbols and cannot be compiled")]
    IncompleteSymbols,
    #[error("compilation timeout: no completion signal within {0:?}")]
    Timeout(Duration),
    #[error("compilation failed with {0} error(s)")]
    CompilationErrors(u32),
}

/// A failed compile. The (possibly partial) result is always attached.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct CompileFailure {
    pub result: CompileResult,
    pub reason: FailureReason,
}

impl CompileFailure {
    fn synthetic(reason: FailureReason, message: impl Into<String>) -> Self {
        Self { result: CompileResult::failed(message), reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingForeground,
    Preflight,
    TriggerSent,
    Compiling,
    Collecting,
    Done,
    Failed,
}

/// What the event loop has learned so far.
#[derive(Debug, Default)]
struct Progress {
    result: CompileResult,
    compiling_hwnd: Option<WindowId>,
    complete_hwnd: Option<WindowId>,
    detail_hwnd: Option<WindowId>,
    grace_until: Option<Instant>,
}

/// Drives one compile through the application's dialogs.
pub struct Compiler {
    deps: Deps,
    timeouts: Timeouts,
    injector: Injector,
    phase: Mutex<Phase>,
}

fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if d.subsec_millis() == 0 && secs >= 60 && secs % 60 == 0 {
        format!("{} minute(s)", secs / 60)
    } else if d.subsec_millis() == 0 {
        format!("{} second(s)", secs)
    } else {
        format!("{} ms", d.as_millis())
    }
}

impl Compiler {
    pub fn new(deps: Deps, timeouts: Timeouts) -> Self {
        let injector = Injector::new(deps.keyboard.clone(), timeouts.keystroke);
        Self { deps, timeouts, injector, phase: Mutex::new(Phase::Idle) }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, to: Phase) {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if *phase != to {
            logger::debug_p("compile", &format!("{:?} -> {:?}", *phase, to));
            *phase = to;
        }
    }

    fn fail(&self, failure: CompileFailure) -> Result<CompileResult, CompileFailure> {
        self.transition(Phase::Failed);
        Err(failure)
    }

    /// Focus the main window, trigger the compile, follow the dialogs and
    /// close the application. A failure still carries a result.
    pub fn compile(&self, session: &MonitorSession, opts: &CompileOptions) -> Result<CompileResult, CompileFailure> {
        self.transition(Phase::Idle);
        let entry_cursor = session.cursor();
        logger::debug_p("compile", &format!("compiling {}", opts.file_path.display()));

        match opts.pid {
            Some(pid) => {
                logger::debug_p("compile", &format!("using pid {} from launch", pid));
                if let Some(slot) = &opts.pid_slot {
                    slot.store(pid, Ordering::SeqCst);
                }
            }
            None => {
                logger::warn_p("compile", "no process id, dialog detection is not limited to the application");
            }
        }

        if self.deps.windows.is_elevated() {
            logger::debug_p("compile", "running elevated");
        } else {
            logger::warn_p("compile", "not running elevated, keystroke injection may fail");
        }

        self.transition(Phase::AwaitingForeground);
        if let Err(f) = self.ensure_foreground(opts.hwnd, opts.pid) {
            return self.fail(f);
        }

        if opts.pid.is_some() && !opts.skip_preflight {
            self.transition(Phase::Preflight);
            self.drain_preflight(session);
        }

        self.transition(Phase::TriggerSent);
        let strategy = self.injector.trigger(opts.recompile_all);
        logger::debug_p("compile", &format!("trigger sent via {:?}", strategy));

        let progress = match self.run_event_loop(session, opts) {
            Ok(p) => p,
            Err(f) => return self.fail(f),
        };
        let dialogs = [
            (progress.detail_hwnd, "Program Compilation dialog"),
            (progress.complete_hwnd, "Compile Complete dialog"),
        ];
        let result = progress.result;

        logger::debug_p("compile", "closing dialogs and application");
        self.close_after_compile(session, opts, &dialogs, entry_cursor);

        if result.has_errors {
            let count = result.errors.max(result.error_messages.len() as u32);
            let reason = FailureReason::CompilationErrors(count);
            return self.fail(CompileFailure { result, reason });
        }
        self.transition(Phase::Done);
        Ok(result)
    }

    fn ensure_foreground(&self, hwnd: WindowId, pid: Option<ProcessId>) -> Result<(), CompileFailure> {
        let windows = &self.deps.windows;
        if !windows.set_foreground(hwnd) {
            logger::warn_p("compile", "could not focus the main window, retrying");
            settle(self.timeouts.focus_retry);
            if !windows.set_foreground(hwnd) {
                logger::error_p("compile", "main window could not be brought to the foreground");
                return Err(CompileFailure::synthetic(FailureReason::ForegroundUnavailable, FOREGROUND_MESSAGE));
            }
        }

        settle(self.timeouts.focus_verification);

        match windows.foreground_window() {
            Some((fg, fg_pid)) if fg == hwnd && pid.map_or(true, |p| p == fg_pid) => {
                logger::debug_p("compile", &format!("foreground verified: 0x{:x} pid {}", fg, fg_pid));
                Ok(())
            }
            other => {
                logger::error_p(
                    "compile",
                    &format!("wrong foreground window: expected 0x{:x} (pid {:?}), found {:?}", hwnd, pid, other),
                );
                Err(CompileFailure::synthetic(FailureReason::WrongForegroundWindow, WRONG_WINDOW_MESSAGE))
            }
        }
    }

    /// Clear dialogs left over from loading so they are not mistaken for compile progress.
    fn drain_preflight(&self, session: &MonitorSession) {
        let deadline = Instant::now() + self.timeouts.window_message;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let Some(ev) = session.next_event(remaining) else { break };
            logger::debug_p("compile", &format!("pre-flight event \"{}\" (0x{:x})", ev.title, ev.hwnd));
            match DialogKind::from_title(&ev.title).map(DialogKind::preflight_action) {
                Some(DialogAction::Dismiss) => {
                    logger::info(&format!("Handling pre-compilation '{}' dialog", ev.title));
                    self.deps.windows.close_window(ev.hwnd, &ev.title);
                    settle(self.timeouts.window_message);
                }
                _ => logger::trace_p("compile", &format!("ignoring pre-flight dialog \"{}\"", ev.title)),
            }
        }
        let stale = session.drain();
        if !stale.is_empty() {
            logger::debug_p("compile", &format!("discarded {} stale event(s)", stale.len()));
        }
    }

    fn run_event_loop(&self, session: &MonitorSession, opts: &CompileOptions) -> Result<Progress, CompileFailure> {
        let timeout = opts.timeout.unwrap_or(self.timeouts.compile);
        let deadline = Instant::now() + timeout;
        let mut progress = Progress::default();
        logger::debug_p("compile", &format!("waiting for dialogs ({:?} strategy)", opts.completion));

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.timeout_failure(timeout, opts.completion));
            }
            if self.finished(&mut progress, opts.completion, now) {
                self.collect(&mut progress, opts);
                return Ok(progress);
            }

            let wait = self.timeouts.state_poll.min(deadline - now);
            if let Some(ev) = session.next_event(wait) {
                logger::debug_p("compile", &format!("event \"{}\" (0x{:x})", ev.title, ev.hwnd));
                self.dispatch(&ev, &mut progress, opts)?;
            }
        }
    }

    fn dispatch(&self, ev: &WindowEvent, progress: &mut Progress, opts: &CompileOptions) -> Result<(), CompileFailure> {
        let Some(kind) = DialogKind::from_title(&ev.title) else {
            logger::debug_p("compile", &format!("no handler for \"{}\"", ev.title));
            return Ok(());
        };

        match kind.action() {
            DialogAction::Abort => return Err(self.incomplete_symbols(ev)),
            DialogAction::Confirm => self.confirm_dialog(ev),
            DialogAction::MarkCompiling => {
                if progress.compiling_hwnd.is_none() {
                    progress.compiling_hwnd = Some(ev.hwnd);
                    self.transition(Phase::Compiling);
                    if opts.recompile_all {
                        logger::info("Compiling program... (Recompile All)");
                    } else {
                        logger::info("Compiling program...");
                    }
                }
            }
            DialogAction::CaptureStatistics => {
                if progress.complete_hwnd.is_none() {
                    progress.complete_hwnd = Some(ev.hwnd);
                    self.transition(Phase::Collecting);
                    for child in self.deps.controls.child_controls(ev.hwnd) {
                        parser::parse_statistics_text(&child.text, &mut progress.result);
                    }
                    let r = &progress.result;
                    logger::debug_p(
                        "compile",
                        &format!("statistics: {} warning(s), {} notice(s), {} error(s)", r.warnings, r.notices, r.errors),
                    );
                }
            }
            DialogAction::MarkDetail => {
                if progress.detail_hwnd.is_none() {
                    logger::info("Gathering details...");
                    progress.detail_hwnd = Some(ev.hwnd);
                }
            }
            DialogAction::Dismiss => {
                logger::debug_p("compile", &format!("closing \"{}\"", ev.title));
                self.deps.windows.close_window(ev.hwnd, &ev.title);
                settle(self.timeouts.window_message);
            }
            DialogAction::AnswerNo | DialogAction::Ignore => {
                logger::trace_p("compile", &format!("ignoring \"{}\" during compile", ev.title));
            }
        }
        Ok(())
    }

    fn finished(&self, progress: &mut Progress, strategy: CompletionStrategy, now: Instant) -> bool {
        match strategy {
            CompletionStrategy::StatisticsDialog => {
                if progress.complete_hwnd.is_none() {
                    return false;
                }
                let r = &progress.result;
                let has_counts = r.warnings > 0 || r.notices > 0 || r.errors > 0;
                if !has_counts || progress.detail_hwnd.is_some() {
                    return true;
                }
                // The detail dialog can trail the statistics dialog
                let grace = *progress.grace_until.get_or_insert(now + self.timeouts.detail_grace);
                if now < grace {
                    return false;
                }
                logger::warn_p("compile", "detail dialog did not appear, reporting counts only");
                true
            }
            CompletionStrategy::MainWindowLog => progress
                .compiling_hwnd
                .is_some_and(|h| !self.deps.windows.is_window(h)),
        }
    }

    /// Fill in message bodies once the completion signal has been seen.
    fn collect(&self, progress: &mut Progress, opts: &CompileOptions) {
        match opts.completion {
            CompletionStrategy::StatisticsDialog => {
                if let Some(detail) = progress.detail_hwnd {
                    let lines: Vec<String> = self
                        .deps
                        .controls
                        .child_controls(detail)
                        .into_iter()
                        .filter(|c| c.class.eq_ignore_ascii_case("ListBox"))
                        .flat_map(|c| c.items)
                        .collect();
                    let messages = parser::parse_detailed_messages(&lines);
                    let r = &mut progress.result;
                    r.error_messages.extend(messages.errors);
                    r.warning_messages.extend(messages.warnings);
                    r.notice_messages.extend(messages.notices);
                }
            }
            CompletionStrategy::MainWindowLog => {
                logger::debug_p("compile", "compiling dialog closed, reading the output log");
                for child in self.deps.controls.child_controls(opts.hwnd) {
                    let class = child.class.to_ascii_lowercase();
                    if class == "listbox" || class.contains("edit") {
                        parser::parse_output(&child.text, &mut progress.result);
                    }
                }
            }
        }
        progress.result.update_has_errors();
        log_messages(&progress.result);
    }

    fn incomplete_symbols(&self, ev: &WindowEvent) -> CompileFailure {
        logger::error_p("compile", "Incomplete Symbols detected");
        logger::info("The program contains incomplete symbols and cannot be compiled.");
        logger::info("Please fix the incomplete symbols in VTPro before attempting to compile.");

        if let Some(detail) = self
            .deps
            .controls
            .child_controls(ev.hwnd)
            .into_iter()
            .find(|c| c.class == "Edit" && c.text.len() > DETAIL_TEXT_MIN)
        {
            logger::info(&format!("Details: {}", detail.text));
        }

        self.deps.windows.close_window(ev.hwnd, "Incomplete Symbols dialog");
        CompileFailure::synthetic(FailureReason::IncompleteSymbols, INCOMPLETE_SYMBOLS_MESSAGE)
    }

    fn confirm_dialog(&self, ev: &WindowEvent) {
        logger::debug_p("compile", &format!("confirming \"{}\"", ev.title));
        let focused = self.deps.windows.set_foreground(ev.hwnd);
        settle(self.timeouts.dialog_response);
        if focused {
            self.injector.confirm();
        } else {
            self.injector.confirm_window(ev.hwnd);
        }
        logger::info(&format!("Auto-confirmed '{}' dialog", ev.title));
    }

    fn timeout_failure(&self, timeout: Duration, strategy: CompletionStrategy) -> CompileFailure {
        let signal = match strategy {
            CompletionStrategy::StatisticsDialog => "did not detect 'Compile Complete' dialog",
            CompletionStrategy::MainWindowLog => "compiling dialog did not close",
        };
        let message = format!("Compilation timeout: {} within {}", signal, human_duration(timeout));
        logger::error_p("compile", &message);
        CompileFailure::synthetic(FailureReason::Timeout(timeout), message)
    }

    fn close_after_compile(
        &self,
        session: &MonitorSession,
        opts: &CompileOptions,
        dialogs: &[(Option<WindowId>, &str)],
        cursor: u64,
    ) {
        let windows = &self.deps.windows;
        for (hwnd, label) in dialogs {
            if let Some(h) = hwnd.filter(|h| windows.is_window(*h)) {
                windows.close_window(h, label);
                settle(self.timeouts.stability_check);
            }
        }
        if opts.hwnd == 0 {
            return;
        }

        windows.close_window(opts.hwnd, "VTPro");
        if opts.pid.is_some() {
            self.answer_confirmation(session, cursor);
        }
        settle(self.timeouts.cleanup);
    }

    /// Decline the save prompt raised by closing the main window.
    fn answer_confirmation(&self, session: &MonitorSession, cursor: u64) {
        let title = DialogKind::Confirmation.title();
        let Some(ev) = session.wait_for(cursor, self.timeouts.dialog_confirmation, |e| e.title == title) else {
            logger::debug_p("compile", "no confirmation dialog on close");
            return;
        };
        logger::info("Handling confirmation dialog");

        let controls = &self.deps.controls;
        let button = controls
            .child_controls(ev.hwnd)
            .into_iter()
            .find(|c| c.class.eq_ignore_ascii_case("Button") && c.text.eq_ignore_ascii_case(DISCARD_BUTTON));
        match button {
            Some(b) if controls.click_button(ev.hwnd, &b) => {
                logger::debug_p("compile", &format!("clicked \"{}\"", b.text));
            }
            _ => {
                logger::warn_p("compile", "could not find the 'No' button, closing the dialog");
                self.deps.windows.close_window(ev.hwnd, "Confirmation dialog");
            }
        }
        settle(self.timeouts.window_message);
    }
}

fn log_messages(result: &CompileResult) {
    let groups = [
        ("Error messages:", &result.error_messages),
        ("Warning messages:", &result.warning_messages),
        ("Notice messages:", &result.notice_messages),
    ];
    for (heading, messages) in groups {
        if messages.is_empty() {
            continue;
        }
        logger::info(heading);
        for (i, m) in messages.iter().enumerate() {
            logger::info(&format!("  {}. {}", i + 1, m));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::classify::MAIN_CLASS;
    use crate::monitor::WindowMonitor;
    use crate::platform::stub::{StubDesktop, Trigger, WindowSpec};
    use crate::platform::WindowManager;

    struct Rig {
        desk: Arc<StubDesktop>,
        pid: ProcessId,
        main: WindowId,
        session: Arc<MonitorSession>,
        compiler: Compiler,
    }

    fn rig() -> Rig {
        let desk = Arc::new(StubDesktop::new());
        let pid = desk.spawn_process();
        let main = desk.add_window(
            pid,
            WindowSpec::new("VisionTools Pro-e - [t.vtp]")
                .class(MAIN_CLASS)
                .child(ChildControl::list("ListBox", Vec::new())),
        );
        let compiler = Compiler::new(Deps::from_platform(desk.clone()), Timeouts::quick());
        Rig { desk, pid, main, session: Arc::new(MonitorSession::new()), compiler }
    }

    impl Rig {
        fn opts(&self) -> CompileOptions {
            CompileOptions {
                file_path: PathBuf::from("t.vtp"),
                hwnd: self.main,
                pid: Some(self.pid),
                skip_preflight: true,
                timeout: Some(Duration::from_millis(500)),
                ..Default::default()
            }
        }

        /// Create a dialog and queue its event as the observer would.
        fn dialog(&self, spec: WindowSpec) -> WindowId {
            let title = spec.title.clone();
            let hwnd = self.desk.add_window(self.pid, spec);
            self.session.publish(hwnd, title, self.pid, "#32770".into());
            hwnd
        }

        fn observe(&self) -> crate::monitor::MonitorHandle {
            WindowMonitor::new(
                self.session.clone(),
                self.desk.clone(),
                self.desk.clone(),
                Some(self.pid),
                Duration::from_millis(2),
            )
            .start()
        }
    }

    fn stats(warnings: u32, notices: u32, errors: u32) -> WindowSpec {
        WindowSpec::new("Compile Complete")
            .child(ChildControl::new(
                "Static",
                format!("Program Warnings: {}\r\nProgram Notices: {}\r\nProgram Errors: {}", warnings, notices, errors),
            ))
            .child(ChildControl::new("Static", "Compile Time: 1.25 seconds"))
    }

    #[test]
    fn incomplete_symbols_fails_immediately() {
        let r = rig();
        let dlg = r.dialog(
            WindowSpec::new("Incomplete Symbols")
                .child(ChildControl::new("Edit", "Signal 'x' on symbol 'Button Press' in page 'Main' has no destination")),
        );
        let mut opts = r.opts();
        opts.timeout = Some(Duration::from_secs(5));

        let start = Instant::now();
        let err = r.compiler.compile(&r.session, &opts).unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(err.reason, FailureReason::IncompleteSymbols);
        assert_eq!(err.result.errors, 1);
        assert!(err.result.has_errors);
        assert_eq!(err.result.error_messages, vec![INCOMPLETE_SYMBOLS_MESSAGE.to_string()]);
        assert!(!r.desk.is_window(dlg));
        assert_eq!(r.compiler.phase(), Phase::Failed);
    }

    #[test]
    fn silence_times_out_with_one_synthetic_error() {
        let r = rig();
        let mut opts = r.opts();
        opts.timeout = Some(Duration::from_millis(40));

        let err = r.compiler.compile(&r.session, &opts).unwrap_err();
        assert_eq!(err.reason, FailureReason::Timeout(Duration::from_millis(40)));
        assert_eq!(err.result.error_messages.len(), 1);
        assert!(err.result.error_messages[0].contains("timeout"));
        assert!(err.result.has_errors);
        assert_eq!(err.result.errors, 1);
    }

    #[test]
    fn statistics_and_detail_messages() {
        let r = rig();
        r.dialog(WindowSpec::new("Compiling..."));
        let complete = r.dialog(stats(1, 0, 2));
        let detail = r.dialog(WindowSpec::new("Program Compilation").child(ChildControl::list(
            "ListBox",
            vec![
                "ERROR (LGSPLS1001) first".into(),
                "continued".into(),
                "WARNING (LGSPLS2001) careful".into(),
                "ERROR (LGSPLS1002) second".into(),
            ],
        )));

        let err = r.compiler.compile(&r.session, &r.opts()).unwrap_err();
        assert_eq!(err.reason, FailureReason::CompilationErrors(2));
        let res = err.result;
        assert_eq!((res.warnings, res.notices, res.errors), (1, 0, 2));
        assert_eq!(res.compile_time, Some(1.25));
        assert_eq!(res.error_messages, vec![
            "ERROR (LGSPLS1001) first continued".to_string(),
            "ERROR (LGSPLS1002) second".to_string(),
        ]);
        assert_eq!(res.warning_messages.len(), 1);
        assert!(res.has_errors);

        let closed: Vec<WindowId> = r.desk.closed().into_iter().map(|(h, _)| h).collect();
        assert!(closed.contains(&complete));
        assert!(closed.contains(&detail));
        assert!(closed.contains(&r.main));
    }

    #[test]
    fn detail_dialog_trailing_statistics_is_read() {
        let r = rig();
        let mut timeouts = Timeouts::quick();
        timeouts.detail_grace = Duration::from_millis(400);
        let compiler = Compiler::new(Deps::from_platform(r.desk.clone()), timeouts);
        r.dialog(stats(0, 0, 1));

        let (desk, session, pid) = (r.desk.clone(), r.session.clone(), r.pid);
        let late = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let spec = WindowSpec::new("Program Compilation")
                .child(ChildControl::list("ListBox", vec!["ERROR (LGSPLS1001) late one".into()]));
            let hwnd = desk.add_window(pid, spec);
            session.publish(hwnd, "Program Compilation".into(), pid, "#32770".into());
        });

        let mut opts = r.opts();
        opts.timeout = Some(Duration::from_secs(2));
        let err = compiler.compile(&r.session, &opts).unwrap_err();
        late.join().unwrap();

        assert_eq!(err.reason, FailureReason::CompilationErrors(1));
        assert_eq!(err.result.error_messages, vec!["ERROR (LGSPLS1001) late one".to_string()]);
    }

    #[test]
    fn missing_detail_dialog_falls_back_to_counts() {
        let r = rig();
        r.dialog(stats(3, 0, 0));

        let start = Instant::now();
        let res = r.compiler.compile(&r.session, &r.opts()).unwrap();
        assert!(start.elapsed() >= Timeouts::quick().detail_grace);
        assert_eq!(res.warnings, 3);
        assert!(res.warning_messages.is_empty());
        assert!(!res.has_errors);
        assert_eq!(r.compiler.phase(), Phase::Done);
    }

    #[test]
    fn clean_compile_reports_zero_counts() {
        let r = rig();
        r.dialog(stats(0, 0, 0));
        let res = r.compiler.compile(&r.session, &r.opts()).unwrap();
        assert_eq!(res, CompileResult { compile_time: Some(1.25), ..Default::default() });
    }

    #[test]
    fn unknown_titles_are_ignored() {
        let r = rig();
        r.dialog(WindowSpec::new("Some Unexpected Window"));
        r.dialog(stats(0, 0, 0));
        assert!(r.compiler.compile(&r.session, &r.opts()).is_ok());
    }

    #[test]
    fn untitled_windows_are_ignored() {
        let r = rig();
        let untitled = r.dialog(WindowSpec::new(""));
        r.dialog(stats(0, 0, 0));
        assert!(r.compiler.compile(&r.session, &r.opts()).is_ok());
        assert!(r.desk.closed().iter().all(|(h, _)| *h != untitled));
    }

    #[test]
    fn compiles_without_elevation() {
        let r = rig();
        r.desk.set_elevated(false);
        r.dialog(stats(0, 0, 0));
        assert!(r.compiler.compile(&r.session, &r.opts()).is_ok());
        assert_eq!(r.desk.keystrokes().len(), 1);
    }

    #[test]
    fn save_prompt_is_confirmed() {
        let r = rig();
        r.dialog(WindowSpec::new("Convert/Compile"));
        r.dialog(stats(0, 0, 0));
        r.compiler.compile(&r.session, &r.opts()).unwrap();

        let chords: Vec<Chord> = r.desk.keystrokes().into_iter().map(|k| k.chord).collect();
        assert_eq!(chords, vec![Chord::COMPILE, Chord::CONFIRM]);
    }

    #[test]
    fn focus_refused_twice_sends_nothing() {
        let r = rig();
        r.desk.refuse_focus(2);
        let err = r.compiler.compile(&r.session, &r.opts()).unwrap_err();
        assert_eq!(err.reason, FailureReason::ForegroundUnavailable);
        assert_eq!(err.result.error_messages, vec![FOREGROUND_MESSAGE.to_string()]);
        assert!(r.desk.keystrokes().is_empty());
    }

    #[test]
    fn focus_retry_recovers() {
        let r = rig();
        r.desk.refuse_focus(1);
        r.dialog(stats(0, 0, 0));
        assert!(r.compiler.compile(&r.session, &r.opts()).is_ok());
    }

    #[test]
    fn foreign_foreground_window_is_fatal() {
        let r = rig();
        let other = r.desk.spawn_process();
        r.desk.force_foreground(r.main, other);
        let err = r.compiler.compile(&r.session, &r.opts()).unwrap_err();
        assert_eq!(err.reason, FailureReason::WrongForegroundWindow);
        assert!(r.desk.keystrokes().is_empty());
    }

    #[test]
    fn recompile_all_uses_alt_chord_and_records_pid() {
        let r = rig();
        r.dialog(stats(0, 0, 0));
        let slot = Arc::new(AtomicU32::new(0));
        let mut opts = r.opts();
        opts.recompile_all = true;
        opts.pid_slot = Some(slot.clone());

        r.compiler.compile(&r.session, &opts).unwrap();
        assert_eq!(r.desk.keystrokes()[0].chord, Chord::RECOMPILE_ALL);
        assert_eq!(slot.load(Ordering::SeqCst), r.pid);
    }

    #[test]
    fn without_pid_events_are_still_handled() {
        let r = rig();
        r.dialog(stats(0, 0, 0));
        let mut opts = r.opts();
        opts.pid = None;
        assert!(r.compiler.compile(&r.session, &opts).is_ok());
    }

    #[test]
    fn preflight_dismisses_leftover_operation_complete() {
        let r = rig();
        let leftover = r.desk.add_window(r.pid, WindowSpec::new("Operation Complete"));
        r.desk.on(Trigger::Key(Chord::COMPILE), vec![stats(0, 0, 0).after(Duration::from_millis(10))]);
        let handle = r.observe();
        let deadline = Instant::now() + Duration::from_secs(1);
        while !r.session.history().iter().any(|e| e.hwnd == leftover) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }

        let mut opts = r.opts();
        opts.skip_preflight = false;
        opts.timeout = Some(Duration::from_secs(2));
        let res = r.compiler.compile(&r.session, &opts);
        handle.stop();

        assert!(res.is_ok());
        assert!(r.desk.closed().iter().any(|(h, _)| *h == leftover));
    }

    #[test]
    fn close_confirmation_is_declined() {
        let r = rig();
        r.desk.on(Trigger::Key(Chord::COMPILE), vec![stats(0, 0, 0)]);
        r.desk.on(Trigger::Closed(MAIN_CLASS.into()), vec![WindowSpec::new("Confirmation")
            .child(ChildControl::new("Button", "&Yes"))
            .child(ChildControl::new("Button", "&no"))]);
        let handle = r.observe();

        let mut opts = r.opts();
        opts.timeout = Some(Duration::from_secs(2));
        let res = r.compiler.compile(&r.session, &opts);
        handle.stop();

        assert!(res.is_ok());
        let clicked: Vec<String> = r.desk.clicked().into_iter().map(|(_, t)| t).collect();
        assert_eq!(clicked, vec!["&no".to_string()]);
    }

    #[test]
    fn confirmation_without_button_is_closed() {
        let r = rig();
        r.desk.on(Trigger::Key(Chord::COMPILE), vec![stats(0, 0, 0)]);
        r.desk.on(Trigger::Closed(MAIN_CLASS.into()), vec![WindowSpec::new("Confirmation")]);
        let handle = r.observe();

        let mut opts = r.opts();
        opts.timeout = Some(Duration::from_secs(2));
        let res = r.compiler.compile(&r.session, &opts);
        handle.stop();

        assert!(res.is_ok());
        assert!(r.desk.clicked().is_empty());
        assert!(r.desk.closed().iter().any(|(_, label)| label == "Confirmation dialog"));
    }

    #[test]
    fn main_window_log_strategy() {
        let r = rig();
        r.desk.script(
            Trigger::Key(Chord::COMPILE),
            vec![WindowSpec::new("VisionTools Pro-e Compiling...").lasting(Duration::from_millis(30))],
            vec![
                "Boot".into(),
                "\t[ error ]: Object \"Button1\" has an invalid".into(),
                "\tjoin number.".into(),
                "----------  Failed  ---------".into(),
                "\t[ size ]: 1,024 bytes".into(),
                "0 warning(s), 1 error(s)".into(),
            ],
            false,
        );
        let handle = r.observe();

        let mut opts = r.opts();
        opts.completion = CompletionStrategy::MainWindowLog;
        opts.timeout = Some(Duration::from_secs(2));
        let err = r.compiler.compile(&r.session, &opts).unwrap_err();
        handle.stop();

        assert_eq!(err.reason, FailureReason::CompilationErrors(1));
        assert_eq!(err.result.error_messages, vec!["Object \"Button1\" has an invalid join number.".to_string()]);
        assert_eq!(err.result.size.as_deref(), Some("1,024 bytes"));
    }

    #[test]
    fn durations_read_naturally() {
        assert_eq!(human_duration(Duration::from_secs(300)), "5 minute(s)");
        assert_eq!(human_duration(Duration::from_secs(5)), "5 second(s)");
        assert_eq!(human_duration(Duration::from_millis(40)), "40 ms");
    }
}
