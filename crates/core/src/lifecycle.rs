use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::classify::{find_main_window, MainWindowPolicy};
use crate::dialogs::DialogKind;
use crate::logger;
use crate::monitor::{MonitorHandle, MonitorSession, WindowMonitor};
use crate::platform::Deps;
use crate::settings::Timeouts;
use crate::sleep::{settle, settle_until};
use crate::types::*;

/// Post-load dialogs handled before giving up.
const MAX_POST_LOAD_DIALOGS: usize = 5;
/// Responsiveness probes after the first success, and how many must pass.
const STABILITY_PROBES: usize = 3;
const STABILITY_REQUIRED: usize = 2;
const PROGRESS_TOKEN: &str = "Progress";

/// Starts, watches and tears down the target application.
pub struct Lifecycle {
    deps: Deps,
    timeouts: Timeouts,
    policy: MainWindowPolicy,
}

impl Lifecycle {
    pub fn new(deps: Deps, timeouts: Timeouts) -> Self {
        Self { deps, timeouts, policy: MainWindowPolicy::default() }
    }

    pub fn with_policy(mut self, policy: MainWindowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start the application on `file`. The returned pid is authoritative.
    pub fn launch(&self, exe: &Path, file: &Path) -> Result<ProcessId> {
        logger::debug_p("lifecycle", &format!("launching {} {}", exe.display(), file.display()));
        let pid = self.deps.processes.launch(exe, file)?;
        logger::info_p("lifecycle", &format!("started pid {}", pid));
        Ok(pid)
    }

    /// Spawn the window observer for a fresh session.
    pub fn start_monitoring(&self, session: Arc<MonitorSession>, pid: Option<ProcessId>) -> MonitorHandle {
        WindowMonitor::new(
            session,
            self.deps.windows.clone(),
            self.deps.controls.clone(),
            pid,
            self.timeouts.monitor_poll,
        )
        .with_policy(self.policy.clone())
        .start()
    }

    /// Poll for the main window of `pid`. One last check runs at the deadline.
    pub fn wait_for_appear(&self, pid: ProcessId, timeout: Duration) -> Option<WindowId> {
        let deadline = Instant::now() + timeout;
        let mut splash_logged = false;
        logger::debug_p("lifecycle", &format!("searching for main window of pid {}", pid));

        while Instant::now() < deadline {
            let search = find_main_window(self.deps.windows.as_ref(), pid, &self.policy);
            if let Some(w) = search.main {
                logger::debug_p("lifecycle", &format!("found main window \"{}\"", w.title));
                return Some(w.hwnd);
            }
            if search.splash_seen && !splash_logged {
                logger::debug_p("lifecycle", "splash screen up, waiting for main window");
                splash_logged = true;
            }
            settle_until(self.timeouts.state_poll, deadline);
        }

        logger::debug_p("lifecycle", "appear timeout reached, final check");
        find_main_window(self.deps.windows.as_ref(), pid, &self.policy)
            .main
            .map(|w| w.hwnd)
    }

    /// Wait until `hwnd` answers probes consistently, not just once.
    pub fn wait_for_ready(&self, hwnd: WindowId, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let windows = &self.deps.windows;
        let probe = self.timeouts.responsive_probe;

        while Instant::now() < deadline {
            if windows.is_responsive(hwnd, probe) {
                let mut ok = 0;
                for _ in 0..STABILITY_PROBES {
                    settle(self.timeouts.stability_check);
                    if windows.is_responsive(hwnd, probe) {
                        ok += 1;
                    }
                }
                if ok >= STABILITY_REQUIRED {
                    logger::debug_p("lifecycle", "window is stable and ready");
                    return true;
                }
            }
            settle_until(self.timeouts.state_poll, deadline);
        }
        logger::debug_p("lifecycle", "timed out waiting for window to become ready");
        false
    }

    /// Watch the load and progress dialogs until they have been quiet for a while.
    /// If no load dialog ever shows the file was small or cached, and the
    /// timeout counts as success.
    pub fn wait_for_file_loaded(&self, session: &MonitorSession, pid: Option<ProcessId>, timeout: Duration) -> bool {
        if pid.is_none() {
            logger::warn_p("lifecycle", "no process id for file load monitoring");
            return false;
        }

        let deadline = Instant::now() + timeout;
        let mut seen_loading = false;
        let mut seen_progress = false;
        let mut last_seen = Instant::now();
        logger::info("Waiting for file to fully load...");

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = self.timeouts.state_poll.min(deadline - now);
            match session.next_event(wait) {
                Some(ev) => {
                    if DialogKind::from_title(&ev.title) == Some(DialogKind::FileLoading) {
                        if !seen_loading {
                            logger::debug_p("lifecycle", &format!("file loading dialog \"{}\"", ev.title));
                            seen_loading = true;
                        }
                        last_seen = Instant::now();
                    }
                    if ev.title.contains(PROGRESS_TOKEN) {
                        if !seen_progress {
                            logger::debug_p("lifecycle", &format!("progress dialog \"{}\"", ev.title));
                            seen_progress = true;
                        }
                        last_seen = Instant::now();
                    }
                }
                None => {
                    if seen_loading && last_seen.elapsed() > self.timeouts.load_quiet {
                        logger::debug_p("lifecycle", "loading dialogs have gone quiet");
                        settle(self.timeouts.stability_check);
                        logger::info("File loading complete");
                        return true;
                    }
                }
            }
        }

        if !seen_loading {
            logger::debug_p("lifecycle", "no loading dialog seen, file is likely small or cached");
            return true;
        }
        logger::warn_p("lifecycle", "timed out waiting for file loading to complete");
        false
    }

    /// Close the warning dialog that can follow a load. Every dialog seen is
    /// traced with its controls. Returns how many dialogs arrived.
    pub fn handle_post_load_dialogs(&self, session: &MonitorSession) -> usize {
        // The load wait consumes the queue, so a warning may only be in the history
        let mut handled = HashSet::new();
        for ev in session.history() {
            if DialogKind::from_title(&ev.title) == Some(DialogKind::PostLoadWarning)
                && self.deps.windows.is_window(ev.hwnd)
            {
                self.close_post_load_warning(&ev);
                handled.insert(ev.hwnd);
            }
        }

        let deadline = Instant::now() + self.timeouts.post_load;
        let mut count = 0;

        while count < MAX_POST_LOAD_DIALOGS {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(ev) = session.next_event(remaining) else {
                logger::debug_p("lifecycle", &format!("post-load check done, {} dialog(s)", count));
                return count;
            };
            count += 1;

            logger::trace_p("lifecycle", &format!("post-load dialog \"{}\" (0x{:x})", ev.title, ev.hwnd));
            for c in self.deps.controls.child_controls(ev.hwnd) {
                logger::trace_p("lifecycle", &format!("  [{}] 0x{:x} \"{}\"", c.class, c.hwnd, c.text));
            }

            if handled.contains(&ev.hwnd) {
                continue;
            }
            if DialogKind::from_title(&ev.title) == Some(DialogKind::PostLoadWarning) {
                self.close_post_load_warning(&ev);
                handled.insert(ev.hwnd);
            } else {
                logger::trace_p("lifecycle", &format!("ignoring post-load dialog \"{}\"", ev.title));
            }
        }

        logger::warn_p(
            "lifecycle",
            &format!("stopped checking post-load dialogs after {}", MAX_POST_LOAD_DIALOGS),
        );
        count
    }

    fn close_post_load_warning(&self, ev: &WindowEvent) {
        logger::info("Handling post-load warning dialog");
        self.deps.windows.close_window(ev.hwnd, &ev.title);
        settle(self.timeouts.window_message);
    }

    /// Close the main window, falling back to terminating the process if it lingers.
    pub fn cleanup(&self, hwnd: WindowId, pid: Option<ProcessId>) {
        let windows = &self.deps.windows;
        if hwnd == 0 || !windows.is_window(hwnd) {
            return;
        }
        logger::debug_p("lifecycle", "cleaning up");
        windows.close_window(hwnd, "VTPro");

        let deadline = Instant::now() + self.timeouts.close_wait;
        while Instant::now() < deadline {
            if !windows.is_window(hwnd) {
                logger::debug_p("lifecycle", "window closed");
                return;
            }
            settle_until(self.timeouts.state_poll, deadline);
        }
        if !windows.is_window(hwnd) {
            return;
        }

        logger::warn_p("lifecycle", "application did not close, terminating");
        if let Some(pid) = pid {
            if let Err(e) = self.deps.processes.terminate(pid) {
                logger::warn_p("lifecycle", &format!("terminate failed: {:#}", e));
            }
        }
    }

    /// Cleanup for interrupt handlers: graceful when a window is known,
    /// otherwise straight to termination.
    pub fn force_cleanup(&self, hwnd: Option<WindowId>, pid: Option<ProcessId>) {
        match (hwnd, pid) {
            (Some(hwnd), _) => self.cleanup(hwnd, pid),
            (None, Some(pid)) => {
                logger::debug_p("lifecycle", &format!("terminating pid {}", pid));
                if let Err(e) = self.deps.processes.terminate(pid) {
                    logger::warn_p("lifecycle", &format!("terminate failed: {:#}", e));
                }
            }
            (None, None) => logger::warn_p("lifecycle", "nothing to clean up: no window or process id"),
        }
    }
}
