pub mod stub;

#[cfg(target_os = "windows")]
pub mod win32;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::logger;
use crate::types::*;

/// Top-level window operations.
pub trait WindowManager: Send + Sync {
    /// Visible top-level windows, in z-order.
    fn enumerate_windows(&self) -> Vec<WindowInfo>;
    fn class_name(&self, hwnd: WindowId) -> String;
    fn is_window(&self, hwnd: WindowId) -> bool;
    /// Post a close request; does not wait for the window to go away.
    fn close_window(&self, hwnd: WindowId, label: &str);
    /// Restore and focus `hwnd`. True once the window is confirmed in front.
    fn set_foreground(&self, hwnd: WindowId) -> bool;
    /// Current foreground window and its owning process.
    fn foreground_window(&self) -> Option<(WindowId, ProcessId)>;
    /// Send a no-op message; false if it is not processed within `timeout`.
    fn is_responsive(&self, hwnd: WindowId, timeout: Duration) -> bool;
    fn is_elevated(&self) -> bool;
}

/// Child-control access.
pub trait ControlReader: Send + Sync {
    fn child_controls(&self, hwnd: WindowId) -> Vec<ChildControl>;
    /// Notify `parent` that `button` was clicked.
    fn click_button(&self, parent: WindowId, button: &ChildControl) -> bool;
}

/// Keystroke synthesis, one method per delivery strategy.
pub trait KeyboardInjector: Send + Sync {
    /// Queue the whole chord atomically. False if the OS rejected any event.
    fn send_input(&self, chord: Chord, key_delay: Duration) -> bool;
    /// Legacy per-key synthesis. No failure reporting.
    fn send_key_events(&self, chord: Chord, key_delay: Duration);
    /// Deliver key messages to one window regardless of focus.
    fn post_to_window(&self, hwnd: WindowId, chord: Chord, key_delay: Duration) -> bool;
}

pub trait ProcessManager: Send + Sync {
    /// Start `exe` with `file` as its argument and return the new process id.
    fn launch(&self, exe: &Path, file: &Path) -> Result<ProcessId>;
    fn terminate(&self, pid: ProcessId) -> Result<()>;
}

/// Every capability a real desktop provides.
pub trait Platform: WindowManager + ControlReader + KeyboardInjector + ProcessManager {}

impl<T> Platform for T where T: WindowManager + ControlReader + KeyboardInjector + ProcessManager {}

/// Per-role handles shared by the lifecycle manager, observer and orchestrator.
#[derive(Clone)]
pub struct Deps {
    pub windows: Arc<dyn WindowManager>,
    pub controls: Arc<dyn ControlReader>,
    pub keyboard: Arc<dyn KeyboardInjector>,
    pub processes: Arc<dyn ProcessManager>,
}

impl Deps {
    pub fn from_platform<P: Platform + 'static>(platform: Arc<P>) -> Self {
        Self {
            windows: platform.clone(),
            controls: platform.clone(),
            keyboard: platform.clone(),
            processes: platform,
        }
    }
}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool) -> Deps {
    logger::register_prefix("monitor", logger::COLOR_GRAY);
    logger::register_prefix("lifecycle", logger::COLOR_GRAY);
    logger::register_prefix("compile", logger::COLOR_BLUE);
    logger::register_prefix("input", logger::COLOR_GRAY);
    if force_stub {
        logger::register_prefix("stub", logger::COLOR_YELLOW);
        return Deps::from_platform(Arc::new(stub::StubDesktop::simulated_app()));
    }
    #[cfg(target_os = "windows")]
    {
        logger::register_prefix("win32", logger::COLOR_GRAY);
        Deps::from_platform(Arc::new(win32::Win32Platform::new()))
    }
    #[cfg(not(target_os = "windows"))]
    {
        logger::warn("no native window system support on this OS, using the simulated desktop");
        logger::register_prefix("stub", logger::COLOR_YELLOW);
        Deps::from_platform(Arc::new(stub::StubDesktop::simulated_app()))
    }
}
