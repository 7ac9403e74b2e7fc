use crate::logger;
use crate::platform::WindowManager;
use crate::types::*;

pub const MAIN_CLASS: &str = "VWT32AppClass";
pub const DIALOG_CLASS: &str = "#32770";
pub const SPLASH_TITLE: &str = "VTPro";

/// How a top-level window of the tracked process is treated when looking for
/// the main window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRole {
    Main,
    Splash,
    /// Progress indicators and common dialogs
    Transient,
    Other,
}

#[derive(Debug, Clone)]
pub struct MainWindowPolicy {
    /// Title fragment that only appears once a project file is open
    pub file_token: String,
    pub main_class: String,
    pub splash_title: String,
    /// Lowercase title fragment of progress windows
    pub progress_token: String,
    pub dialog_class: String,
}

impl Default for MainWindowPolicy {
    fn default() -> Self {
        Self {
            file_token: ".vtp".into(),
            main_class: MAIN_CLASS.into(),
            splash_title: SPLASH_TITLE.into(),
            progress_token: "progress".into(),
            dialog_class: DIALOG_CLASS.into(),
        }
    }
}

impl MainWindowPolicy {
    /// Checks run in priority order: file token, main class, progress, splash, dialog class.
    pub fn classify(&self, title: &str, class: &str) -> WindowRole {
        if title.contains(&self.file_token) || class == self.main_class {
            WindowRole::Main
        } else if title.to_lowercase().contains(&self.progress_token) {
            WindowRole::Transient
        } else if title == self.splash_title {
            WindowRole::Splash
        } else if class == self.dialog_class {
            WindowRole::Transient
        } else {
            WindowRole::Other
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MainWindowSearch {
    pub main: Option<WindowInfo>,
    /// The generic splash window was present
    pub splash_seen: bool,
}

/// Look for the main window among the visible windows of `pid`.
pub fn find_main_window(windows: &dyn WindowManager, pid: ProcessId, policy: &MainWindowPolicy) -> MainWindowSearch {
    let mut search = MainWindowSearch::default();
    if pid == 0 {
        logger::debug_p("lifecycle", "no process id for main window search");
        return search;
    }

    for w in windows.enumerate_windows().into_iter().filter(|w| w.pid == pid) {
        let class = windows.class_name(w.hwnd);
        match policy.classify(&w.title, &class) {
            WindowRole::Main => {
                search.main = Some(w);
                break;
            }
            WindowRole::Splash => search.splash_seen = true,
            WindowRole::Transient | WindowRole::Other => {}
        }
    }
    search
}
