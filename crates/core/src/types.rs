use std::path::PathBuf;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Window identifier (HWND on Windows, synthetic id on the stub desktop)
pub type WindowId = u64;

/// Operating-system process id
pub type ProcessId = u32;

/// Point-in-time view of a visible top-level window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub hwnd: WindowId,
    pub title: String,
    pub pid: ProcessId,
}

/// A newly observed top-level window, reported once per monitoring session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEvent {
    pub hwnd: WindowId,
    pub title: String,
    pub pid: ProcessId,
    pub class: String,
    /// Emission order within the session, starting at 1
    pub seq: u64,
}

/// A child control of some window, read on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildControl {
    pub hwnd: WindowId,
    pub class: String,
    pub text: String,
    /// Items of list-style controls, in display order
    pub items: Vec<String>,
}

impl ChildControl {
    pub fn new(class: impl Into<String>, text: impl Into<String>) -> Self {
        Self { class: class.into(), text: text.into(), ..Default::default() }
    }

    /// A list-style control; `text` is the newline-joined items.
    pub fn list(class: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            class: class.into(),
            text: items.join("\n"),
            items,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    F12,
    Alt,
    Enter,
}

/// A key pressed while an optional modifier is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    pub modifier: Option<Key>,
    pub key: Key,
}

impl Chord {
    pub const COMPILE: Chord = Chord { modifier: None, key: Key::F12 };
    pub const RECOMPILE_ALL: Chord = Chord { modifier: Some(Key::Alt), key: Key::F12 };
    pub const CONFIRM: Chord = Chord { modifier: None, key: Key::Enter };
}

impl std::fmt::Display for Chord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.modifier {
            Some(m) => write!(f, "{:?}+{:?}", m, self.key),
            None => write!(f, "{:?}", self.key),
        }
    }
}

/// How the orchestrator decides that compilation has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStrategy {
    /// Wait for the statistics dialog, then read the detail dialog's list.
    #[default]
    StatisticsDialog,
    /// Wait for the compiling dialog to disappear, then read the main window's log.
    MainWindowLog,
}

/// Caller-constructed input to one compile run.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub file_path: PathBuf,
    pub recompile_all: bool,
    /// Main application window
    pub hwnd: WindowId,
    /// Process id from launch. Never rediscovered by window search.
    pub pid: Option<ProcessId>,
    /// Receives the pid for cleanup handlers
    pub pid_slot: Option<Arc<AtomicU32>>,
    /// Skip draining dialogs that were open before the trigger
    pub skip_preflight: bool,
    /// Overrides the overall compile deadline
    pub timeout: Option<Duration>,
    pub completion: CompletionStrategy,
}

/// Structured outcome of a compile run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompileResult {
    pub warnings: u32,
    pub errors: u32,
    pub notices: u32,
    /// Seconds, as reported by the application
    pub compile_time: Option<f64>,
    pub error_messages: Vec<String>,
    pub warning_messages: Vec<String>,
    pub notice_messages: Vec<String>,
    pub has_errors: bool,
    pub size: Option<String>,
    pub project_size: Option<String>,
}

impl CompileResult {
    /// One-error result used for fatal conditions and timeouts.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            errors: 1,
            has_errors: true,
            error_messages: vec![message.into()],
            ..Default::default()
        }
    }

    pub fn update_has_errors(&mut self) {
        self.has_errors = self.errors > 0 || !self.error_messages.is_empty();
    }
}
