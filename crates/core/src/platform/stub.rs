use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};

use crate::classify::MAIN_CLASS;
use crate::logger;
use crate::types::*;
use super::{ControlReader, KeyboardInjector, ProcessManager, WindowManager};

/// Description of a window the stub desktop will create.
#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub title: String,
    pub class: String,
    pub children: Vec<ChildControl>,
    /// Delay between the trigger and the window becoming visible
    pub delay: Duration,
    /// Window disappears this long after it appears
    pub lifetime: Option<Duration>,
    /// Window ignores probes for this long after it appears
    pub busy_for: Duration,
    /// Window ignores close requests
    pub sticky: bool,
    /// Owning process; defaults to the process that triggered the reaction
    pub pid: Option<ProcessId>,
}

impl WindowSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            class: "#32770".into(),
            children: Vec::new(),
            delay: Duration::ZERO,
            lifetime: None,
            busy_for: Duration::ZERO,
            sticky: false,
            pid: None,
        }
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    pub fn child(mut self, child: ChildControl) -> Self {
        self.children.push(child);
        self
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn lasting(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn busy_for(mut self, d: Duration) -> Self {
        self.busy_for = d;
        self
    }

    pub fn sticky(mut self) -> Self {
        self.sticky = true;
        self
    }

    pub fn owned_by(mut self, pid: ProcessId) -> Self {
        self.pid = Some(pid);
        self
    }
}

/// What makes a scripted reaction fire.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Launch,
    Key(Chord),
    /// A window whose title or class equals this string was closed
    Closed(String),
}

#[derive(Debug, Clone)]
struct Reaction {
    trigger: Trigger,
    spawn: Vec<WindowSpec>,
    /// Lines appended to the list control of the trigger's main window
    log_lines: Vec<String>,
    once: bool,
    fired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    SendInput,
    KeyEvents,
    Message,
}

/// A keystroke as the stub desktop received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentKeys {
    pub chord: Chord,
    pub via: Delivery,
    /// Window the keys were addressed to, or the foreground window
    pub target: Option<WindowId>,
}

#[derive(Debug, Clone)]
struct StubWindow {
    hwnd: WindowId,
    pid: ProcessId,
    title: String,
    class: String,
    children: Vec<ChildControl>,
    appear_at: Instant,
    vanish_at: Option<Instant>,
    responsive_at: Instant,
    sticky: bool,
    closed: bool,
}

impl StubWindow {
    fn exists(&self, now: Instant) -> bool {
        !self.closed && self.appear_at <= now && self.vanish_at.map_or(true, |v| now < v)
    }
}

#[derive(Debug)]
struct DesktopState {
    next_hwnd: WindowId,
    next_pid: ProcessId,
    windows: Vec<StubWindow>,
    processes: Vec<ProcessId>,
    foreground: Option<WindowId>,
    foreground_override: Option<(WindowId, ProcessId)>,
    reactions: Vec<Reaction>,
    keystrokes: Vec<SentKeys>,
    closed: Vec<(WindowId, String)>,
    clicked: Vec<(WindowId, String)>,
    terminated: Vec<ProcessId>,
    launched: Vec<String>,
    send_input_fails: bool,
    focus_refusals: u32,
    elevated: bool,
}

/// In-memory desktop: scripted windows, processes and keystroke reactions.
pub struct StubDesktop {
    state: Mutex<DesktopState>,
}

impl Default for StubDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl StubDesktop {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DesktopState {
                next_hwnd: 0x1000,
                next_pid: 4000,
                windows: Vec::new(),
                processes: Vec::new(),
                foreground: None,
                foreground_override: None,
                reactions: Vec::new(),
                keystrokes: Vec::new(),
                closed: Vec::new(),
                clicked: Vec::new(),
                terminated: Vec::new(),
                launched: Vec::new(),
                send_input_fails: false,
                focus_refusals: 0,
                elevated: true,
            }),
        }
    }

    /// A desktop that behaves like the target application: splash then main
    /// window on launch, the compile dialog sequence on F12 / Alt+F12, and a
    /// save confirmation when the main window is closed.
    pub fn simulated_app() -> Self {
        let desk = Self::new();
        let ms = Duration::from_millis;

        desk.on(Trigger::Launch, vec![
            WindowSpec::new("VTPro").lasting(ms(40)),
            WindowSpec::new("VisionTools Pro-e - [{file}]")
                .class(MAIN_CLASS)
                .child(ChildControl::list("ListBox", Vec::new()))
                .after(ms(30))
                .busy_for(ms(20)),
        ]);

        let log = vec![
            "---------- Compiling for TSW-770: [{file}] ---------".to_string(),
            "Boot".to_string(),
            "Main".to_string(),
            "\t[ warning ]: Object \"Video1\" on Page \"Main\" has an unassigned Smart Object ID.".to_string(),
            "----------  Successful  ---------".to_string(),
            "\t[ size ]: 18,588,092 bytes".to_string(),
            "\t[ project size ]: 512 Kb".to_string(),
            "1 warning(s), 0 error(s)".to_string(),
        ];
        let compile_dialogs = vec![
            WindowSpec::new("Compiling...").after(ms(10)).lasting(ms(60)),
            WindowSpec::new("Compile Complete")
                .child(ChildControl::new("Static", "Program Warnings: 1\r\nProgram Notices: 0\r\nProgram Errors: 0"))
                .child(ChildControl::new("Static", "Compile Time: 0.42 seconds"))
                .after(ms(80)),
            WindowSpec::new("Program Compilation")
                .child(ChildControl::list("ListBox", vec![
                    "WARNING (LGSPLS1001) Object \"Video1\" on Page \"Main\"".to_string(),
                    "has an unassigned Smart Object ID.".to_string(),
                ]))
                .after(ms(90)),
        ];
        for chord in [Chord::COMPILE, Chord::RECOMPILE_ALL] {
            desk.script(Trigger::Key(chord), compile_dialogs.clone(), log.clone(), false);
        }

        desk.on(Trigger::Closed(MAIN_CLASS.into()), vec![
            WindowSpec::new("Confirmation")
                .child(ChildControl::new("Button", "&Yes"))
                .child(ChildControl::new("Button", "&No")),
        ]);
        desk
    }

    fn lock(&self) -> MutexGuard<'_, DesktopState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a reaction that fires every time `trigger` happens.
    pub fn on(&self, trigger: Trigger, spawn: Vec<WindowSpec>) {
        self.script(trigger, spawn, Vec::new(), false);
    }

    /// Register a reaction that fires only the first time.
    pub fn once(&self, trigger: Trigger, spawn: Vec<WindowSpec>) {
        self.script(trigger, spawn, Vec::new(), true);
    }

    /// Register a reaction that also appends lines to the main window's log list.
    pub fn script(&self, trigger: Trigger, spawn: Vec<WindowSpec>, log_lines: Vec<String>, once: bool) {
        self.lock().reactions.push(Reaction { trigger, spawn, log_lines, once, fired: false });
    }

    /// Register a live process without launching anything.
    pub fn spawn_process(&self) -> ProcessId {
        let mut st = self.lock();
        let pid = st.next_pid;
        st.next_pid += 1;
        st.processes.push(pid);
        pid
    }

    /// Create a window now (subject to the spec's delay).
    pub fn add_window(&self, pid: ProcessId, spec: WindowSpec) -> WindowId {
        let mut st = self.lock();
        create_window(&mut st, pid, spec, Instant::now())
    }

    pub fn set_send_input_fails(&self, fails: bool) {
        self.lock().send_input_fails = fails;
    }

    /// The next `n` focus requests fail.
    pub fn refuse_focus(&self, n: u32) {
        self.lock().focus_refusals = n;
    }

    /// Report this window as foreground regardless of focus requests.
    pub fn force_foreground(&self, hwnd: WindowId, pid: ProcessId) {
        self.lock().foreground_override = Some((hwnd, pid));
    }

    pub fn set_elevated(&self, elevated: bool) {
        self.lock().elevated = elevated;
    }

    pub fn keystrokes(&self) -> Vec<SentKeys> {
        self.lock().keystrokes.clone()
    }

    pub fn closed(&self) -> Vec<(WindowId, String)> {
        self.lock().closed.clone()
    }

    pub fn clicked(&self) -> Vec<(WindowId, String)> {
        self.lock().clicked.clone()
    }

    pub fn terminated(&self) -> Vec<ProcessId> {
        self.lock().terminated.clone()
    }

    pub fn launched(&self) -> Vec<String> {
        self.lock().launched.clone()
    }

    /// Handle of the first live window with this title.
    pub fn find(&self, title: &str) -> Option<WindowId> {
        let now = Instant::now();
        self.lock()
            .windows
            .iter()
            .find(|w| w.title == title && w.exists(now))
            .map(|w| w.hwnd)
    }

    fn deliver(&self, st: &mut DesktopState, chord: Chord, via: Delivery, target: Option<WindowId>) {
        let target = target.or(st.foreground);
        st.keystrokes.push(SentKeys { chord, via, target });
        let pid = target
            .and_then(|h| st.windows.iter().find(|w| w.hwnd == h).map(|w| w.pid))
            .or_else(|| st.processes.last().copied());
        if let Some(pid) = pid {
            fire(st, &Trigger::Key(chord), pid, "");
        }
    }
}

fn create_window(st: &mut DesktopState, pid: ProcessId, spec: WindowSpec, now: Instant) -> WindowId {
    let hwnd = st.next_hwnd;
    st.next_hwnd += 0x10;
    let appear_at = now + spec.delay;
    st.windows.push(StubWindow {
        hwnd,
        pid: spec.pid.unwrap_or(pid),
        title: spec.title,
        class: spec.class,
        children: spec.children,
        appear_at,
        vanish_at: spec.lifetime.map(|l| appear_at + l),
        responsive_at: appear_at + spec.busy_for,
        sticky: spec.sticky,
        closed: false,
    });
    hwnd
}

fn fire(st: &mut DesktopState, trigger: &Trigger, pid: ProcessId, file: &str) {
    let now = Instant::now();
    let mut spawned = Vec::new();
    let mut lines = Vec::new();
    for r in st.reactions.iter_mut() {
        if r.trigger != *trigger || (r.once && r.fired) {
            continue;
        }
        r.fired = true;
        spawned.extend(r.spawn.iter().cloned());
        lines.extend(r.log_lines.iter().cloned());
    }

    let file = if file.is_empty() {
        st.launched.last().cloned().unwrap_or_default()
    } else {
        file.to_string()
    };

    for mut spec in spawned {
        spec.title = spec.title.replace("{file}", &file);
        let hwnd = create_window(st, pid, spec, now);
        logger::debug_p("stub", &format!("scheduled window 0x{:x} for pid {}", hwnd, pid));
    }

    if lines.is_empty() {
        return;
    }
    if let Some(main) = st
        .windows
        .iter_mut()
        .find(|w| w.pid == pid && w.class == MAIN_CLASS && w.exists(now))
    {
        if let Some(list) = main.children.iter_mut().find(|c| c.class == "ListBox") {
            list.items.extend(lines.into_iter().map(|l| l.replace("{file}", &file)));
            list.text = list.items.join("\n");
        }
    }
}

impl WindowManager for StubDesktop {
    fn enumerate_windows(&self) -> Vec<WindowInfo> {
        let now = Instant::now();
        self.lock()
            .windows
            .iter()
            .filter(|w| w.exists(now))
            .map(|w| WindowInfo { hwnd: w.hwnd, title: w.title.clone(), pid: w.pid })
            .collect()
    }

    fn class_name(&self, hwnd: WindowId) -> String {
        self.lock()
            .windows
            .iter()
            .find(|w| w.hwnd == hwnd)
            .map(|w| w.class.clone())
            .unwrap_or_default()
    }

    fn is_window(&self, hwnd: WindowId) -> bool {
        let now = Instant::now();
        self.lock().windows.iter().any(|w| w.hwnd == hwnd && w.exists(now))
    }

    fn close_window(&self, hwnd: WindowId, label: &str) {
        logger::debug_p("stub", &format!("close_window(0x{:x}, \"{}\")", hwnd, label));
        let now = Instant::now();
        let mut st = self.lock();
        st.closed.push((hwnd, label.to_string()));
        let Some(w) = st.windows.iter_mut().find(|w| w.hwnd == hwnd && w.exists(now)) else {
            return;
        };
        if w.sticky {
            return;
        }
        w.closed = true;
        let (pid, title, class) = (w.pid, w.title.clone(), w.class.clone());
        if st.foreground == Some(hwnd) {
            st.foreground = None;
        }
        fire(&mut st, &Trigger::Closed(title), pid, "");
        fire(&mut st, &Trigger::Closed(class), pid, "");
    }

    fn set_foreground(&self, hwnd: WindowId) -> bool {
        let mut st = self.lock();
        if st.focus_refusals > 0 {
            st.focus_refusals -= 1;
            logger::debug_p("stub", &format!("set_foreground(0x{:x}) refused", hwnd));
            return false;
        }
        let now = Instant::now();
        if !st.windows.iter().any(|w| w.hwnd == hwnd && w.exists(now)) {
            return false;
        }
        st.foreground = Some(hwnd);
        true
    }

    fn foreground_window(&self) -> Option<(WindowId, ProcessId)> {
        let st = self.lock();
        if let Some(fg) = st.foreground_override {
            return Some(fg);
        }
        let hwnd = st.foreground?;
        st.windows.iter().find(|w| w.hwnd == hwnd).map(|w| (w.hwnd, w.pid))
    }

    fn is_responsive(&self, hwnd: WindowId, _timeout: Duration) -> bool {
        let now = Instant::now();
        self.lock()
            .windows
            .iter()
            .any(|w| w.hwnd == hwnd && w.exists(now) && w.responsive_at <= now)
    }

    fn is_elevated(&self) -> bool {
        self.lock().elevated
    }
}

impl ControlReader for StubDesktop {
    fn child_controls(&self, hwnd: WindowId) -> Vec<ChildControl> {
        let now = Instant::now();
        self.lock()
            .windows
            .iter()
            .find(|w| w.hwnd == hwnd && w.exists(now))
            .map(|w| w.children.clone())
            .unwrap_or_default()
    }

    fn click_button(&self, parent: WindowId, button: &ChildControl) -> bool {
        logger::debug_p("stub", &format!("click_button(0x{:x}, \"{}\")", parent, button.text));
        let now = Instant::now();
        let mut st = self.lock();
        let Some(w) = st.windows.iter_mut().find(|w| w.hwnd == parent && w.exists(now)) else {
            return false;
        };
        w.closed = true;
        st.clicked.push((parent, button.text.clone()));
        true
    }
}

impl KeyboardInjector for StubDesktop {
    fn send_input(&self, chord: Chord, _key_delay: Duration) -> bool {
        let mut st = self.lock();
        if st.send_input_fails {
            logger::debug_p("stub", &format!("send_input({}) rejected", chord));
            return false;
        }
        self.deliver(&mut st, chord, Delivery::SendInput, None);
        true
    }

    fn send_key_events(&self, chord: Chord, _key_delay: Duration) {
        let mut st = self.lock();
        self.deliver(&mut st, chord, Delivery::KeyEvents, None);
    }

    fn post_to_window(&self, hwnd: WindowId, chord: Chord, _key_delay: Duration) -> bool {
        let mut st = self.lock();
        let now = Instant::now();
        if !st.windows.iter().any(|w| w.hwnd == hwnd && w.exists(now)) {
            return false;
        }
        self.deliver(&mut st, chord, Delivery::Message, Some(hwnd));
        true
    }
}

impl ProcessManager for StubDesktop {
    fn launch(&self, exe: &Path, file: &Path) -> Result<ProcessId> {
        logger::info_p("stub", &format!("launch(\"{}\", \"{}\")", exe.display(), file.display()));
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut st = self.lock();
        let pid = st.next_pid;
        st.next_pid += 1;
        st.processes.push(pid);
        st.launched.push(name.clone());
        fire(&mut st, &Trigger::Launch, pid, &name);
        Ok(pid)
    }

    fn terminate(&self, pid: ProcessId) -> Result<()> {
        logger::info_p("stub", &format!("terminate({})", pid));
        let mut st = self.lock();
        if !st.processes.contains(&pid) {
            bail!("no such process: {}", pid);
        }
        st.processes.retain(|p| *p != pid);
        for w in st.windows.iter_mut().filter(|w| w.pid == pid) {
            w.closed = true;
        }
        st.terminated.push(pid);
        Ok(())
    }
}
