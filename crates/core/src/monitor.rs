use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::classify::{MainWindowPolicy, WindowRole};
use crate::logger;
use crate::platform::{ControlReader, WindowManager};
use crate::types::*;

pub const QUEUE_CAPACITY: usize = 256;
pub const HISTORY_CAPACITY: usize = 256;

/// Event queue and recent history for one monitoring session.
///
/// The observer publishes every newly seen window here. Publishing never
/// blocks: when the queue is full the event is dropped from the queue (and
/// counted) but still lands in the history ring, so `wait_for` can find it.
pub struct MonitorSession {
    tx: SyncSender<WindowEvent>,
    rx: Mutex<Receiver<WindowEvent>>,
    history: Mutex<VecDeque<WindowEvent>>,
    history_capacity: usize,
    seq: AtomicU64,
    dropped: AtomicU64,
}

impl Default for MonitorSession {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MonitorSession {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_CAPACITY, HISTORY_CAPACITY)
    }

    pub fn with_capacity(queue: usize, history: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel(queue);
        Self {
            tx,
            rx: Mutex::new(rx),
            history: Mutex::new(VecDeque::with_capacity(history)),
            history_capacity: history.max(1),
            seq: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Record a newly observed window and queue it for the consumer.
    pub fn publish(&self, hwnd: WindowId, title: String, pid: ProcessId, class: String) -> WindowEvent {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let ev = WindowEvent { hwnd, title, pid, class, seq };

        {
            let mut history = lock(&self.history);
            if history.len() >= self.history_capacity {
                history.pop_front();
            }
            history.push_back(ev.clone());
        }

        match self.tx.try_send(ev.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) | Err(TrySendError::Disconnected(ev)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                logger::warn_p(
                    "monitor",
                    &format!(
                        "event queue full, dropped \"{}\" (0x{:x}, pid {}, class {}), {} dropped so far",
                        ev.title, ev.hwnd, ev.pid, ev.class, n
                    ),
                );
            }
        }
        ev
    }

    /// Block for the next queued event, at most `timeout`.
    pub fn next_event(&self, timeout: Duration) -> Option<WindowEvent> {
        let rx = lock(&self.rx);
        match rx.recv_timeout(timeout) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discard everything currently queued.
    pub fn drain(&self) -> Vec<WindowEvent> {
        let rx = lock(&self.rx);
        rx.try_iter().collect()
    }

    /// Sequence number of the most recently published event.
    pub fn cursor(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn history(&self) -> Vec<WindowEvent> {
        lock(&self.history).iter().cloned().collect()
    }

    /// First event newer than `after_seq` accepted by `matcher`. The history
    /// ring is searched before waiting, so an event published before the call
    /// is still found. Unmatched queued events are consumed.
    pub fn wait_for<F>(&self, after_seq: u64, timeout: Duration, matcher: F) -> Option<WindowEvent>
    where
        F: Fn(&WindowEvent) -> bool,
    {
        let found = lock(&self.history)
            .iter()
            .find(|ev| ev.seq > after_seq && matcher(ev))
            .cloned();
        if found.is_some() {
            return found;
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let ev = self.next_event(remaining)?;
            if ev.seq > after_seq && matcher(&ev) {
                return Some(ev);
            }
        }
    }
}

/// Stops the observer thread when dropped.
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Signal the observer and wait for it to exit (at most one poll interval).
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(t) = self.thread.take() {
            t.join().ok();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Background poller that reports each new window of one process once.
pub struct WindowMonitor {
    session: Arc<MonitorSession>,
    windows: Arc<dyn WindowManager>,
    controls: Arc<dyn ControlReader>,
    pid: Option<ProcessId>,
    interval: Duration,
    policy: MainWindowPolicy,
}

fn detection_line(w: &WindowInfo, class: &str, role: WindowRole) -> String {
    format!(
        "window detected: \"{}\" (0x{:x}, pid {}, class {}, {:?})",
        w.title, w.hwnd, w.pid, class, role
    )
}

impl WindowMonitor {
    pub fn new(
        session: Arc<MonitorSession>,
        windows: Arc<dyn WindowManager>,
        controls: Arc<dyn ControlReader>,
        pid: Option<ProcessId>,
        interval: Duration,
    ) -> Self {
        Self { session, windows, controls, pid, interval, policy: MainWindowPolicy::default() }
    }

    /// Classify detected windows with `policy` when logging them.
    pub fn with_policy(mut self, policy: MainWindowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Spawn the polling thread. Without a pid every process's windows are reported.
    pub fn start(self) -> MonitorHandle {
        match self.pid {
            Some(pid) => logger::debug_p("monitor", &format!("window monitor tracking pid {}", pid)),
            None => logger::warn_p(
                "monitor",
                "window monitor started without a process id, reporting windows of every process",
            ),
        }

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::spawn(move || self.run(&flag));
        MonitorHandle { stop, thread: Some(thread) }
    }

    fn run(self, stop: &AtomicBool) {
        let mut seen: HashSet<WindowId> = HashSet::new();
        logger::debug_p("monitor", "window monitor started");

        while !stop.load(Ordering::Acquire) {
            self.poll(&mut seen);
            thread::sleep(self.interval);
        }
        logger::debug_p("monitor", "window monitor stopped");
    }

    fn poll(&self, seen: &mut HashSet<WindowId>) {
        for w in self.windows.enumerate_windows() {
            if self.pid.is_some_and(|pid| w.pid != pid) {
                continue;
            }
            if !seen.insert(w.hwnd) {
                continue;
            }

            let class = self.windows.class_name(w.hwnd);
            let role = self.policy.classify(&w.title, &class);
            logger::debug_p("monitor", &detection_line(&w, &class, role));
            for child in self.controls.child_controls(w.hwnd) {
                if !child.text.is_empty() {
                    logger::trace_p("monitor", &format!("  [{}] {}", child.class, child.text));
                }
            }
            self.session.publish(w.hwnd, w.title, w.pid, class);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::{StubDesktop, WindowSpec};

    fn publish(s: &MonitorSession, hwnd: WindowId, title: &str) -> WindowEvent {
        s.publish(hwnd, title.to_string(), 1, "#32770".into())
    }

    #[test]
    fn full_queue_drops_newest_and_counts() {
        let s = MonitorSession::with_capacity(2, 8);
        publish(&s, 1, "a");
        publish(&s, 2, "b");
        publish(&s, 3, "c");
        assert_eq!(s.dropped(), 1);
        let titles: Vec<String> = s.drain().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert_eq!(s.history().len(), 3);
    }

    #[test]
    fn history_evicts_oldest() {
        let s = MonitorSession::with_capacity(8, 2);
        publish(&s, 1, "a");
        publish(&s, 2, "b");
        publish(&s, 3, "c");
        let seqs: Vec<u64> = s.history().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn wait_for_finds_dropped_event_in_history() {
        let s = MonitorSession::with_capacity(1, 8);
        publish(&s, 1, "noise");
        publish(&s, 2, "Confirmation");
        let ev = s.wait_for(0, Duration::from_millis(5), |e| e.title == "Confirmation").unwrap();
        assert_eq!(ev.hwnd, 2);
    }

    #[test]
    fn wait_for_respects_cursor() {
        let s = MonitorSession::new();
        publish(&s, 1, "Confirmation");
        let cursor = s.cursor();
        assert!(s.wait_for(cursor, Duration::from_millis(10), |e| e.title == "Confirmation").is_none());
    }

    #[test]
    fn wait_for_times_out_on_silence() {
        let s = MonitorSession::new();
        let start = Instant::now();
        assert!(s.wait_for(0, Duration::from_millis(30), |_| true).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn observer_reports_each_window_once_in_order() {
        let desk = Arc::new(StubDesktop::new());
        let pid = desk.spawn_process();
        let other = desk.spawn_process();
        desk.add_window(pid, WindowSpec::new("first"));
        desk.add_window(other, WindowSpec::new("foreign"));
        desk.add_window(pid, WindowSpec::new("second").after(Duration::from_millis(20)));

        let session = Arc::new(MonitorSession::new());
        let handle = WindowMonitor::new(session.clone(), desk.clone(), desk.clone(), Some(pid), Duration::from_millis(2))
            .start();
        let second = session.wait_for(0, Duration::from_secs(2), |e| e.title == "second");
        handle.stop();

        assert!(second.is_some());
        let titles: Vec<String> = session.history().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[test]
    fn untitled_windows_are_reported() {
        let desk = Arc::new(StubDesktop::new());
        let pid = desk.spawn_process();
        let hwnd = desk.add_window(pid, WindowSpec::new("").class("VWT32AppClass"));

        let session = Arc::new(MonitorSession::new());
        let handle = WindowMonitor::new(session.clone(), desk.clone(), desk.clone(), Some(pid), Duration::from_millis(2))
            .start();
        let ev = session.wait_for(0, Duration::from_secs(2), |e| e.hwnd == hwnd);
        handle.stop();

        let ev = ev.unwrap();
        assert!(ev.title.is_empty());
        assert_eq!(ev.class, "VWT32AppClass");
    }

    #[test]
    fn detection_line_names_the_role() {
        let w = WindowInfo { hwnd: 0x120, title: "VTPro".into(), pid: 7 };
        let policy = MainWindowPolicy::default();
        let line = detection_line(&w, "Splash", policy.classify(&w.title, "Splash"));
        assert_eq!(line, "window detected: \"VTPro\" (0x120, pid 7, class Splash, Splash)");

        let custom = MainWindowPolicy { main_class: "Splash".into(), ..Default::default() };
        let line = detection_line(&w, "Splash", custom.classify(&w.title, "Splash"));
        assert!(line.ends_with("class Splash, Main)"));
    }

    #[test]
    fn degraded_mode_reports_all_processes() {
        let desk = Arc::new(StubDesktop::new());
        let a = desk.spawn_process();
        let b = desk.spawn_process();
        desk.add_window(a, WindowSpec::new("a"));
        desk.add_window(b, WindowSpec::new("b"));

        let session = Arc::new(MonitorSession::new());
        let handle = WindowMonitor::new(session.clone(), desk.clone(), desk.clone(), None, Duration::from_millis(2)).start();
        let b_seen = session.wait_for(0, Duration::from_secs(2), |e| e.title == "b");
        handle.stop();
        assert!(b_seen.is_some());
    }
}
