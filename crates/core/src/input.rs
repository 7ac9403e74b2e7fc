use std::sync::Arc;
use std::time::Duration;

use crate::logger;
use crate::platform::KeyboardInjector;
use crate::types::*;

/// Which delivery path carried a keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStrategy {
    SendInput,
    KeyEvents,
}

/// Sends trigger and confirmation keystrokes. Atomic input synthesis is tried
/// first; legacy key events are used only when the OS reports a failure.
#[derive(Clone)]
pub struct Injector {
    keyboard: Arc<dyn KeyboardInjector>,
    key_delay: Duration,
}

impl Injector {
    pub fn new(keyboard: Arc<dyn KeyboardInjector>, key_delay: Duration) -> Self {
        Self { keyboard, key_delay }
    }

    /// F12, or Alt+F12 for a full rebuild.
    pub fn trigger(&self, recompile_all: bool) -> InputStrategy {
        let chord = if recompile_all { Chord::RECOMPILE_ALL } else { Chord::COMPILE };
        self.send(chord)
    }

    /// Enter to whatever has focus.
    pub fn confirm(&self) -> InputStrategy {
        self.send(Chord::CONFIRM)
    }

    /// Enter delivered straight to `hwnd`, without touching focus.
    pub fn confirm_window(&self, hwnd: WindowId) -> bool {
        let ok = self.keyboard.post_to_window(hwnd, Chord::CONFIRM, self.key_delay);
        if !ok {
            logger::warn_p("input", &format!("could not post Enter to 0x{:x}", hwnd));
        }
        ok
    }

    fn send(&self, chord: Chord) -> InputStrategy {
        logger::debug_p("input", &format!("sending {}", chord));
        if self.keyboard.send_input(chord, self.key_delay) {
            return InputStrategy::SendInput;
        }
        logger::warn_p("input", &format!("SendInput failed for {}, falling back to key events", chord));
        self.keyboard.send_key_events(chord, self.key_delay);
        InputStrategy::KeyEvents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::{Delivery, StubDesktop, WindowSpec};

    #[test]
    fn primary_strategy_sends_once() {
        let desk = Arc::new(StubDesktop::new());
        let inj = Injector::new(desk.clone(), Duration::ZERO);
        assert_eq!(inj.trigger(true), InputStrategy::SendInput);

        let sent = desk.keystrokes();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chord, Chord::RECOMPILE_ALL);
        assert_eq!(sent[0].via, Delivery::SendInput);
    }

    #[test]
    fn falls_back_only_on_failure() {
        let desk = Arc::new(StubDesktop::new());
        desk.set_send_input_fails(true);
        let inj = Injector::new(desk.clone(), Duration::ZERO);
        assert_eq!(inj.trigger(false), InputStrategy::KeyEvents);

        let sent = desk.keystrokes();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chord, Chord::COMPILE);
        assert_eq!(sent[0].via, Delivery::KeyEvents);
    }

    #[test]
    fn confirm_window_targets_handle() {
        let desk = Arc::new(StubDesktop::new());
        let pid = desk.spawn_process();
        let dlg = desk.add_window(pid, WindowSpec::new("Convert/Compile"));
        let inj = Injector::new(desk.clone(), Duration::ZERO);

        assert!(inj.confirm_window(dlg));
        assert!(!inj.confirm_window(0xdead));
        let sent = desk.keystrokes();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target, Some(dlg));
        assert_eq!(sent[0].via, Delivery::Message);
    }
}
