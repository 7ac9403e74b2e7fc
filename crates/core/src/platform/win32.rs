use std::ffi::c_void;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use windows::Win32::Foundation::*;
use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
use windows::Win32::System::Threading::{
    AttachThreadInput, GetCurrentProcess, OpenProcess, OpenProcessToken, TerminateProcess, PROCESS_TERMINATE,
};
use windows::Win32::UI::Input::KeyboardAndMouse::*;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::logger;
use crate::types::*;
use super::{ControlReader, KeyboardInjector, ProcessManager, WindowManager};

fn to_hwnd(id: WindowId) -> HWND {
    HWND(id as usize as *mut c_void)
}

fn from_hwnd(hwnd: HWND) -> WindowId {
    hwnd.0 as usize as WindowId
}

fn vk(key: Key) -> VIRTUAL_KEY {
    match key {
        Key::F12 => VK_F12,
        Key::Alt => VK_MENU,
        Key::Enter => VK_RETURN,
    }
}

fn scan_code(key: Key) -> isize {
    match key {
        Key::F12 => 0x58,
        Key::Alt => 0x38,
        Key::Enter => 0x1C,
    }
}

fn key_flags(key: Key) -> KEYBD_EVENT_FLAGS {
    match key {
        Key::Enter => KEYBD_EVENT_FLAGS(0),
        _ => KEYEVENTF_EXTENDEDKEY,
    }
}

/// lParam for WM_KEYDOWN / WM_KEYUP: repeat count, scan code, extended,
/// alt context, previous state and transition bits.
fn key_lparam(key: Key, alt_held: bool, up: bool) -> LPARAM {
    let mut l: isize = 1 | (scan_code(key) << 16);
    if key != Key::Enter {
        l |= 1 << 24;
    }
    if alt_held {
        l |= 1 << 29;
    }
    if up {
        l |= (1 << 30) | (1 << 31);
    }
    LPARAM(l)
}

fn keyboard_input(key: Key, up: bool) -> INPUT {
    let mut flags = key_flags(key);
    if up {
        flags |= KEYEVENTF_KEYUP;
    }
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk(key),
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

unsafe extern "system" fn collect_hwnd(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<HWND>);
    handles.push(hwnd);
    TRUE
}

unsafe fn window_text(hwnd: HWND) -> String {
    let mut buf = [0u16; 512];
    let len = GetWindowTextW(hwnd, &mut buf);
    String::from_utf16_lossy(&buf[..len.max(0) as usize])
}

unsafe fn class_of(hwnd: HWND) -> String {
    let mut buf = [0u16; 256];
    let len = GetClassNameW(hwnd, &mut buf);
    String::from_utf16_lossy(&buf[..len.max(0) as usize])
}

unsafe fn window_pid(hwnd: HWND) -> ProcessId {
    let mut pid = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut pid));
    pid
}

/// Full text of an edit/static control via WM_GETTEXT (GetWindowTextW truncates
/// cross-process reads of edit controls).
unsafe fn control_text(hwnd: HWND) -> String {
    let len = SendMessageW(hwnd, WM_GETTEXTLENGTH, WPARAM(0), LPARAM(0)).0;
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u16; len as usize + 1];
    let copied = SendMessageW(hwnd, WM_GETTEXT, WPARAM(buf.len()), LPARAM(buf.as_mut_ptr() as isize)).0;
    String::from_utf16_lossy(&buf[..copied.clamp(0, len) as usize])
}

unsafe fn list_items(hwnd: HWND) -> Vec<String> {
    let count = SendMessageW(hwnd, LB_GETCOUNT, WPARAM(0), LPARAM(0)).0;
    let mut items = Vec::new();
    for i in 0..count.max(0) as usize {
        let len = SendMessageW(hwnd, LB_GETTEXTLEN, WPARAM(i), LPARAM(0)).0;
        if len < 0 {
            continue;
        }
        let mut buf = vec![0u16; len as usize + 1];
        let copied = SendMessageW(hwnd, LB_GETTEXT, WPARAM(i), LPARAM(buf.as_mut_ptr() as isize)).0;
        if copied >= 0 {
            items.push(String::from_utf16_lossy(&buf[..copied as usize]));
        }
    }
    items
}

/// Desktop access through the Win32 API.
pub struct Win32Platform;

impl Default for Win32Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl Win32Platform {
    pub fn new() -> Self {
        Self
    }

    fn try_set_foreground(&self, hwnd: HWND) -> bool {
        unsafe {
            if !IsWindow(hwnd).as_bool() {
                return false;
            }
            if IsIconic(hwnd).as_bool() {
                let _ = ShowWindow(hwnd, SW_RESTORE);
            }
            if SetForegroundWindow(hwnd).as_bool() {
                return true;
            }

            // Borrow the foreground thread's input state so the focus change is allowed
            let fg = GetForegroundWindow();
            if fg.0.is_null() || fg == hwnd {
                return fg == hwnd;
            }
            let fg_thread = GetWindowThreadProcessId(fg, None);
            let target_thread = GetWindowThreadProcessId(hwnd, None);
            if fg_thread == 0 || target_thread == 0 {
                logger::debug_p("win32", "could not resolve window threads for focus change");
                return false;
            }
            if !AttachThreadInput(target_thread, fg_thread, TRUE).as_bool() {
                logger::debug_p("win32", "AttachThreadInput failed");
                return false;
            }
            let ok = SetForegroundWindow(hwnd).as_bool();
            let _ = AttachThreadInput(target_thread, fg_thread, FALSE);
            ok
        }
    }
}

impl WindowManager for Win32Platform {
    fn enumerate_windows(&self) -> Vec<WindowInfo> {
        let mut handles: Vec<HWND> = Vec::new();
        unsafe {
            let _ = EnumWindows(Some(collect_hwnd), LPARAM(&mut handles as *mut Vec<HWND> as isize));
            handles
                .into_iter()
                .filter(|h| IsWindowVisible(*h).as_bool())
                // Untitled windows stay in: the main window can still match by class
                .map(|h| WindowInfo { hwnd: from_hwnd(h), title: window_text(h), pid: window_pid(h) })
                .collect()
        }
    }

    fn class_name(&self, hwnd: WindowId) -> String {
        unsafe { class_of(to_hwnd(hwnd)) }
    }

    fn is_window(&self, hwnd: WindowId) -> bool {
        unsafe { IsWindow(to_hwnd(hwnd)).as_bool() }
    }

    fn close_window(&self, hwnd: WindowId, label: &str) {
        logger::debug_p("win32", &format!("closing \"{}\" (0x{:x})", label, hwnd));
        if let Err(e) = unsafe { PostMessageW(to_hwnd(hwnd), WM_CLOSE, WPARAM(0), LPARAM(0)) } {
            logger::debug_p("win32", &format!("WM_CLOSE to \"{}\" failed: {}", label, e));
        }
    }

    fn set_foreground(&self, hwnd: WindowId) -> bool {
        let h = to_hwnd(hwnd);
        if !self.try_set_foreground(h) {
            return false;
        }
        thread::sleep(Duration::from_millis(50));
        let fg = unsafe { GetForegroundWindow() };
        if fg != h {
            logger::debug_p("win32", &format!("foreground is 0x{:x}, wanted 0x{:x}", from_hwnd(fg), hwnd));
            return false;
        }
        true
    }

    fn foreground_window(&self) -> Option<(WindowId, ProcessId)> {
        unsafe {
            let fg = GetForegroundWindow();
            if fg.0.is_null() {
                return None;
            }
            Some((from_hwnd(fg), window_pid(fg)))
        }
    }

    fn is_responsive(&self, hwnd: WindowId, timeout: Duration) -> bool {
        let mut result = 0usize;
        let ret = unsafe {
            SendMessageTimeoutW(
                to_hwnd(hwnd),
                WM_NULL,
                WPARAM(0),
                LPARAM(0),
                SMTO_ABORTIFHUNG,
                timeout.as_millis() as u32,
                Some(&mut result as *mut usize),
            )
        };
        ret.0 != 0
    }

    fn is_elevated(&self) -> bool {
        unsafe {
            let mut token = HANDLE::default();
            if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_err() {
                return false;
            }
            let mut elevation = TOKEN_ELEVATION::default();
            let mut size = 0u32;
            let ok = GetTokenInformation(
                token,
                TokenElevation,
                Some(&mut elevation as *mut TOKEN_ELEVATION as *mut c_void),
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut size,
            )
            .is_ok();
            let _ = CloseHandle(token);
            ok && elevation.TokenIsElevated != 0
        }
    }
}

impl ControlReader for Win32Platform {
    fn child_controls(&self, hwnd: WindowId) -> Vec<ChildControl> {
        let mut handles: Vec<HWND> = Vec::new();
        unsafe {
            let _ = EnumChildWindows(
                to_hwnd(hwnd),
                Some(collect_hwnd),
                LPARAM(&mut handles as *mut Vec<HWND> as isize),
            );
            handles
                .into_iter()
                .map(|h| {
                    let class = class_of(h);
                    let items = if class.eq_ignore_ascii_case("ListBox") { list_items(h) } else { Vec::new() };
                    let text = if items.is_empty() { control_text(h) } else { items.join("\n") };
                    ChildControl { hwnd: from_hwnd(h), class, text, items }
                })
                .collect()
        }
    }

    fn click_button(&self, parent: WindowId, button: &ChildControl) -> bool {
        unsafe {
            let child = to_hwnd(button.hwnd);
            let id = GetDlgCtrlID(child);
            // BN_CLICKED is notification code zero in the high word
            let wparam = WPARAM((id as u16 as usize) | ((BN_CLICKED as usize) << 16));
            match PostMessageW(to_hwnd(parent), WM_COMMAND, wparam, LPARAM(child.0 as isize)) {
                Ok(()) => true,
                Err(e) => {
                    logger::debug_p("win32", &format!("BN_CLICKED to \"{}\" failed: {}", button.text, e));
                    false
                }
            }
        }
    }
}

impl KeyboardInjector for Win32Platform {
    fn send_input(&self, chord: Chord, _key_delay: Duration) -> bool {
        let mut inputs = Vec::with_capacity(4);
        if let Some(m) = chord.modifier {
            inputs.push(keyboard_input(m, false));
        }
        inputs.push(keyboard_input(chord.key, false));
        inputs.push(keyboard_input(chord.key, true));
        if let Some(m) = chord.modifier {
            inputs.push(keyboard_input(m, true));
        }
        let sent = unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            logger::warn_p("win32", &format!("SendInput queued {} of {} events", sent, inputs.len()));
            return false;
        }
        true
    }

    fn send_key_events(&self, chord: Chord, key_delay: Duration) {
        unsafe {
            if let Some(m) = chord.modifier {
                keybd_event(vk(m).0 as u8, 0, key_flags(m), 0);
                thread::sleep(key_delay);
            }
            keybd_event(vk(chord.key).0 as u8, 0, key_flags(chord.key), 0);
            thread::sleep(key_delay);
            keybd_event(vk(chord.key).0 as u8, 0, key_flags(chord.key) | KEYEVENTF_KEYUP, 0);
            if let Some(m) = chord.modifier {
                thread::sleep(key_delay);
                keybd_event(vk(m).0 as u8, 0, key_flags(m) | KEYEVENTF_KEYUP, 0);
            }
        }
    }

    fn post_to_window(&self, hwnd: WindowId, chord: Chord, key_delay: Duration) -> bool {
        let h = to_hwnd(hwnd);
        let alt = chord.modifier == Some(Key::Alt);
        let (down, up) = if alt { (WM_SYSKEYDOWN, WM_SYSKEYUP) } else { (WM_KEYDOWN, WM_KEYUP) };

        let mut messages = Vec::with_capacity(4);
        if let Some(m) = chord.modifier {
            messages.push((down, m, key_lparam(m, alt, false)));
        }
        messages.push((down, chord.key, key_lparam(chord.key, alt, false)));
        messages.push((up, chord.key, key_lparam(chord.key, alt, true)));
        if let Some(m) = chord.modifier {
            messages.push((up, m, key_lparam(m, alt, true)));
        }

        for (i, (msg, key, lparam)) in messages.into_iter().enumerate() {
            if i > 0 {
                thread::sleep(key_delay);
            }
            let wparam = WPARAM(vk(key).0 as usize);
            if let Err(e) = unsafe { PostMessageW(h, msg, wparam, lparam) } {
                logger::debug_p("win32", &format!("posting {:?} to 0x{:x} failed: {}", key, hwnd, e));
                return false;
            }
        }
        true
    }
}

impl ProcessManager for Win32Platform {
    fn launch(&self, exe: &Path, file: &Path) -> Result<ProcessId> {
        if !exe.is_file() {
            bail!("executable not found: {}", exe.display());
        }
        let child = Command::new(exe)
            .arg(file)
            .spawn()
            .with_context(|| format!("starting {}", exe.display()))?;
        Ok(child.id())
    }

    fn terminate(&self, pid: ProcessId) -> Result<()> {
        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, FALSE, pid)
                .with_context(|| format!("opening process {}", pid))?;
            let result = TerminateProcess(handle, 1).with_context(|| format!("terminating process {}", pid));
            let _ = CloseHandle(handle);
            result
        }
    }
}
