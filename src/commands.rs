//! User-visible command surface: `py-bt`, `py-list`, `py-locals`, `py-up`,
//! `py-down`, and the type-summary pretty-printer (spec §4.6).
//!
//! Grounded on the teacher's `console_viewer.rs`, which owns the same job
//! of turning a `Vec<Frame>` into exactly the textbook-traceback text a
//! user expects; this module keeps that render-don't-fail posture (spec
//! §7's "the extension never raises to the host debugger") but renders the
//! byte-exact formats `examples/original_source/tests/test_py_*.py`
//! specify rather than py-spy's `py-spy dump` layout.
use log::warn;

use crate::introspector::{describe, Decoded};
use crate::source_reader::read_line;
use crate::stack_walker::{pystack, InterpreterFrame};
use crate::target::Target;
use crate::Config;

/// Per-debugger-session state: the captured interpreter stack plus a
/// cursor index into it (spec §3, Frame cursor). Index 0 is the newest
/// (innermost) frame; larger indices move toward the caller.
pub struct Session {
    frames: Vec<InterpreterFrame>,
    cursor: usize,
}

impl Session {
    pub fn new() -> Session {
        Session {
            frames: Vec::new(),
            cursor: 0,
        }
    }

    /// Invalidates any captured stack. Spec §5: target addresses must not
    /// be cached across a resume; callers invoke this whenever the
    /// debuggee resumes execution.
    pub fn invalidate(&mut self) {
        self.frames.clear();
        self.cursor = 0;
    }

    fn ensure_captured<T: Target>(&mut self, target: &T, config: &Config) {
        if self.frames.is_empty() {
            match pystack(target, config) {
                Ok(frames) => self.frames = frames,
                Err(err) => {
                    warn!("failed to walk interpreter stack: {}", err);
                    self.frames = Vec::new();
                }
            }
            self.cursor = 0;
        }
    }

    /// `py-bt`: renders the interpreter stack oldest-to-newest in the
    /// textbook traceback format.
    pub fn py_bt<T: Target>(&mut self, target: &T, config: &Config) -> String {
        self.ensure_captured(target, config);
        if self.frames.is_empty() {
            return "No Python traceback found".to_owned();
        }

        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in self.frames.iter().rev() {
            out.push_str(&format!(
                "  File \"{}\", line {}, in {}\n",
                frame.filename, frame.line, frame.function_name
            ));
            let source = read_line(&frame.filename, frame.line.max(0) as usize);
            out.push_str(&format!("    {}\n", source.trim()));
        }
        out
    }

    /// `py-list [start [end]]`: prints a window of source lines around the
    /// cursor frame's active line (spec §4.6).
    pub fn py_list<T: Target>(
        &mut self,
        target: &T,
        config: &Config,
        start: Option<usize>,
        end: Option<usize>,
    ) -> String {
        self.ensure_captured(target, config);
        let frame = match self.frames.get(self.cursor) {
            Some(f) => f,
            None => return "No Python traceback found".to_owned(),
        };
        let active_line = frame.line.max(1) as usize;

        let (window_start, window_end) = match (start, end) {
            (None, None) => {
                let (before, after) = config.list_window;
                (active_line.saturating_sub(before).max(1), active_line + after)
            }
            (Some(s), None) => (s, s + 10),
            (Some(s), Some(e)) => (s, e),
        };

        let mut out = String::new();
        for n in window_start..=window_end {
            let marker = if n == active_line { '>' } else { ' ' };
            let source = read_line(&frame.filename, n);
            out.push_str(&format!("{:>5}    {}\n", format!("{}{}", marker, n), source));
        }
        out
    }

    /// `py-locals`: prints `name = repr(value)` bindings for the cursor
    /// frame's local scope.
    pub fn py_locals<T: Target>(&mut self, target: &T, config: &Config) -> String {
        self.ensure_captured(target, config);
        let frame = match self.frames.get(self.cursor) {
            Some(f) => f,
            None => return String::new(),
        };
        if frame.locals_addr == 0 {
            return String::new();
        }
        let description = describe(target, frame.locals_addr, config);
        let entries = match description.decoded {
            Decoded::Dict(entries) => entries,
            _ => return String::new(),
        };

        let mut out = String::new();
        for (key, value) in entries {
            let name = match &key.decoded {
                Decoded::Str(s) => s.clone(),
                _ => key.repr(),
            };
            out.push_str(&format!("{} = {}\n", name, value.repr()));
        }
        out
    }

    /// `py-up`: moves the cursor one frame toward the caller (older, higher
    /// index). Renders the new frame's header on success.
    pub fn py_up<T: Target>(&mut self, target: &T, config: &Config) -> String {
        self.ensure_captured(target, config);
        if self.cursor + 1 >= self.frames.len() {
            return "*** Oldest frame".to_owned();
        }
        self.cursor += 1;
        self.render_cursor_header()
    }

    /// `py-down`: moves the cursor one frame toward the callee (newer,
    /// lower index).
    pub fn py_down<T: Target>(&mut self, target: &T, config: &Config) -> String {
        self.ensure_captured(target, config);
        if self.cursor == 0 {
            return "*** Newest frame".to_owned();
        }
        self.cursor -= 1;
        self.render_cursor_header()
    }

    fn render_cursor_header(&self) -> String {
        let frame = &self.frames[self.cursor];
        let source = read_line(&frame.filename, frame.line.max(0) as usize);
        format!(
            "  File \"{}\", line {}, in {}\n    {}",
            frame.filename,
            frame.line,
            frame.function_name,
            source.trim()
        )
    }
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}

/// Type-summary formatter (spec §4.6): the `repr` of the object described
/// at `addr`, used to back a type-summary registration for the generic
/// object-header pointer type.
pub fn type_summary<T: Target>(target: &T, addr: u64, config: &Config) -> String {
    describe(target, addr, config).repr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::LocalTarget;

    #[test]
    fn test_py_bt_with_no_frames_reports_fixed_message() {
        let target = LocalTarget::new();
        let config = Config::default();
        let mut session = Session::new();
        assert_eq!(session.py_bt(&target, &config), "No Python traceback found");
    }

    #[test]
    fn test_py_up_past_oldest_reports_fixed_message() {
        let target = LocalTarget::new();
        let config = Config::default();
        let mut session = Session::new();
        session.frames = vec![InterpreterFrame {
            frame_addr: 1,
            function_name: "f".to_owned(),
            filename: "a.py".to_owned(),
            line: 1,
            code_addr: 0,
            locals_addr: 0,
            globals_addr: 0,
        }];
        assert_eq!(session.py_up(&target, &config), "*** Oldest frame");
    }

    #[test]
    fn test_py_down_past_newest_reports_fixed_message() {
        let target = LocalTarget::new();
        let config = Config::default();
        let mut session = Session::new();
        session.frames = vec![InterpreterFrame {
            frame_addr: 1,
            function_name: "f".to_owned(),
            filename: "a.py".to_owned(),
            line: 1,
            code_addr: 0,
            locals_addr: 0,
            globals_addr: 0,
        }];
        assert_eq!(session.py_down(&target, &config), "*** Newest frame");
    }

    #[test]
    fn test_invalidate_clears_cursor_and_frames() {
        let mut session = Session::new();
        session.frames = vec![InterpreterFrame {
            frame_addr: 1,
            function_name: "f".to_owned(),
            filename: "a.py".to_owned(),
            line: 1,
            code_addr: 0,
            locals_addr: 0,
            globals_addr: 0,
        }];
        session.cursor = 0;
        session.invalidate();
        assert!(session.frames.is_empty());
        assert_eq!(session.cursor, 0);
    }
}
