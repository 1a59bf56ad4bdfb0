//! Walks a thread's host stack and emits the CPython interpreter call stack
//! (spec §4.5).
//!
//! Grounded on the teacher's `get_stack_trace` (`stack_trace.rs`), which
//! walks native frames of a thread and builds up a `Vec<Frame>` the same
//! way, stopping at a recursion guard and logging a warning when a line
//! number can't be resolved rather than aborting the whole walk.
use anyhow::Result;
use log::debug;

use crate::code_object::addr2line;
use crate::frame_recovery::recover;
use crate::target::{read_pointer, read_signed, Target, Value};
use crate::Config;

/// A recovered interpreter frame, already decoded enough to render (spec
/// §3, Interpreter frame object).
#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterFrame {
    pub frame_addr: u64,
    pub function_name: String,
    pub filename: String,
    pub line: i32,
    pub code_addr: u64,
    pub locals_addr: u64,
    pub globals_addr: u64,
}

/// Walks the host frames of the thread the `Target` currently has selected
/// and returns the corresponding interpreter frames, newest first.
///
/// Adjacent duplicates -- the same interpreter-frame address recovered from
/// two consecutive host frames, a consequence of frame-recovery strategy 2
/// -- collapse to one entry.
pub fn pystack<T: Target>(target: &T, config: &Config) -> Result<Vec<InterpreterFrame>> {
    let host_frames = target.host_frames()?;
    let mut frames = Vec::new();
    let mut last_addr: Option<u64> = None;

    for (i, frame) in host_frames.iter().enumerate() {
        if frames.len() >= config.max_frames {
            debug!("max frame recursion depth reached, truncating stack walk");
            break;
        }
        let caller = host_frames.get(i + 1);
        let recovered = match recover(target, frame, caller, config) {
            Some(v) => v,
            None => continue,
        };
        if Some(recovered.addr()) == last_addr {
            continue;
        }
        match decode_frame(target, &recovered, config) {
            Ok(decoded) => {
                last_addr = Some(recovered.addr());
                frames.push(decoded);
            }
            Err(err) => {
                debug!("failed to decode interpreter frame at {:#x}: {}", recovered.addr(), err);
            }
        }
    }
    Ok(frames)
}

/// Decodes a single `PyFrameObject` value into an [`InterpreterFrame`]
/// (spec §3's "base + decode(cursor)" line formula).
fn decode_frame<T: Target>(target: &T, frame_value: &Value, config: &Config) -> Result<InterpreterFrame> {
    let code_ptr = target.child(frame_value, "f_code")?;
    let code_addr = read_pointer(target, &code_ptr)?;
    let code_value = Value::new(code_addr, "PyCodeObject");

    let filename_ptr = target.child(&code_value, "co_filename")?;
    let filename_addr = read_pointer(target, &filename_ptr)?;
    let filename = decode_short_string(target, filename_addr, config)?;

    let name_ptr = target.child(&code_value, "co_name")?;
    let name_addr = read_pointer(target, &name_ptr)?;
    let function_name = decode_short_string(target, name_addr, config)?;

    let first_lineno = read_signed(target, &target.child(&code_value, "co_firstlineno")?)?;

    let lasti = read_signed(target, &target.child(frame_value, "f_lasti")?)?;
    let lnotab_ptr = target.child(&code_value, "co_lnotab")?;
    let lnotab_addr = read_pointer(target, &lnotab_ptr)?;
    let lnotab = read_lnotab_bytes(target, lnotab_addr).unwrap_or_default();
    let line = first_lineno as i32 + addr2line(&lnotab, lasti);

    let locals_ptr = target.child(frame_value, "f_locals")?;
    let locals_addr = read_pointer(target, &locals_ptr)?;
    let globals_ptr = target.child(frame_value, "f_globals")?;
    let globals_addr = read_pointer(target, &globals_ptr)?;

    Ok(InterpreterFrame {
        frame_addr: frame_value.addr(),
        function_name,
        filename,
        line,
        code_addr,
        locals_addr,
        globals_addr,
    })
}

/// `co_filename`/`co_name` are plain `str` objects; this crate doesn't pull
/// in the full introspector dispatch here to avoid a circular dependency on
/// `describe`'s recursion budget for what's always a simple ASCII string.
fn decode_short_string<T: Target>(target: &T, addr: u64, config: &Config) -> Result<String> {
    if addr == 0 {
        return Ok(String::new());
    }
    let description = crate::introspector::describe(target, addr, config);
    match description.decoded {
        crate::introspector::Decoded::Str(s) => Ok(s),
        _ => Ok(description.repr()),
    }
}

fn read_lnotab_bytes<T: Target>(target: &T, addr: u64) -> Result<Vec<u8>> {
    let value = Value::new(addr, "PyBytesObject");
    let size = read_signed(target, &target.child(&value, "ob_size")?)?;
    if size <= 0 {
        return Ok(Vec::new());
    }
    let sval = target.child(&value, "ob_sval")?;
    target.read_bytes(sval.addr(), size as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpreter_frame_is_comparable() {
        let a = InterpreterFrame {
            frame_addr: 1,
            function_name: "f".to_owned(),
            filename: "a.py".to_owned(),
            line: 1,
            code_addr: 2,
            locals_addr: 3,
            globals_addr: 4,
        };
        let b = a.clone();
        assert_eq!(a, b);
    }
}
