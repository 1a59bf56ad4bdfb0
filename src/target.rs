//! The abstract capability interface this crate talks to.
//!
//! Every higher-level piece of the crate -- the object introspector, frame
//! recovery, the line decoder, the stack walker -- is written against the
//! [`Target`] trait rather than against a specific debugger. In a real LLDB
//! session `Target` is backed by [`crate::process_target::ProcessTarget`],
//! which reads memory and registers out of the debuggee via `remoteprocess`.
//! In tests it's backed by an in-process harness that builds CPython object
//! layouts in local memory and reads them back with
//! `remoteprocess::LocalProcess`.

use anyhow::{bail, Context, Result};

/// A typed reference to a value living in the debuggee's address space.
///
/// Mirrors the handle an interactive debugger's scripting API hands back
/// from an expression path or a register read: an address plus whatever
/// static type the debugger believes lives there. A `Value` carries no
/// data of its own -- every byte backing it lives in the target process.
///
/// `bits` is set when the value denotes a bitfield member (e.g. the
/// `compact`/`ascii`/`kind`/`ready` flags packed into a unicode object's
/// `state` word): `addr` then points at the word containing the bitfield,
/// and `bits` is `(bit_offset, bit_width)` within that word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    addr: u64,
    type_name: String,
    bits: Option<(u8, u8)>,
}

impl Value {
    pub fn new(addr: u64, type_name: impl Into<String>) -> Value {
        Value {
            addr,
            type_name: type_name.into(),
            bits: None,
        }
    }

    pub fn new_bitfield(addr: u64, type_name: impl Into<String>, offset: u8, width: u8) -> Value {
        Value {
            addr,
            type_name: type_name.into(),
            bits: Some((offset, width)),
        }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_null(&self) -> bool {
        self.addr == 0
    }

    pub fn bitfield(&self) -> Option<(u8, u8)> {
        self.bits
    }
}

/// A single native (host) stack frame as the debugger reports it.
///
/// This is deliberately narrow: frame recovery only ever needs a frame's
/// function name (to filter for `_PyEval_EvalFrameDefault`/
/// `PyEval_EvalFrameEx`) and the ability to look up a named local variable,
/// which the debugger may or may not still have symbols for.
pub trait HostFrame {
    fn function_name(&self) -> &str;

    /// Looks up a local variable by name in this frame, if the debugger's
    /// symbol table still has it. Optimised builds routinely elide this for
    /// `f`, which is exactly the case frame recovery has to work around.
    fn variable(&self, name: &str) -> Option<Value>;

    /// Reads a named general purpose register in this frame's context. Only
    /// meaningful on the innermost frame of a thread; callers never ask for
    /// registers of a caller frame.
    fn register(&self, name: &str) -> Option<u64>;
}

/// Abstract capability interface over the host debugger's scripting API
/// (spec §4.1, §6).
pub trait Target {
    type Frame: HostFrame;

    /// Reads `n` raw bytes at `addr`. Fails if the read is out of bounds or
    /// the process can no longer be read (e.g. it has exited).
    fn read_bytes(&self, addr: u64, n: usize) -> Result<Vec<u8>>;

    /// Reads a NUL-terminated C string at `addr`, reading at most `max`
    /// bytes before giving up.
    fn read_cstring(&self, addr: u64, max: usize) -> Result<String>;

    /// Looks up a named C type and returns its size in bytes.
    fn type_size(&self, type_name: &str) -> Result<usize>;

    /// Looks up a named field of `value`'s declared type, returning a new
    /// `Value` for that field (not its dereferenced content).
    fn child(&self, value: &Value, field: &str) -> Result<Value>;

    /// Dereferences a pointer-typed value, returning a `Value` for its
    /// pointee.
    fn deref(&self, value: &Value) -> Result<Value>;

    /// Reinterprets `value` as having a different declared type, without
    /// moving its address.
    fn cast(&self, value: &Value, type_name: &str) -> Value {
        Value {
            addr: value.addr,
            type_name: type_name.to_owned(),
            bits: None,
        }
    }

    /// Returns the load address backing `value`. For ordinary fields this
    /// is just the field's address; for a type whose payload is stored
    /// inline immediately after the struct (compact strings, bytes
    /// buffers), this is the address one past the struct.
    fn load_address(&self, value: &Value) -> u64 {
        value.addr()
    }

    /// Reads a named general purpose register from the currently selected
    /// stack frame.
    fn register(&self, frame: &Self::Frame, name: &str) -> Result<u64> {
        frame
            .register(name)
            .with_context(|| format!("register {} unavailable", name))
    }

    /// The host stack frames of the thread currently selected in the
    /// debugger, innermost first.
    fn host_frames(&self) -> Result<Vec<Self::Frame>>;
}

/// Reads a scalar (integer-ish) field out of `value`, honouring a bitfield
/// spec if `value` denotes one. Assumes little-endian, which matches the
/// x86-64-only scope of this crate (spec §1 Non-goals).
pub fn read_scalar<T: Target>(target: &T, value: &Value) -> Result<u64> {
    match value.bitfield() {
        Some((offset, width)) => {
            let word = read_unsigned(target, value.addr(), 4)?;
            let mask = if width >= 32 {
                u32::MAX
            } else {
                (1u32 << width) - 1
            };
            Ok(((word as u32 >> offset) & mask) as u64)
        }
        None => {
            let size = target.type_size(value.type_name()).unwrap_or(8);
            read_unsigned(target, value.addr(), size)
        }
    }
}

/// Reads a scalar field and sign-extends it according to `size`.
pub fn read_signed<T: Target>(target: &T, value: &Value) -> Result<i64> {
    let size = target.type_size(value.type_name()).unwrap_or(8);
    let raw = read_unsigned(target, value.addr(), size)?;
    Ok(sign_extend(raw, size))
}

/// Reads the raw pointer value stored in a pointer-typed field (i.e. the
/// field's content, not a further dereference).
pub fn read_pointer<T: Target>(target: &T, value: &Value) -> Result<u64> {
    read_unsigned(target, value.addr(), 8)
}

fn read_unsigned<T: Target>(target: &T, addr: u64, size: usize) -> Result<u64> {
    if size == 0 || size > 8 {
        bail!("unsupported scalar width {}", size);
    }
    let bytes = target.read_bytes(addr, size)?;
    let mut buf = [0u8; 8];
    buf[..size].copy_from_slice(&bytes);
    Ok(u64::from_le_bytes(buf))
}

fn sign_extend(raw: u64, size: usize) -> i64 {
    let shift = (8 - size) * 8;
    ((raw << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0xff, 1), -1);
        assert_eq!(sign_extend(0x7f, 1), 127);
        assert_eq!(sign_extend(0xffff_ffff, 4), -1);
        assert_eq!(sign_extend(1, 8), 1);
    }
}
