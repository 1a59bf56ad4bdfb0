//! Test-only harness that builds CPython object layouts in this process's
//! own memory and reads them back through the real [`Target`] decode path.
//!
//! Grounded on the teacher's own test style in `python_data_access.rs`
//! (`AllocatedPyByteObject`/`AllocatedPyASCIIObject`, built with
//! `#[repr(C)]` structs and read back via `remoteprocess::LocalProcess`).
//! This crate's layouts aren't Rust structs (they're the offset tables in
//! `crate::layout`), so the harness builds raw byte buffers at the offsets
//! the catalog itself reports instead of relying on `#[repr(C)]` to line
//! things up -- the same data, assembled the other way round.
use std::cell::RefCell;
use std::collections::HashMap;

use anyhow::Result;
use remoteprocess::{LocalProcess, ProcessMemory};

use crate::layout;
use crate::target::{HostFrame, Target, Value};

/// A chunk of process memory the test owns, kept alive for the duration of
/// the test so its address stays valid.
pub struct Arena {
    buffers: RefCell<Vec<Box<[u8]>>>,
}

impl Arena {
    pub fn new() -> Arena {
        Arena {
            buffers: RefCell::new(Vec::new()),
        }
    }

    /// Allocates `len` zeroed bytes and returns their address. The
    /// allocation lives as long as the arena.
    pub fn alloc(&self, len: usize) -> u64 {
        let mut buf = vec![0u8; len].into_boxed_slice();
        let addr = buf.as_mut_ptr() as u64;
        self.buffers.borrow_mut().push(buf);
        addr
    }

    fn write(&self, addr: u64, offset: u64, bytes: &[u8]) {
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), (addr + offset) as *mut u8, bytes.len());
        }
    }

    /// Writes `value`'s little-endian bytes at `addr + offset`.
    pub fn put_u64(&self, addr: u64, offset: u64, value: u64) {
        self.write(addr, offset, &value.to_le_bytes());
    }

    pub fn put_i64(&self, addr: u64, offset: u64, value: i64) {
        self.write(addr, offset, &value.to_le_bytes());
    }

    pub fn put_i32(&self, addr: u64, offset: u64, value: i32) {
        self.write(addr, offset, &value.to_le_bytes());
    }

    pub fn put_f64(&self, addr: u64, offset: u64, value: f64) {
        self.write(addr, offset, &value.to_bits().to_le_bytes());
    }

    pub fn put_bytes(&self, addr: u64, offset: u64, bytes: &[u8]) {
        self.write(addr, offset, bytes);
    }

    /// Allocates a `PyObject`-headed struct of `size` bytes with its
    /// `ob_type` pointer set, returning the object's own address.
    pub fn alloc_object(&self, size: usize, type_ptr: u64) -> u64 {
        let addr = self.alloc(size);
        self.put_u64(addr, 8, type_ptr);
        addr
    }

    /// Builds a minimal `PyTypeObject` whose `tp_name` points at a NUL
    /// terminated copy of `name`, returning the type object's address.
    pub fn alloc_type(&self, name: &str) -> u64 {
        let name_addr = self.alloc(name.len() + 1);
        self.put_bytes(name_addr, 0, name.as_bytes());
        let type_size = layout::type_size("PyTypeObject").unwrap() as usize;
        let addr = self.alloc(type_size);
        self.put_u64(addr, 24, name_addr);
        addr
    }
}

/// A `Target` over this process's own memory, backed by
/// `remoteprocess::LocalProcess`. `host_frames` is driven entirely by
/// `frames`, set up per test.
pub struct LocalTarget {
    pub frames: Vec<FixtureFrame>,
}

impl LocalTarget {
    pub fn new() -> LocalTarget {
        LocalTarget { frames: Vec::new() }
    }
}

/// A synthetic host frame: a function name plus whatever variables and
/// registers the test wants visible.
#[derive(Clone, Default)]
pub struct FixtureFrame {
    pub function_name: String,
    pub variables: HashMap<String, Value>,
    pub registers: HashMap<String, u64>,
}

impl HostFrame for FixtureFrame {
    fn function_name(&self) -> &str {
        &self.function_name
    }

    fn variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }

    fn register(&self, name: &str) -> Option<u64> {
        self.registers.get(name).copied()
    }
}

impl Target for LocalTarget {
    type Frame = FixtureFrame;

    fn read_bytes(&self, addr: u64, n: usize) -> Result<Vec<u8>> {
        Ok(LocalProcess.copy(addr as usize, n)?)
    }

    fn read_cstring(&self, addr: u64, max: usize) -> Result<String> {
        let bytes = self.read_bytes(addr, max)?;
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..len]).into_owned())
    }

    fn type_size(&self, type_name: &str) -> Result<usize> {
        Ok(layout::type_size(type_name)? as usize)
    }

    fn child(&self, value: &Value, field: &str) -> Result<Value> {
        let f = layout::field_of(value.type_name(), field)?;
        let addr = value.addr() + f.offset;
        Ok(match f.bits {
            Some((off, width)) => Value::new_bitfield(addr, f.type_name, off, width),
            None => Value::new(addr, f.type_name),
        })
    }

    fn deref(&self, value: &Value) -> Result<Value> {
        let pointee = layout::pointee(value.type_name())?;
        let addr = crate::target::read_pointer(self, value)?;
        Ok(Value::new(addr, pointee))
    }

    fn host_frames(&self) -> Result<Vec<FixtureFrame>> {
        Ok(self.frames.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_roundtrips_u64() {
        let arena = Arena::new();
        let addr = arena.alloc(16);
        arena.put_u64(addr, 8, 0xdead_beef);
        let target = LocalTarget::new();
        let value = Value::new(addr, "PyObject");
        let type_ptr = target.child(&value, "ob_type").unwrap();
        let read = crate::target::read_pointer(&target, &type_ptr).unwrap();
        assert_eq!(read, 0xdead_beef);
    }

    #[test]
    fn test_alloc_type_reads_tp_name() {
        let arena = Arena::new();
        let type_addr = arena.alloc_type("int");
        let target = LocalTarget::new();
        let name_field = target
            .child(&Value::new(type_addr, "PyTypeObject"), "tp_name")
            .unwrap();
        let name_addr = crate::target::read_pointer(&target, &name_field).unwrap();
        assert_eq!(target.read_cstring(name_addr, 256).unwrap(), "int");
    }
}
