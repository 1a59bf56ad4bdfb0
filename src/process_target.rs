//! The concrete realization of [`crate::target::Target`] over a live process.
//!
//! Grounded on the teacher's own process-access stack: `remoteprocess` is
//! exactly the crate `benfred-py-spy` uses for memory reads
//! (`ProcessMemory::copy`/`copy_struct` throughout `python_data_access.rs`)
//! and for stack unwinding (`native_stack_trace.rs`'s
//! `Unwinder::cursor`/`Unwinder::symbolicate`, and `get_pthread_id`'s use of
//! `cursor.bx()` to read a single named register out of an unwind cursor).
//! This module threads the same two capabilities through the abstract
//! `Target`/`HostFrame` interface spec §4.1 and §6 describe, with
//! `crate::layout` standing in for the live C type system a real LLDB
//! session would provide (see that module's doc comment and DESIGN.md).
use std::collections::HashMap;

use anyhow::{format_err, Result};
use remoteprocess::{Pid, Process, ProcessMemory, Thread, Unwinder};

use crate::layout;
use crate::target::{read_pointer, HostFrame, Target, Value};

/// A single native stack frame, captured eagerly while walking the unwinder
/// (the cursor itself isn't `Clone`/indexable, so this crate materializes
/// the whole native stack once per command the way `get_stack_trace`
/// materializes Python frames once per command).
pub struct NativeFrame {
    function_name: String,
    registers: HashMap<&'static str, u64>,
}

impl HostFrame for NativeFrame {
    fn function_name(&self) -> &str {
        &self.function_name
    }

    /// `ProcessTarget` has no DWARF variable-location resolver of its own
    /// (that's ordinarily the debugger's job); strategies 1/2 of frame
    /// recovery are therefore never satisfied against a live process here,
    /// and strategies 3/4 (the register heuristic) do all the work. A host
    /// embedding this crate behind an actual debugger's scripting API
    /// (which does have variable info) would override this.
    fn variable(&self, _name: &str) -> Option<Value> {
        None
    }

    fn register(&self, name: &str) -> Option<u64> {
        self.registers.get(name).copied()
    }
}

pub struct ProcessTarget {
    process: Process,
    unwinder: Unwinder,
    thread: Thread,
}

impl ProcessTarget {
    /// Attaches to `pid` and selects its first thread, mirroring the
    /// teacher's default of operating on whatever thread the process
    /// reports first when no thread was explicitly chosen.
    pub fn new(pid: Pid) -> Result<ProcessTarget> {
        let process = Process::new(pid)?;
        let unwinder = process.unwinder()?;
        let thread = process
            .threads()?
            .into_iter()
            .next()
            .ok_or_else(|| format_err!("process {} has no threads", pid))?;
        Ok(ProcessTarget {
            process,
            unwinder,
            thread,
        })
    }

    pub fn for_thread(pid: Pid, thread: Thread) -> Result<ProcessTarget> {
        let process = Process::new(pid)?;
        let unwinder = process.unwinder()?;
        Ok(ProcessTarget {
            process,
            unwinder,
            thread,
        })
    }
}

impl Target for ProcessTarget {
    type Frame = NativeFrame;

    fn read_bytes(&self, addr: u64, n: usize) -> Result<Vec<u8>> {
        Ok(self.process.copy(addr as usize, n)?)
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
        let addr = read_pointer(self, value)?;
        Ok(Value::new(addr, pointee))
    }

    fn host_frames(&self) -> Result<Vec<NativeFrame>> {
        let mut cursor = self.unwinder.cursor(&self.thread)?;
        let mut frames = Vec::new();
        // The full x86-64 GP register set is only observable live, on the
        // thread's innermost (currently executing) frame; every frame the
        // unwinder subsequently produces only carries back whatever CFI
        // actually restores, which for `remoteprocess`'s libunwind-backed
        // `Cursor` is just `bx`/`sp` (spec §4.3's heuristic runs against
        // whichever registers are available). There's no `Cursor` type to
        // name at this crate's boundary -- its shape depends on the active
        // unwind backend -- so the read happens inline, against whatever
        // concrete type `Unwinder::cursor` returned, the same way the
        // teacher's own `get_pthread_id` (`native_stack_trace.rs:211`) only
        // ever calls `cursor.bx()`, never a `Cursor` type by name.
        let innermost_registers = innermost_gp_registers(&self.thread);
        while let Some(ip) = cursor.next() {
            let ip = ip?;
            let mut function_name = String::new();
            let _ = self.unwinder.symbolicate(ip, true, &mut |f| {
                if let Some(func) = &f.function {
                    function_name = func.clone();
                }
            });
            let registers = if frames.is_empty() {
                innermost_registers.clone()
            } else {
                #[cfg_attr(not(register_scan), allow(unused_mut))]
                let mut regs = HashMap::new();
                #[cfg(register_scan)]
                {
                    if let Ok(v) = cursor.bx() {
                        regs.insert("rbx", v);
                    }
                    if let Ok(v) = cursor.sp() {
                        regs.insert("rsp", v);
                    }
                }
                regs
            };
            frames.push(NativeFrame {
                function_name,
                registers,
            });
            if frames.len() > 4096 {
                return Err(format_err!("Max native frame recursion depth reached"));
            }
        }
        Ok(frames)
    }
}

/// The live general-purpose register file of `thread`'s current stop,
/// read with a raw `PTRACE_GETREGS` (spec §4.3's full `rax..r15` scan).
/// Linux/x86-64 only: the register heuristic is explicitly out of scope
/// elsewhere (spec §1 Non-goals).
#[cfg(all(register_scan, target_os = "linux"))]
fn innermost_gp_registers(thread: &remoteprocess::Thread) -> HashMap<&'static str, u64> {
    let mut regs = HashMap::new();
    let tid = match thread.id() {
        Ok(tid) => tid,
        Err(_) => return regs,
    };
    let raw = match nix::sys::ptrace::getregs(nix::unistd::Pid::from_raw(tid)) {
        Ok(raw) => raw,
        Err(_) => return regs,
    };
    regs.insert("rax", raw.rax);
    regs.insert("rbx", raw.rbx);
    regs.insert("rcx", raw.rcx);
    regs.insert("rdx", raw.rdx);
    regs.insert("rsp", raw.rsp);
    regs.insert("rbp", raw.rbp);
    regs.insert("rdi", raw.rdi);
    regs.insert("rsi", raw.rsi);
    regs.insert("r8", raw.r8);
    regs.insert("r9", raw.r9);
    regs.insert("r10", raw.r10);
    regs.insert("r11", raw.r11);
    regs.insert("r12", raw.r12);
    regs.insert("r13", raw.r13);
    regs.insert("r14", raw.r14);
    regs.insert("r15", raw.r15);
    regs
}

#[cfg(not(all(register_scan, target_os = "linux")))]
fn innermost_gp_registers(_thread: &remoteprocess::Thread) -> HashMap<&'static str, u64> {
    HashMap::new()
}
