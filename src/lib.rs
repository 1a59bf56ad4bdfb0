//! cpython-lldb: makes a native debugger aware of CPython interpreter state.
//!
//! Reconstructs high-level language-runtime information -- object values,
//! the interpreter call stack, local/global bindings, and source lines --
//! by reading the raw memory of a stopped CPython process and interpreting
//! it according to CPython's internal data-structure layout. The core is
//! organised around an abstract [`target::Target`] capability interface so
//! the decode logic never talks to a concrete debugger API directly; a host
//! debugger integration supplies its own `Target` impl the way
//! [`process_target::ProcessTarget`] does for a bare `remoteprocess`-backed
//! process.
//!
//! # Example
//!
//! ```rust,no_run
//! fn print_traceback(pid: cpython_lldb::Pid) -> anyhow::Result<()> {
//!     let config = cpython_lldb::Config::default();
//!     let target = cpython_lldb::ProcessTarget::new(pid)?;
//!     let mut session = cpython_lldb::Session::new();
//!     println!("{}", session.py_bt(&target, &config));
//!     Ok(())
//! }
//! ```
#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

pub mod code_object;
pub mod commands;
pub mod config;
/// Not `cfg(test)`-gated: the top-level `tests/` integration suite links
/// against the compiled rlib (not the `--test` build), so the fixtures
/// harness has to be an ordinary public module to be reachable from there,
/// the same way `py-spy-testdata` is an ordinary (if test-oriented) crate
/// the teacher's own integration tests depend on.
pub mod fixtures;
pub mod frame_recovery;
pub mod introspector;
pub mod layout;
pub mod process_target;
pub mod source_reader;
pub mod stack_walker;
pub mod target;

pub use commands::{type_summary, Session};
pub use config::Config;
pub use process_target::ProcessTarget;
pub use remoteprocess::Pid;
pub use target::{HostFrame, Target, Value};
