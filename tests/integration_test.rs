//! End-to-end command-surface scenarios, translated from
//! `examples/original_source/tests/test_py_bt.py`, `test_py_list.py`,
//! `test_py_locals.py` and `test_py_up_down.py` (SPEC_FULL.md §11) onto the
//! in-process `fixtures::LocalTarget` harness instead of a real LLDB/Python
//! session: each test assembles the CPython object layouts a debuggee would
//! have in memory and feeds their addresses through the real command
//! surface.
use std::collections::HashMap;
use std::fs;
use std::io::Write;

use cpython_lldb::fixtures::{Arena, FixtureFrame, LocalTarget};
use cpython_lldb::layout;
use cpython_lldb::target::Value;
use cpython_lldb::{Config, Session};

const EVAL_FRAME: &str = "_PyEval_EvalFrameDefault";

fn write_temp_source(name: &str, contents: &str) -> String {
    let mut path = std::env::temp_dir();
    path.push(format!("cpython_lldb_it_{}_{}", std::process::id(), name));
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path.to_str().unwrap().to_owned()
}

/// Builds a compact ASCII `str` object and returns its address.
fn alloc_str(arena: &Arena, str_type: u64, s: &str) -> u64 {
    let header = layout::PYASCIIOBJECT_SIZE;
    let addr = arena.alloc(header as usize + s.len());
    arena.put_u64(addr, 8, str_type);
    arena.put_i64(addr, 16, s.len() as i64);
    // compact (bit 5) + ascii (bit 6) + ready (bit 7).
    let state: u32 = (1 << 5) | (1 << 6) | (1 << 7);
    arena.put_i32(addr, 32, state as i32);
    arena.put_bytes(addr, header, s.as_bytes());
    addr
}

/// Builds a `PyLongObject` holding a single non-negative digit.
fn alloc_small_int(arena: &Arena, int_type: u64, value: u32) -> u64 {
    let base = layout::type_size("PyLongObject").unwrap();
    let addr = arena.alloc(base as usize + 4);
    arena.put_u64(addr, 8, int_type);
    arena.put_i64(addr, 16, 1); // ob_size: one digit, positive
    arena.put_i32(addr, 24, value as i32);
    addr
}

/// Builds an empty `PyBytesObject`, standing in for an empty `co_lnotab`.
fn alloc_empty_bytes(arena: &Arena) -> u64 {
    let size = layout::type_size("PyBytesObject").unwrap();
    arena.alloc(size as usize)
}

fn alloc_code(
    arena: &Arena,
    filename_addr: u64,
    name_addr: u64,
    lnotab_addr: u64,
    firstlineno: i32,
) -> u64 {
    let size = layout::type_size("PyCodeObject").unwrap();
    let addr = arena.alloc(size as usize);
    arena.put_i32(addr, 24, firstlineno);
    arena.put_u64(addr, 32, filename_addr);
    arena.put_u64(addr, 40, name_addr);
    arena.put_u64(addr, 48, lnotab_addr);
    addr
}

fn alloc_frame(arena: &Arena, back: u64, code_addr: u64, globals: u64, locals: u64) -> u64 {
    let size = layout::type_size("PyFrameObject").unwrap();
    let addr = arena.alloc(size as usize);
    arena.put_u64(addr, 24, back);
    arena.put_u64(addr, 32, code_addr);
    arena.put_u64(addr, 40, globals);
    arena.put_u64(addr, 48, locals);
    arena.put_i32(addr, 56, 0); // f_lasti: always 0, lnotab is empty
    addr
}

fn eval_frame(frame_addr: u64) -> FixtureFrame {
    let mut variables = HashMap::new();
    variables.insert("f".to_owned(), Value::new(frame_addr, "PyFrameObject"));
    FixtureFrame {
        function_name: EVAL_FRAME.to_owned(),
        variables,
        registers: HashMap::new(),
    }
}

/// A four-Python-frame call chain (`<module>` -> `fc` -> `fb` -> `fa`),
/// stopped as if inside `abs(1)` called from `fa` -- the same scenario as
/// `examples/original_source/tests/test_py_bt.py::test_simple`.
struct CallChain {
    filename: String,
    target: LocalTarget,
    #[allow(dead_code)]
    arena: Arena,
}

impl CallChain {
    fn build() -> CallChain {
        let code = "\
def fa():
    abs(1)
    return 1


def fb():
    1 + 1
    fa()


def fc():
    fb()


fc()
";
        let filename = write_temp_source("call_chain.py", code);
        let arena = Arena::new();

        let str_type = arena.alloc_type("str");
        let filename_obj = alloc_str(&arena, str_type, &filename);
        let name_module = alloc_str(&arena, str_type, "<module>");
        let name_fc = alloc_str(&arena, str_type, "fc");
        let name_fb = alloc_str(&arena, str_type, "fb");
        let name_fa = alloc_str(&arena, str_type, "fa");
        let lnotab = alloc_empty_bytes(&arena);

        let code_module = alloc_code(&arena, filename_obj, name_module, lnotab, 15);
        let code_fc = alloc_code(&arena, filename_obj, name_fc, lnotab, 12);
        let code_fb = alloc_code(&arena, filename_obj, name_fb, lnotab, 8);
        let code_fa = alloc_code(&arena, filename_obj, name_fa, lnotab, 2);

        let frame_module = alloc_frame(&arena, 0, code_module, 0, 0);
        let frame_fc = alloc_frame(&arena, frame_module, code_fc, 0, 0);
        let frame_fb = alloc_frame(&arena, frame_fc, code_fb, 0, 0);
        let frame_fa = alloc_frame(&arena, frame_fb, code_fa, 0, 0);

        let mut target = LocalTarget::new();
        // Newest first: `fa`'s eval frame is innermost.
        target.frames = vec![
            eval_frame(frame_fa),
            eval_frame(frame_fb),
            eval_frame(frame_fc),
            eval_frame(frame_module),
        ];

        CallChain {
            filename,
            target,
            arena,
        }
    }
}

impl Drop for CallChain {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.filename);
    }
}

#[test]
fn test_py_bt_renders_oldest_first_traceback() {
    let chain = CallChain::build();
    let config = Config::default();
    let mut session = Session::new();

    let expected = format!(
        "Traceback (most recent call last):\n  \
         File \"{f}\", line 15, in <module>\n    fc()\n  \
         File \"{f}\", line 12, in fc\n    fb()\n  \
         File \"{f}\", line 8, in fb\n    fa()\n  \
         File \"{f}\", line 2, in fa\n    abs(1)\n",
        f = chain.filename
    );

    assert_eq!(session.py_bt(&chain.target, &config), expected);
}

#[test]
fn test_py_bt_skips_intervening_native_frames() {
    // A C-extension frame between `fb`'s and `fa`'s eval frames (spec §11's
    // `test_c_extension`): invisible to py-bt since it never matches the
    // eval-loop precondition filter.
    let mut chain = CallChain::build();
    let native = FixtureFrame {
        function_name: "test_extension_eggs".to_owned(),
        variables: HashMap::new(),
        registers: HashMap::new(),
    };
    chain.target.frames.insert(1, native);

    let config = Config::default();
    let mut session = Session::new();
    let out = session.py_bt(&chain.target, &config);
    assert_eq!(out.lines().count(), 9); // header + 4 frames * 2 lines
    assert!(!out.contains("test_extension_eggs"));
}

#[test]
fn test_py_bt_with_no_python_frames_reports_fixed_message() {
    let target = LocalTarget::new();
    let config = Config::default();
    let mut session = Session::new();
    assert_eq!(session.py_bt(&target, &config), "No Python traceback found");
}

#[test]
fn test_py_bt_ignores_frames_that_fail_the_precondition_filter() {
    let mut target = LocalTarget::new();
    target.frames = vec![FixtureFrame {
        function_name: "__libc_start_main".to_owned(),
        variables: HashMap::new(),
        registers: HashMap::new(),
    }];
    let config = Config::default();
    let mut session = Session::new();
    assert_eq!(session.py_bt(&target, &config), "No Python traceback found");
}

#[test]
fn test_py_list_default_window_marks_active_line() {
    let chain = CallChain::build();
    let config = Config::default();
    let mut session = Session::new();
    session.py_bt(&chain.target, &config); // captures the stack, cursor at fa

    // Blank source lines still get the `{:>5}    ` prefix with nothing after
    // it, so lines 4 and 5 carry four trailing spaces before the newline
    // (matching the original fixture's own blank-line rendering in
    // test_py_list.py). Spelled out with explicit `\n`/`    ` rather than a
    // multi-line raw literal so the trailing spaces survive formatting.
    let expected = concat!(
        "    1    def fa():\n",
        "   >2        abs(1)\n",
        "    3        return 1\n",
        "    4    \n",
        "    5    \n",
        "    6    def fb():\n",
        "    7        1 + 1\n",
    );
    assert_eq!(session.py_list(&chain.target, &config, None, None), expected);
}

#[test]
fn test_py_list_explicit_start() {
    let chain = CallChain::build();
    let config = Config::default();
    let mut session = Session::new();
    session.py_bt(&chain.target, &config);

    let out = session.py_list(&chain.target, &config, Some(1), None);
    // `py-list N` with no end: a fixed ten-line window starting at N.
    assert_eq!(out.lines().count(), 11);
    assert!(out.starts_with("    1    def fa():"));
}

#[test]
fn test_py_list_explicit_start_and_end() {
    let chain = CallChain::build();
    let config = Config::default();
    let mut session = Session::new();
    session.py_bt(&chain.target, &config);

    let expected = "\
    1    def fa():
   >2        abs(1)
    3        return 1
";
    assert_eq!(
        session.py_list(&chain.target, &config, Some(1), Some(3)),
        expected
    );
}

#[test]
fn test_py_up_and_py_down_move_the_cursor() {
    let chain = CallChain::build();
    let config = Config::default();
    let mut session = Session::new();
    session.py_bt(&chain.target, &config); // cursor starts at fa (index 0)

    let f = &chain.filename;
    assert_eq!(
        session.py_up(&chain.target, &config),
        format!("  File \"{}\", line 8, in fb\n    fa()", f)
    );
    assert_eq!(
        session.py_up(&chain.target, &config),
        format!("  File \"{}\", line 12, in fc\n    fb()", f)
    );
    assert_eq!(
        session.py_up(&chain.target, &config),
        format!("  File \"{}\", line 15, in <module>\n    fc()", f)
    );
    assert_eq!(session.py_up(&chain.target, &config), "*** Oldest frame");

    assert_eq!(
        session.py_down(&chain.target, &config),
        format!("  File \"{}\", line 12, in fc\n    fb()", f)
    );
    assert_eq!(
        session.py_down(&chain.target, &config),
        format!("  File \"{}\", line 8, in fb\n    fa()", f)
    );
    assert_eq!(
        session.py_down(&chain.target, &config),
        format!("  File \"{}\", line 2, in fa\n    abs(1)", f)
    );
    assert_eq!(session.py_down(&chain.target, &config), "*** Newest frame");
}

#[test]
fn test_py_down_at_newest_frame_reports_fixed_message() {
    let chain = CallChain::build();
    let config = Config::default();
    let mut session = Session::new();
    assert_eq!(session.py_down(&chain.target, &config), "*** Newest frame");
}

#[test]
fn test_py_locals_renders_name_value_bindings() {
    let arena = Arena::new();
    let str_type = arena.alloc_type("str");
    let int_type = arena.alloc_type("int");
    let dict_type = arena.alloc_type("dict");

    let key = alloc_str(&arena, str_type, "v");
    let value = alloc_small_int(&arena, int_type, 42);

    // One combined-dict entry: capacity 8 (1-byte index width), 1 live entry.
    let dk_size: i64 = 8;
    let width = 1u64;
    let indices_len = dk_size as u64 * width;
    let entry_size = layout::PYDICTKEYENTRY_SIZE;
    let keys_addr = arena.alloc((40 + indices_len + entry_size) as usize);
    arena.put_i64(keys_addr, 8, dk_size);
    arena.put_i64(keys_addr, 32, 1); // dk_nentries
    let entries_addr = keys_addr + 40 + indices_len;
    arena.put_u64(entries_addr, 8, key); // me_key
    arena.put_u64(entries_addr, 16, value); // me_value

    let dict_addr = arena.alloc(layout::type_size("PyDictObject").unwrap() as usize);
    arena.put_u64(dict_addr, 8, dict_type);
    arena.put_u64(dict_addr, 32, keys_addr); // ma_keys
                                              // ma_values stays 0: combined dict.

    let filename = write_temp_source("locals.py", "def fa():\n    abs(1)\n");
    let lnotab = alloc_empty_bytes(&arena);
    let name_fa = alloc_str(&arena, str_type, "fa");
    let filename_obj = alloc_str(&arena, str_type, &filename);
    let code_fa = alloc_code(&arena, filename_obj, name_fa, lnotab, 2);
    let frame_fa = alloc_frame(&arena, 0, code_fa, 0, dict_addr);

    let mut target = LocalTarget::new();
    target.frames = vec![eval_frame(frame_fa)];

    let config = Config::default();
    let mut session = Session::new();
    session.py_bt(&target, &config);
    assert_eq!(session.py_locals(&target, &config), "v = 42\n");

    let _ = fs::remove_file(&filename);
}

#[test]
fn test_py_locals_with_no_locals_is_empty() {
    let arena = Arena::new();
    let str_type = arena.alloc_type("str");
    let filename = write_temp_source("no_locals.py", "def fa():\n    abs(1)\n");
    let lnotab = alloc_empty_bytes(&arena);
    let name_fa = alloc_str(&arena, str_type, "fa");
    let filename_obj = alloc_str(&arena, str_type, &filename);
    let code_fa = alloc_code(&arena, filename_obj, name_fa, lnotab, 2);
    let frame_fa = alloc_frame(&arena, 0, code_fa, 0, 0); // f_locals == NULL

    let mut target = LocalTarget::new();
    target.frames = vec![eval_frame(frame_fa)];

    let config = Config::default();
    let mut session = Session::new();
    session.py_bt(&target, &config);
    assert_eq!(session.py_locals(&target, &config), "");

    let _ = fs::remove_file(&filename);
}
