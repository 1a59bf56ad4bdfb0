//! The compiled-in catalogue of CPython struct layouts.
//!
//! A real LLDB session resolves field offsets and type sizes by asking the
//! debugger's own C type system, which in turn reads them out of the
//! debuggee's DWARF debug info. `remoteprocess` gives us raw memory access
//! but no type system, so this module stands in for that half of the host
//! debugger's capability interface: a static table of the struct layouts
//! CPython's stable ABI has used, keyed by type name exactly as
//! `ob_type->tp_name` would report it.
//!
//! Pointer fields are named the way a C declaration would spell them
//! (`"PyObject *"`); [`Catalog::deref`] strips the trailing `" *"` to find
//! the pointee's own entry in the table.

use std::collections::HashMap;

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub offset: u64,
    pub type_name: &'static str,
    pub bits: Option<(u8, u8)>,
}

const fn field(name: &'static str, offset: u64, type_name: &'static str) -> Field {
    Field {
        name,
        offset,
        type_name,
        bits: None,
    }
}

const fn bitfield(name: &'static str, offset: u64, off: u8, width: u8) -> Field {
    Field {
        name,
        offset,
        type_name: "unsigned int",
        bits: Some((off, width)),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TypeLayout {
    pub size: u64,
    pub fields: &'static [Field],
}

// PyObject_HEAD: ob_refcnt (8), ob_type (8) -> 16 bytes.
const PYOBJECT_HEAD: u64 = 16;
// PyObject_VAR_HEAD additionally carries ob_size (8) -> 24 bytes.
const PYVAROBJECT_HEAD: u64 = 24;

const PYOBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
];

const PYVAROBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
    field("ob_size", 16, "Py_ssize_t"),
];

const PYTYPEOBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
    field("ob_size", 16, "Py_ssize_t"),
    field("tp_name", 24, "char *"),
    field("tp_basicsize", 32, "Py_ssize_t"),
    field("tp_dict", 264, "PyObject *"),
];

const PYLONGOBJECT_FIELDS: &[Field] = PYVAROBJECT_FIELDS;
/// Offset of the inline `ob_digit[]` array, immediately after the var header.
pub const PYLONG_DIGITS_OFFSET: u64 = PYVAROBJECT_HEAD;

const PYFLOATOBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
    field("ob_fval", 16, "double"),
];

const PYBYTESOBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
    field("ob_size", 16, "Py_ssize_t"),
    field("ob_shash", 24, "Py_hash_t"),
    field("ob_sval", 32, "char"),
];
/// `ob_sval` is an inline `char[1]`; its load address is its own offset.
pub const PYBYTES_SVAL_OFFSET: u64 = 32;

// PyASCIIObject: header(16) + length(8) + hash(8) + state(4, padded to 8) + wstr(8) = 48.
const PYASCIIOBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
    field("length", 16, "Py_ssize_t"),
    field("hash", 24, "Py_hash_t"),
    bitfield("interned", 32, 0, 2),
    bitfield("kind", 32, 2, 3),
    bitfield("compact", 32, 5, 1),
    bitfield("ascii", 32, 6, 1),
    bitfield("ready", 32, 7, 1),
    field("wstr", 40, "wchar_t *"),
];
pub const PYASCIIOBJECT_SIZE: u64 = 48;

// PyCompactUnicodeObject adds utf8_length/utf8/wstr_length after PyASCIIObject.
const PYCOMPACTUNICODEOBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
    field("length", 16, "Py_ssize_t"),
    field("hash", 24, "Py_hash_t"),
    bitfield("interned", 32, 0, 2),
    bitfield("kind", 32, 2, 3),
    bitfield("compact", 32, 5, 1),
    bitfield("ascii", 32, 6, 1),
    bitfield("ready", 32, 7, 1),
    field("wstr", 40, "wchar_t *"),
    field("utf8_length", 48, "Py_ssize_t"),
    field("utf8", 56, "char *"),
    field("wstr_length", 64, "Py_ssize_t"),
];
pub const PYCOMPACTUNICODEOBJECT_SIZE: u64 = 72;

const PYLISTOBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
    field("ob_size", 16, "Py_ssize_t"),
    field("ob_item", 24, "PyObject **"),
    field("allocated", 32, "Py_ssize_t"),
];

const PYTUPLEOBJECT_FIELDS: &[Field] = PYVAROBJECT_FIELDS;
/// `ob_item` is an inline `PyObject *[1]`, unlike list's out-of-line array.
pub const PYTUPLE_ITEM_OFFSET: u64 = PYVAROBJECT_HEAD;

const SETENTRY_FIELDS: &[Field] = &[
    field("key", 0, "PyObject *"),
    field("hash", 8, "Py_hash_t"),
];
pub const SETENTRY_SIZE: u64 = 16;

const PYSETOBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
    field("fill", 16, "Py_ssize_t"),
    field("used", 24, "Py_ssize_t"),
    field("mask", 32, "Py_ssize_t"),
    field("table", 40, "setentry *"),
    field("hash", 48, "Py_hash_t"),
    field("finger", 56, "Py_ssize_t"),
    field("smalltable", 64, "setentry"),
];

const PYDICTKEYENTRY_FIELDS: &[Field] = &[
    field("me_hash", 0, "Py_hash_t"),
    field("me_key", 8, "PyObject *"),
    field("me_value", 16, "PyObject *"),
];
pub const PYDICTKEYENTRY_SIZE: u64 = 24;

// Modern PyDictKeysObject: carries dk_indices, variable-width index array
// followed by the packed entries.
const PYDICTKEYSOBJECT_FIELDS: &[Field] = &[
    field("dk_refcnt", 0, "Py_ssize_t"),
    field("dk_size", 8, "Py_ssize_t"),
    field("dk_lookup", 16, "void *"),
    field("dk_usable", 24, "Py_ssize_t"),
    field("dk_nentries", 32, "Py_ssize_t"),
    field("dk_indices", 40, "char"),
];
pub const PYDICTKEYSOBJECT_INDICES_OFFSET: u64 = 40;

// Legacy PyDictKeysObject: dk_entries sits directly where dk_indices would,
// with no index vector in front of it. The absence of `dk_indices` as a
// field is what `Catalog::child` keys off to pick the layout branch, the
// way the original pretty-printer probes `indices.IsValid()`.
const PYDICTKEYSOBJECT_LEGACY_FIELDS: &[Field] = &[
    field("dk_refcnt", 0, "Py_ssize_t"),
    field("dk_size", 8, "Py_ssize_t"),
    field("dk_lookup", 16, "void *"),
    field("dk_usable", 24, "Py_ssize_t"),
    field("dk_nentries", 32, "Py_ssize_t"),
    field("dk_entries", 40, "PyDictKeyEntry"),
];
pub const PYDICTKEYSOBJECT_ENTRIES_OFFSET: u64 = 40;

const PYDICTOBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
    field("ma_used", 16, "Py_ssize_t"),
    field("ma_version_tag", 24, "uint64_t"),
    field("ma_keys", 32, "PyDictKeysObject *"),
    field("ma_values", 40, "PyObject **"),
];

const PYCODEOBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
    field("co_argcount", 16, "int"),
    field("co_firstlineno", 24, "int"),
    field("co_filename", 32, "PyObject *"),
    field("co_name", 40, "PyObject *"),
    field("co_lnotab", 48, "PyBytesObject *"),
];

const PYFRAMEOBJECT_FIELDS: &[Field] = &[
    field("ob_refcnt", 0, "Py_ssize_t"),
    field("ob_type", 8, "PyTypeObject *"),
    field("ob_size", 16, "Py_ssize_t"),
    field("f_back", 24, "PyFrameObject *"),
    field("f_code", 32, "PyCodeObject *"),
    field("f_globals", 40, "PyObject *"),
    field("f_locals", 48, "PyObject *"),
    field("f_lasti", 56, "int"),
    field("f_lineno", 60, "int"),
];

lazy_static::lazy_static! {
    static ref CATALOG: HashMap<&'static str, TypeLayout> = {
        let mut m = HashMap::new();
        m.insert("PyObject", TypeLayout { size: PYOBJECT_HEAD, fields: PYOBJECT_FIELDS });
        m.insert("PyVarObject", TypeLayout { size: PYVAROBJECT_HEAD, fields: PYVAROBJECT_FIELDS });
        m.insert("PyTypeObject", TypeLayout { size: 272, fields: PYTYPEOBJECT_FIELDS });
        m.insert("PyLongObject", TypeLayout { size: PYVAROBJECT_HEAD, fields: PYLONGOBJECT_FIELDS });
        m.insert("PyBoolObject", TypeLayout { size: PYVAROBJECT_HEAD, fields: PYLONGOBJECT_FIELDS });
        m.insert("PyFloatObject", TypeLayout { size: 24, fields: PYFLOATOBJECT_FIELDS });
        m.insert("PyBytesObject", TypeLayout { size: 33, fields: PYBYTESOBJECT_FIELDS });
        m.insert("PyASCIIObject", TypeLayout { size: PYASCIIOBJECT_SIZE, fields: PYASCIIOBJECT_FIELDS });
        m.insert("PyCompactUnicodeObject", TypeLayout { size: PYCOMPACTUNICODEOBJECT_SIZE, fields: PYCOMPACTUNICODEOBJECT_FIELDS });
        m.insert("PyUnicodeObject", TypeLayout { size: PYCOMPACTUNICODEOBJECT_SIZE, fields: PYCOMPACTUNICODEOBJECT_FIELDS });
        m.insert("PyListObject", TypeLayout { size: 40, fields: PYLISTOBJECT_FIELDS });
        m.insert("PyTupleObject", TypeLayout { size: PYVAROBJECT_HEAD, fields: PYTUPLEOBJECT_FIELDS });
        m.insert("setentry", TypeLayout { size: SETENTRY_SIZE, fields: SETENTRY_FIELDS });
        m.insert("PySetObject", TypeLayout { size: 200, fields: PYSETOBJECT_FIELDS });
        m.insert("PyFrozenSetObject", TypeLayout { size: 200, fields: PYSETOBJECT_FIELDS });
        m.insert("PyDictKeyEntry", TypeLayout { size: PYDICTKEYENTRY_SIZE, fields: PYDICTKEYENTRY_FIELDS });
        m.insert("PyDictKeysObject", TypeLayout { size: 40, fields: PYDICTKEYSOBJECT_FIELDS });
        m.insert("PyDictKeysObjectLegacy", TypeLayout { size: 40, fields: PYDICTKEYSOBJECT_LEGACY_FIELDS });
        m.insert("PyDictObject", TypeLayout { size: 48, fields: PYDICTOBJECT_FIELDS });
        m.insert("PyCodeObject", TypeLayout { size: 56, fields: PYCODEOBJECT_FIELDS });
        m.insert("PyFrameObject", TypeLayout { size: 64, fields: PYFRAMEOBJECT_FIELDS });
        m.insert("Py_ssize_t", TypeLayout { size: 8, fields: &[] });
        m.insert("Py_hash_t", TypeLayout { size: 8, fields: &[] });
        m.insert("int", TypeLayout { size: 4, fields: &[] });
        m.insert("double", TypeLayout { size: 8, fields: &[] });
        m.insert("char", TypeLayout { size: 1, fields: &[] });
        // 32-bit digit, 30-bit SHIFT; see `crate::introspector::DIGIT_SHIFT`.
        m.insert("digit", TypeLayout { size: 4, fields: &[] });
        m
    };
}

fn base_type_name(type_name: &str) -> &str {
    type_name.trim_end_matches(" *").trim_end_matches('*').trim()
}

fn is_pointer(type_name: &str) -> bool {
    type_name.ends_with('*')
}

/// Looks up a named C type's size in bytes.
pub fn type_size(type_name: &str) -> Result<u64> {
    if is_pointer(type_name) {
        return Ok(8);
    }
    CATALOG
        .get(type_name)
        .map(|t| t.size)
        .ok_or_else(|| anyhow::format_err!("unknown type {}", type_name))
}

/// Looks up a named field of `type_name`, returning its offset and declared
/// type (and bitfield spec, if any).
pub fn field_of(type_name: &str, field_name: &str) -> Result<Field> {
    let layout = CATALOG
        .get(type_name)
        .ok_or_else(|| anyhow::format_err!("unknown type {}", type_name))?;
    layout
        .fields
        .iter()
        .find(|f| f.name == field_name)
        .copied()
        .ok_or_else(|| anyhow::format_err!("{} has no field {}", type_name, field_name))
}

/// The pointee type name of a pointer-typed declaration, e.g. `"PyObject *"`
/// -> `"PyObject"`.
pub fn pointee(type_name: &str) -> Result<&str> {
    if !is_pointer(type_name) {
        bail!("{} is not a pointer type", type_name);
    }
    Ok(base_type_name(type_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_size_is_eight() {
        assert_eq!(type_size("PyObject *").unwrap(), 8);
    }

    #[test]
    fn test_pyobject_field() {
        let f = field_of("PyObject", "ob_type").unwrap();
        assert_eq!(f.offset, 8);
        assert_eq!(f.type_name, "PyTypeObject *");
    }

    #[test]
    fn test_ascii_state_bitfield() {
        let f = field_of("PyASCIIObject", "kind").unwrap();
        assert_eq!(f.bits, Some((2, 3)));
    }

    #[test]
    fn test_pointee() {
        assert_eq!(pointee("PyFrameObject *").unwrap(), "PyFrameObject");
    }

    #[test]
    fn test_legacy_dict_keys_has_no_indices() {
        assert!(field_of("PyDictKeysObjectLegacy", "dk_indices").is_err());
        assert!(field_of("PyDictKeysObjectLegacy", "dk_entries").is_ok());
    }
}
