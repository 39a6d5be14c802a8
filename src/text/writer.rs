//! Rendering of bundles, references and stream lines as text.
//!
//! Every function here produces exactly what the tokenizer accepts, so a
//! value written by [`write_holder`] reads back as an equal [`Holder`].

use std::fmt::Write as _;

use crate::bundle::{Bundle, Holder, PrimitiveArray};
use crate::identity::TypeName;
use crate::metadata::MetaValue;
use crate::reference::EntityRef;
use crate::text::tokenizer::NULL;
use crate::text::FormatVersion;

/// Append `text` as a double-quoted string with escapes.
pub fn write_quoted(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// `&<version>:"label";`
pub fn header_line(version: FormatVersion, label: &str) -> String {
    let mut out = format!("&{}:", version.encode());
    write_quoted(&mut out, label);
    out.push(';');
    out
}

/// `<id>@"TypeName";`
pub fn type_alias_line(id: u32, name: &TypeName) -> String {
    let mut out = format!("{}@", id);
    write_quoted(&mut out, name.as_str());
    out.push(';');
    out
}

/// `~NAME=value;` with the type suffix of `value`.
pub fn metadata_line(name: &str, value: &MetaValue) -> String {
    let mut out = format!("~{}=", name);
    match value {
        MetaValue::Long(v) => {
            let _ = write!(out, "{}L", v);
        }
        MetaValue::Double(v) => {
            let _ = write!(out, "{:?}D", v);
        }
        MetaValue::Bool(v) => out.push_str(if *v { "TB" } else { "FB" }),
        MetaValue::Str(s) => write_quoted(&mut out, s),
    }
    out.push(';');
    out
}

/// Full reference: `r<t>:<e>[v<ver>][/"alias"]*`.
pub fn write_reference(out: &mut String, reference: &EntityRef) {
    let _ = write!(out, "r{}:{}", reference.type_id, reference.entity_id);
    if let Some(version) = reference.version {
        let _ = write!(out, "v{}", version);
    }
    for alias in &reference.aliases {
        out.push('/');
        write_quoted(out, alias);
    }
}

/// A tagged value as it appears after `name=`.
pub fn write_holder(out: &mut String, holder: &Holder) {
    match holder {
        Holder::Null => out.push(NULL),
        Holder::Array(array) => write_primitive_array(out, array),
        Holder::Boxed(array) => {
            let _ = write!(out, "A{}{}[", array.len(), array.kind().tag());
            for (idx, item) in array.items().iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_element(out, item);
            }
            out.push(']');
        }
        Holder::Ref(reference) => write_reference(out, reference),
        scalar => {
            let tag = match scalar {
                Holder::Bool(_) => 'b',
                Holder::Char(_) => 'c',
                Holder::Byte(_) => 'x',
                Holder::Short(_) => 'h',
                Holder::Int(_) => 'i',
                Holder::Long(_) => 'l',
                Holder::Float(_) => 'f',
                Holder::Double(_) => 'd',
                Holder::Str(_) => 's',
                _ => 'e',
            };
            out.push(tag);
            write_element(out, scalar);
        }
    }
}

/// A value without its tag, as used inside arrays.
fn write_element(out: &mut String, holder: &Holder) {
    match holder {
        Holder::Null => out.push(NULL),
        Holder::Bool(v) => out.push(if *v { 'T' } else { 'F' }),
        Holder::Char(c) => write_quoted(out, &c.to_string()),
        Holder::Byte(v) => {
            let _ = write!(out, "{:02x}", *v as u8);
        }
        Holder::Short(v) => {
            let _ = write!(out, "{}", v);
        }
        Holder::Int(v) => {
            let _ = write!(out, "{}", v);
        }
        Holder::Long(v) => {
            let _ = write!(out, "{}", v);
        }
        // Debug formatting is the shortest form that parses back exactly.
        Holder::Float(v) => {
            let _ = write!(out, "{:?}", v);
        }
        Holder::Double(v) => {
            let _ = write!(out, "{:?}", v);
        }
        Holder::Str(s) | Holder::Name(s) => write_quoted(out, s),
        Holder::Ref(reference) => write_reference(out, reference),
        Holder::Array(_) | Holder::Boxed(_) => write_holder(out, holder),
    }
}

fn write_primitive_array(out: &mut String, array: &PrimitiveArray) {
    let _ = write!(out, "a{}{}[", array.len(), array.kind().tag());
    match array {
        // Hex pairs are self-delimiting; bytes are written without commas.
        PrimitiveArray::Byte(bytes) => {
            for b in bytes {
                let _ = write!(out, "{:02x}", *b as u8);
            }
        }
        PrimitiveArray::Bool(v) => join(out, v.iter().map(|b| Holder::Bool(*b))),
        PrimitiveArray::Char(v) => join(out, v.iter().map(|c| Holder::Char(*c))),
        PrimitiveArray::Short(v) => join(out, v.iter().map(|n| Holder::Short(*n))),
        PrimitiveArray::Int(v) => join(out, v.iter().map(|n| Holder::Int(*n))),
        PrimitiveArray::Long(v) => join(out, v.iter().map(|n| Holder::Long(*n))),
        PrimitiveArray::Float(v) => join(out, v.iter().map(|n| Holder::Float(*n))),
        PrimitiveArray::Double(v) => join(out, v.iter().map(|n| Holder::Double(*n))),
    }
    out.push(']');
}

fn join(out: &mut String, items: impl Iterator<Item = Holder>) {
    for (idx, item) in items.enumerate() {
        if idx > 0 {
            out.push(',');
        }
        write_element(out, &item);
    }
}

/// Header plus `=(...)` body of one definition, without the trailing `;`.
///
/// `super_type_ids` lists the wire type id of each bundle in the super
/// chain, nearest first.
pub fn write_definition(
    out: &mut String,
    header: &EntityRef,
    bundle: &Bundle,
    super_type_ids: &[u32],
) {
    write_reference(out, header);
    out.push_str("=(");
    let mut first = true;
    if let (Some(super_bundle), Some((&type_id, rest))) =
        (bundle.super_bundle(), super_type_ids.split_first())
    {
        let super_header = EntityRef::new(type_id, 0).with_version(super_bundle.version());
        write_definition(out, &super_header, super_bundle, rest);
        first = false;
    }
    for (name, holder) in bundle.fields() {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(name);
        out.push('=');
        write_holder(out, holder);
    }
    out.push(')');
}
