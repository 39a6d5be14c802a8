//! Stream metadata lines and the handlers they are dispatched to.
//!
//! Metadata (`~NAME=value;`) is not stored in the unpacked graph. The
//! unpacker hands every line to the registered [`MetadataHandler`]s as it is
//! read.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

/// Typed metadata value; the wire suffix selects the variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// `123L`
    Long(i64),
    /// `0.5D`
    Double(f64),
    /// `TB` / `FB`
    Bool(bool),
    /// `"text"`
    Str(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Long(v) => write!(f, "{}", v),
            MetaValue::Double(v) => write!(f, "{}", v),
            MetaValue::Bool(v) => write!(f, "{}", v),
            MetaValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Receiver of metadata lines.
///
/// All methods default to ignoring the value, so handlers only implement
/// the kinds they care about.
pub trait MetadataHandler {
    fn on_string(&mut self, _name: &str, _value: &str) {}

    fn on_long(&mut self, _name: &str, _value: i64) {}

    fn on_bool(&mut self, _name: &str, _value: bool) {}

    fn on_double(&mut self, _name: &str, _value: f64) {}
}

/// Route one value to the matching handler method.
pub fn dispatch(handler: &mut dyn MetadataHandler, name: &str, value: &MetaValue) {
    match value {
        MetaValue::Long(v) => handler.on_long(name, *v),
        MetaValue::Double(v) => handler.on_double(name, *v),
        MetaValue::Bool(v) => handler.on_bool(name, *v),
        MetaValue::Str(s) => handler.on_string(name, s),
    }
}

/// Handler that records every line it receives.
///
/// Clones share the same record, so a clone can be registered with an
/// unpacker while the original is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct MetadataRecorder {
    entries: Rc<RefCell<Vec<(String, MetaValue)>>>,
}

impl MetadataRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, MetaValue)> {
        self.entries.borrow().clone()
    }

    /// Last value recorded under `name`.
    pub fn get(&self, name: &str) -> Option<MetaValue> {
        self.entries
            .borrow()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    fn record(&self, name: &str, value: MetaValue) {
        self.entries.borrow_mut().push((name.to_string(), value));
    }
}

impl MetadataHandler for MetadataRecorder {
    fn on_string(&mut self, name: &str, value: &str) {
        self.record(name, MetaValue::Str(value.to_string()));
    }

    fn on_long(&mut self, name: &str, value: i64) {
        self.record(name, MetaValue::Long(value));
    }

    fn on_bool(&mut self, name: &str, value: bool) {
        self.record(name, MetaValue::Bool(value));
    }

    fn on_double(&mut self, name: &str, value: f64) {
        self.record(name, MetaValue::Double(value));
    }
}
