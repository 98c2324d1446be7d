//! The in-memory data model assembled from a parsed PSF file.
//!
//! Everything here is immutable once built by [`crate::reader`] and is plain data:
//! no parsing, no I/O. `Serialize`/`Deserialize` derives exist solely so
//! [`crate::cache`] can round-trip a [`PsfDataset`] to disk.

use std::collections::HashMap;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A literal value as it appears in a `HEADER` or `PROP` named-value list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Real(f64),
}

/// An ordered `name -> value` list, as produced by the grammar's `named_values` rule.
pub type NamedValues = Vec<(String, PropValue)>;

/// A struct type's ordered member list (member name -> member type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StructType {
    members: Vec<(String, PsfType)>,
}

impl StructType {
    pub(crate) fn new(members: Vec<(String, PsfType)>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> &[(String, PsfType)] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&PsfType> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

/// A declared `TYPE` entry: either primitive (`struct_def` is `None`) or a struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsfType {
    pub name: String,
    /// Lowercase, space-joined kind keywords, e.g. `"float double"`, `"complex double"`.
    pub kind: String,
    pub struct_def: Option<StructType>,
    pub properties: NamedValues,
}

impl PsfType {
    pub(crate) fn new(name: String, kind: String, struct_def: Option<StructType>, properties: NamedValues) -> Self {
        Self { name, kind, struct_def, properties }
    }

    pub fn units(&self) -> &str {
        self.properties
            .iter()
            .find(|(k, _)| k == "units")
            .and_then(|(_, v)| match v {
                PropValue::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .unwrap_or("")
    }

    pub fn is_complex(&self) -> bool {
        self.kind.contains("complex")
    }

    pub fn is_float(&self) -> bool {
        self.kind.contains("float")
    }

    pub fn is_struct(&self) -> bool {
        self.struct_def.is_some()
    }
}

/// A sweep's independent variable: its declared type and the assembled abscissa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub name: String,
    pub type_name: String,
    /// `1` = linear, `3` = logarithmic; absent is distinct from either.
    pub grid: Option<i64>,
    pub units: String,
    pub abscissa: Vec<f64>,
}

/// What a `TRACE` entry's type reference resolves to, in place of string-tagged dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TraceShape {
    Scalar { type_name: String },
    Struct { type_name: String },
    Group { group_name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,
    pub shape: TraceShape,
}

/// A `"name" GROUP count` header's absorbed members, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroupDef {
    pub members: Vec<(String, String)>,
}

/// A signal's samples: either a dense swept series, or a single DC scalar.
///
/// `ScalarInt` has no counterpart in the source material's minimal sketch; it exists
/// so a DC entry whose type is neither float, complex, nor string (e.g. a bare `int`
/// kind) still has a typed home instead of falling back to an untyped container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ordinate {
    RealSeries(Vec<f64>),
    ComplexSeries(Vec<Complex64>),
    /// A swept int-kinded signal. Not in the source material's minimal sketch, but
    /// required by the "int-kinded have integer ordinates" invariant for swept traces,
    /// not just DC scalars.
    IntSeries(Vec<i64>),
    ScalarFloat { value: f64, units: String },
    ScalarComplex(Complex64),
    ScalarInt(i64),
    ScalarString(String),
}

impl Ordinate {
    pub fn len(&self) -> usize {
        match self {
            Ordinate::RealSeries(v) => v.len(),
            Ordinate::ComplexSeries(v) => v.len(),
            Ordinate::IntSeries(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_swept(&self) -> bool {
        matches!(self, Ordinate::RealSeries(_) | Ordinate::ComplexSeries(_) | Ordinate::IntSeries(_))
    }
}

/// A named, typed output: a swept waveform or a DC scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub type_name: String,
    pub units: String,
    /// The type's declared name, used by front-ends as an accessor glyph (e.g. `V`, `I`).
    pub access: String,
    pub ordinate: Ordinate,
}

/// An insertion-order-preserving `name -> Signal` table with uniqueness enforced on insert.
///
/// A plain `Vec` of names alongside a `HashMap` is simpler than pulling in an ordered-map
/// crate for the one place this crate needs one, and keeps lookup O(1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalTable {
    order: Vec<String>,
    by_name: HashMap<String, Signal>,
}

impl SignalTable {
    pub(crate) fn insert(&mut self, signal: Signal) -> Result<(), Error> {
        if self.by_name.contains_key(&signal.name) {
            return Err(Error::Integrity(format!("duplicate signal name '{}'", signal.name)));
        }
        self.order.push(signal.name.clone());
        self.by_name.insert(signal.name.clone(), signal);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Signal> {
        self.by_name.get(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.order.iter().map(move |n| self.by_name.get(n).expect("order/by_name kept in sync"))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// The fully assembled contents of a PSF file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsfDataset {
    pub header: NamedValues,
    pub types: HashMap<String, PsfType>,
    pub sweeps: Vec<Sweep>,
    pub traces: Vec<Trace>,
    pub groups: HashMap<String, GroupDef>,
    pub signals: SignalTable,
}

impl PsfDataset {
    pub fn get_sweep(&self, index: usize) -> Option<&Sweep> {
        self.sweeps.get(index)
    }

    pub fn get_signal(&self, name: &str) -> Result<&Signal, Error> {
        self.signals.get(name).ok_or_else(|| Error::UnknownSignal {
            name: name.to_string(),
            available: self.signals.names().to_vec(),
        })
    }

    pub fn all_signals(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter()
    }

    pub fn log_x(&self, sweep_index: usize) -> bool {
        self.get_sweep(sweep_index).map(|s| s.grid == Some(3)).unwrap_or(false)
    }

    pub fn log_y(&self, sweep_index: usize) -> bool {
        self.log_x(sweep_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(name: &str) -> Signal {
        Signal {
            name: name.to_string(),
            type_name: "float_double".to_string(),
            units: "V".to_string(),
            access: "V".to_string(),
            ordinate: Ordinate::ScalarFloat { value: 1.0, units: "V".to_string() },
        }
    }

    #[test]
    fn signal_table_preserves_insertion_order() {
        let mut table = SignalTable::default();
        table.insert(signal("b")).unwrap();
        table.insert(signal("a")).unwrap();
        assert_eq!(table.names(), ["b", "a"]);
        assert_eq!(table.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["b", "a"]);
    }

    #[test]
    fn signal_table_rejects_duplicate_names() {
        let mut table = SignalTable::default();
        table.insert(signal("a")).unwrap();
        let err = table.insert(signal("a")).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }

    #[test]
    fn log_x_requires_grid_three() {
        let mut ds = PsfDataset {
            header: vec![],
            types: HashMap::new(),
            sweeps: vec![Sweep {
                name: "freq".to_string(),
                type_name: "float_double".to_string(),
                grid: Some(1),
                units: "Hz".to_string(),
                abscissa: vec![1.0, 2.0],
            }],
            traces: vec![],
            groups: HashMap::new(),
            signals: SignalTable::default(),
        };
        assert!(!ds.log_x(0));
        ds.sweeps[0].grid = Some(3);
        assert!(ds.log_x(0));
        ds.sweeps[0].grid = None;
        assert!(!ds.log_x(0));
    }
}
