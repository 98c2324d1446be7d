//! Combines parser output with raw value data into the final [`PsfDataset`]: resolves
//! type references, expands struct/group traces into member signals, folds complex
//! pairs, and builds DC operating-point scalars.

use std::collections::HashMap;
use std::path::Path;

use num_complex::Complex64;

use crate::cache;
use crate::error::Error;
use crate::parser::{self, Number, RawSample, RawValues};
use crate::types::{GroupDef, Ordinate, PsfDataset, PsfType, Signal, SignalTable, Trace, TraceShape};

/// Tuning knobs for [`load_with_options`], exposed as a struct (rather than positional
/// booleans) so call sites stay self-documenting.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Separator joining a struct trace's name to each member name. Default `":"`.
    pub sep: String,
    pub use_cache: bool,
    pub update_cache: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { sep: ":".to_string(), use_cache: true, update_cache: true }
    }
}

/// Reads and assembles a PSF file using the documented defaults.
pub fn load(path: impl AsRef<Path>) -> Result<PsfDataset, Error> {
    load_with_options(path, &LoadOptions::default())
}

/// Reads and assembles a PSF file, consulting and refreshing the on-disk cache per
/// `options`.
pub fn load_with_options(path: impl AsRef<Path>, options: &LoadOptions) -> Result<PsfDataset, Error> {
    let path = path.as_ref();
    let cache_path = cache::cache_path(path);

    if options.use_cache {
        if let Some(dataset) = cache::try_read(path, &cache_path) {
            return Ok(dataset);
        }
    }

    let bytes = std::fs::read(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    let text = String::from_utf8(bytes).map_err(|_| Error::Encoding { path: path.to_path_buf() })?;

    let sections = parser::parse(&text, Some(path.to_path_buf()))?;
    let dataset = assemble(sections, &options.sep)?;

    if options.update_cache {
        cache::write(&cache_path, &dataset);
    }

    Ok(dataset)
}

fn assemble(sections: parser::ParsedSections, sep: &str) -> Result<PsfDataset, Error> {
    let parser::ParsedSections { header, types, mut sweeps, traces, groups, mut values } = sections;

    for sweep in &mut sweeps {
        if let Some(entry) = take_raw(&mut values, &sweep.name) {
            sweep.abscissa = entry.samples.iter().filter_map(scalar_first).collect();
        }
    }

    let mut signals = SignalTable::default();
    if traces.is_empty() {
        assemble_dc(&mut signals, &types, values)?;
    } else {
        assemble_swept(&mut signals, &types, &traces, &groups, &mut values, sep)?;
        if !values.is_empty() {
            let leftover: Vec<&str> = values.iter().map(|(name, _)| name.as_str()).collect();
            return Err(Error::Integrity(format!(
                "VALUE section has {} entr{} with no matching trace: {}",
                leftover.len(),
                if leftover.len() == 1 { "y" } else { "ies" },
                leftover.join(", ")
            )));
        }
    }

    Ok(PsfDataset { header, types, sweeps, traces, groups, signals })
}

fn take_raw(values: &mut Vec<(String, RawValues)>, name: &str) -> Option<RawValues> {
    let idx = values.iter().position(|(n, _)| n == name)?;
    Some(values.remove(idx).1)
}

fn scalar_first(sample: &RawSample) -> Option<f64> {
    match sample {
        RawSample::Number(Number::Real(v)) => Some(*v),
        RawSample::Number(Number::Int(n)) => Some(*n as f64),
        RawSample::Tuple(t) => t.first().and_then(scalar_first),
        RawSample::Str(_) => None,
    }
}

fn number_to_f64(sample: &RawSample) -> Option<f64> {
    match sample {
        RawSample::Number(Number::Real(v)) => Some(*v),
        RawSample::Number(Number::Int(n)) => Some(*n as f64),
        _ => None,
    }
}

fn number_to_i64(sample: &RawSample) -> Option<i64> {
    match sample {
        RawSample::Number(Number::Int(n)) => Some(*n),
        RawSample::Number(Number::Real(v)) => Some(*v as i64),
        _ => None,
    }
}

fn raw_to_complex(sample: &RawSample) -> Option<Complex64> {
    match sample {
        RawSample::Tuple(t) if t.len() == 2 => {
            let re = number_to_f64(&t[0])?;
            let im = number_to_f64(&t[1])?;
            Some(Complex64::new(re, im))
        }
        _ => None,
    }
}

/// Builds a swept ordinate for `samples`, dispatching on `type_`'s kind: complex pairs
/// fold into `ComplexSeries`, int-family kinds become `IntSeries`, everything else is
/// `RealSeries`.
fn build_swept_ordinate(samples: &[RawSample], type_: &PsfType) -> Result<Ordinate, Error> {
    if type_.is_complex() {
        let values: Vec<Complex64> = samples
            .iter()
            .map(|s| raw_to_complex(s).ok_or_else(|| Error::Integrity(format!("expected a (re, im) pair for '{}'", type_.name))))
            .collect::<Result<_, _>>()?;
        Ok(Ordinate::ComplexSeries(values))
    } else if type_.kind.contains("int") || type_.kind.contains("byte") || type_.kind.contains("long") {
        let values: Vec<i64> = samples
            .iter()
            .map(|s| number_to_i64(s).ok_or_else(|| Error::Integrity(format!("expected integer samples for '{}'", type_.name))))
            .collect::<Result<_, _>>()?;
        Ok(Ordinate::IntSeries(values))
    } else {
        let values: Vec<f64> = samples
            .iter()
            .map(|s| number_to_f64(s).ok_or_else(|| Error::Integrity(format!("expected numeric samples for '{}'", type_.name))))
            .collect::<Result<_, _>>()?;
        Ok(Ordinate::RealSeries(values))
    }
}

fn assemble_swept(
    signals: &mut SignalTable,
    types: &HashMap<String, PsfType>,
    traces: &[Trace],
    groups: &HashMap<String, GroupDef>,
    values: &mut Vec<(String, RawValues)>,
    sep: &str,
) -> Result<(), Error> {
    for trace in traces {
        let raw = take_raw(values, &trace.name)
            .ok_or_else(|| Error::Integrity(format!("missing values for trace '{}'", trace.name)))?;
        match &trace.shape {
            TraceShape::Group { group_name } => {
                let group = groups
                    .get(group_name)
                    .ok_or_else(|| Error::Integrity(format!("trace '{}' references unknown group '{group_name}'", trace.name)))?;
                assemble_group(signals, types, group, raw)?;
            }
            TraceShape::Struct { type_name } => assemble_struct_trace(signals, types, &trace.name, type_name, raw, sep)?,
            TraceShape::Scalar { type_name } => assemble_scalar_trace(signals, types, &trace.name, type_name, raw)?,
        }
    }
    Ok(())
}

fn resolve_type<'a>(types: &'a HashMap<String, PsfType>, trace_name: &str, type_name: &str) -> Result<&'a PsfType, Error> {
    types
        .get(type_name)
        .ok_or_else(|| Error::Integrity(format!("trace '{trace_name}' references unknown type '{type_name}'")))
}

fn assemble_scalar_trace(
    signals: &mut SignalTable,
    types: &HashMap<String, PsfType>,
    trace_name: &str,
    type_name: &str,
    raw: RawValues,
) -> Result<(), Error> {
    let type_ = resolve_type(types, trace_name, type_name)?;
    let ordinate = build_swept_ordinate(&raw.samples, type_)?;
    signals.insert(Signal {
        name: trace_name.to_string(),
        type_name: type_name.to_string(),
        units: type_.units().to_string(),
        access: type_.name.clone(),
        ordinate,
    })
}

fn assemble_struct_trace(
    signals: &mut SignalTable,
    types: &HashMap<String, PsfType>,
    trace_name: &str,
    type_name: &str,
    raw: RawValues,
    sep: &str,
) -> Result<(), Error> {
    let type_ = resolve_type(types, trace_name, type_name)?;
    let struct_def = type_
        .struct_def
        .as_ref()
        .ok_or_else(|| Error::Integrity(format!("trace '{trace_name}' type '{type_name}' is not a struct")))?;

    for (member_index, (member_name, member_type)) in struct_def.members().iter().enumerate() {
        let column = extract_member_column(&raw.samples, member_index, struct_def.members().len(), member_name)?;
        let ordinate = build_swept_ordinate(&column, member_type)?;
        signals.insert(Signal {
            name: format!("{trace_name}{sep}{member_name}"),
            type_name: member_type.name.clone(),
            units: member_type.units().to_string(),
            access: member_type.name.clone(),
            ordinate,
        })?;
    }
    Ok(())
}

fn assemble_group(
    signals: &mut SignalTable,
    types: &HashMap<String, PsfType>,
    group: &GroupDef,
    raw: RawValues,
) -> Result<(), Error> {
    for (member_index, (member_name, member_type_name)) in group.members.iter().enumerate() {
        let member_type = types
            .get(member_type_name)
            .ok_or_else(|| Error::Integrity(format!("group member '{member_name}' references unknown type '{member_type_name}'")))?;
        let column = extract_member_column(&raw.samples, member_index, group.members.len(), member_name)?;
        let ordinate = build_swept_ordinate(&column, member_type)?;
        // Group member names are emitted bare, unlike struct members which are dot/sep-prefixed.
        signals.insert(Signal {
            name: member_name.clone(),
            type_name: member_type_name.clone(),
            units: member_type.units().to_string(),
            access: member_type.name.clone(),
            ordinate,
        })?;
    }
    Ok(())
}

fn extract_member_column(
    samples: &[RawSample],
    member_index: usize,
    member_count: usize,
    member_name: &str,
) -> Result<Vec<RawSample>, Error> {
    samples
        .iter()
        .map(|s| match s {
            RawSample::Tuple(t) => t
                .get(member_index)
                .cloned()
                .ok_or_else(|| Error::Integrity(format!("sample too short for member '{member_name}'"))),
            other if member_count == 1 => Ok(other.clone()),
            _ => Err(Error::Integrity(format!("sample for member '{member_name}' is not a tuple"))),
        })
        .collect()
}

fn assemble_dc(signals: &mut SignalTable, types: &HashMap<String, PsfType>, values: Vec<(String, RawValues)>) -> Result<(), Error> {
    for (name, raw) in values {
        let type_name = raw
            .type_name
            .clone()
            .ok_or_else(|| Error::Integrity(format!("DC entry '{name}' is missing an explicit type name")))?;
        let type_ = types
            .get(&type_name)
            .ok_or_else(|| Error::Integrity(format!("DC entry '{name}' references unknown type '{type_name}'")))?;

        if let Some(struct_def) = &type_.struct_def {
            let sample = raw.samples.first().ok_or_else(|| Error::Integrity(format!("DC entry '{name}' has no value")))?;
            for (member_index, (member_name, member_type)) in struct_def.members().iter().enumerate() {
                let element = extract_dc_element(sample, member_index, struct_def.members().len(), member_name)?;
                let ordinate = dc_scalar_ordinate(&element, member_type)?;
                signals.insert(Signal {
                    name: format!("{name}.{member_name}"),
                    type_name: member_type.name.clone(),
                    units: member_type.units().to_string(),
                    access: member_type.name.clone(),
                    ordinate,
                })?;
            }
        } else {
            let sample = raw.samples.first().ok_or_else(|| Error::Integrity(format!("DC entry '{name}' has no value")))?;
            let ordinate = dc_scalar_ordinate(sample, type_)?;
            signals.insert(Signal {
                name: name.clone(),
                type_name,
                units: type_.units().to_string(),
                access: type_.name.clone(),
                ordinate,
            })?;
        }
    }
    Ok(())
}

fn extract_dc_element(
    sample: &RawSample,
    member_index: usize,
    member_count: usize,
    member_name: &str,
) -> Result<RawSample, Error> {
    match sample {
        RawSample::Tuple(t) => t
            .get(member_index)
            .cloned()
            .ok_or_else(|| Error::Integrity(format!("DC struct entry missing member '{member_name}'"))),
        other if member_count == 1 => Ok(other.clone()),
        _ => Err(Error::Integrity(format!("DC entry for member '{member_name}' is not a struct tuple"))),
    }
}

fn dc_scalar_ordinate(sample: &RawSample, type_: &PsfType) -> Result<Ordinate, Error> {
    if type_.is_float() {
        let value = number_to_f64(sample).ok_or_else(|| Error::Integrity("expected a numeric DC value".to_string()))?;
        Ok(Ordinate::ScalarFloat { value, units: type_.units().to_string() })
    } else if type_.is_complex() {
        let complex = raw_to_complex(sample).ok_or_else(|| Error::Integrity("expected a complex (re, im) pair".to_string()))?;
        Ok(Ordinate::ScalarComplex(complex))
    } else {
        match sample {
            RawSample::Number(Number::Int(n)) => Ok(Ordinate::ScalarInt(*n)),
            RawSample::Number(Number::Real(v)) => Ok(Ordinate::ScalarInt(*v as i64)),
            RawSample::Str(s) => Ok(Ordinate::ScalarString(s.clone())),
            RawSample::Tuple(_) => Err(Error::Integrity("unexpected composite DC value for a non-float/complex type".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn build(src: &str) -> PsfDataset {
        let sections = parse(src, None).unwrap();
        assemble(sections, ":").unwrap()
    }

    #[test]
    fn assembles_ac_linear_sweep_with_complex_trace() {
        let src = r#"
            HEADER "PSFversion" "1.00"
            TYPE
            "float_double" FLOAT DOUBLE PROP("units" "Hz")
            "complex_double" COMPLEX DOUBLE PROP("units" "V")
            SWEEP
            "freq" "float_double" PROP("grid" 1)
            TRACE
            "out" "complex_double"
            VALUE
            "freq" 100.0 200.0
            "out" (1.0 0.0) (2.0 1.0)
            END
        "#;
        let ds = build(src);
        assert_eq!(ds.get_sweep(0).unwrap().abscissa, vec![100.0, 200.0]);
        assert!(!ds.log_x(0));
        let out = ds.get_signal("out").unwrap();
        match &out.ordinate {
            Ordinate::ComplexSeries(v) => {
                assert_eq!(v.len(), 2);
                assert_eq!(v[0], Complex64::new(1.0, 0.0));
                assert_eq!(v[1], Complex64::new(2.0, 1.0));
            }
            other => panic!("expected ComplexSeries, got {other:?}"),
        }
    }

    #[test]
    fn assembles_struct_trace_into_dotted_signals() {
        let src = r#"
            HEADER "PSFversion" "1.00"
            TYPE
            "float_double" FLOAT DOUBLE PROP("units" "Ohm")
            "res_struct" STRUCT( "fn" "float_double" "rn" "float_double" "total" "float_double" )
            SWEEP
            "freq" "float_double"
            TRACE
            "RESref" "res_struct"
            VALUE
            "freq" 1.0 2.0
            "RESref" (1.0 2.0 3.0) (4.0 5.0 6.0)
            END
        "#;
        let ds = build(src);
        assert!(ds.get_signal("RESref:fn").is_ok());
        assert!(ds.get_signal("RESref:rn").is_ok());
        assert!(ds.get_signal("RESref:total").is_ok());
        match &ds.get_signal("RESref:total").unwrap().ordinate {
            Ordinate::RealSeries(v) => assert_eq!(v, &vec![3.0, 6.0]),
            other => panic!("expected RealSeries, got {other:?}"),
        }
    }

    #[test]
    fn assembles_dc_operating_point_scalar() {
        let src = r#"
            HEADER "PSFversion" "1.00"
            TYPE
            "float_double" FLOAT DOUBLE PROP("units" "V")
            VALUE
            "out" "float_double" 3.3
            END
        "#;
        let ds = build(src);
        match &ds.get_signal("out").unwrap().ordinate {
            Ordinate::ScalarFloat { value, units } => {
                assert_eq!(*value, 3.3);
                assert_eq!(units, "V");
            }
            other => panic!("expected ScalarFloat, got {other:?}"),
        }
    }

    #[test]
    fn unknown_signal_lists_available_names() {
        let src = r#"
            HEADER "PSFversion" "1.00"
            TYPE
            "float_double" FLOAT DOUBLE
            VALUE
            "out" "float_double" 1.0
            END
        "#;
        let ds = build(src);
        let err = ds.get_signal("missing").unwrap_err();
        match err {
            Error::UnknownSignal { name, available } => {
                assert_eq!(name, "missing");
                assert_eq!(available, vec!["out".to_string()]);
            }
            other => panic!("expected UnknownSignal, got {other:?}"),
        }
    }

    #[test]
    fn unconsumed_value_entry_is_an_integrity_error() {
        let src = r#"
            HEADER "PSFversion" "1.00"
            TYPE
            "float_double" FLOAT DOUBLE
            SWEEP
            "freq" "float_double"
            TRACE
            "out" "float_double"
            VALUE
            "freq" 1.0 2.0
            "out" 1.0 2.0
            "stray" 9.0 9.0
            END
        "#;
        let sections = parse(src, None).unwrap();
        let err = assemble(sections, ":").unwrap_err();
        match err {
            Error::Integrity(msg) => assert!(msg.contains("stray")),
            other => panic!("expected Integrity, got {other:?}"),
        }
    }

    #[test]
    fn row_major_complex_trace_accumulates_all_samples() {
        let src = r#"
            HEADER "PSFversion" "1.00"
            TYPE
            "float_double" FLOAT DOUBLE
            "complex_double" COMPLEX DOUBLE
            SWEEP
            "freq" "float_double"
            TRACE
            "out" "complex_double"
            VALUE
            "freq" 10.0 "out" (1.0 0.0)
            "freq" 100.0 "out" (2.0 1.0)
            "freq" 1000.0 "out" (3.0 2.0)
            END
        "#;
        let ds = build(src);
        assert_eq!(ds.get_sweep(0).unwrap().abscissa, vec![10.0, 100.0, 1000.0]);
        match &ds.get_signal("out").unwrap().ordinate {
            Ordinate::ComplexSeries(v) => assert_eq!(v.len(), 3),
            other => panic!("expected ComplexSeries, got {other:?}"),
        }
    }
}
