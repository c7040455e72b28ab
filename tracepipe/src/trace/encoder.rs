//! Builds the stage-specific binary envelope from a chunk of packed input
//! records and the metadata the gate hands the stage hooks (spec §4.4).

use rmpv::Value;

use crate::engine::model::PackedRecords;
use crate::trace::error::TraceError;

/// The three stable integer discriminants fixed by the spec's §6 type
/// table. These are a documented choice (see DESIGN.md), not a guess about
/// a host-engine header this crate cannot see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Input = 0,
    Filter = 1,
    PreOutput = 2,
}

/// Everything the encoder needs besides the packed record buffer itself.
pub struct EnvelopeFields<'a> {
    pub kind: EnvelopeKind,
    pub trace_id: &'a str,
    pub plugin_instance: &'a str,
    pub plugin_alias: Option<&'a str>,
    pub start_time: f64,
    pub end_time: f64,
}

/// Encode one envelope: `[now, meta_map]` where `meta_map` carries 6 fields
/// (7 if `plugin_alias` is `Some`). Implements the two-pass records
/// expansion protocol from spec §4.4: `count_pairs` walks the buffer once
/// to validate it and size the output array, `decode` walks it again to
/// extract the `{timestamp, record}` pairs. A malformed pair at either pass
/// aborts with `TraceError::DecodeFailure` and nothing partial is built.
pub fn encode_envelope(
    fields: &EnvelopeFields<'_>,
    packed: &PackedRecords,
    now: f64,
) -> Result<PackedRecords, TraceError> {
    packed.count_pairs()?;
    let records = packed.decode()?;

    let records_value = Value::Array(
        records
            .into_iter()
            .map(|r| {
                Value::Map(vec![
                    (Value::from("timestamp"), Value::F64(r.timestamp)),
                    (Value::from("record"), r.value),
                ])
            })
            .collect(),
    );

    let mut entries = vec![
        (Value::from("type"), Value::from(fields.kind as i64)),
        (Value::from("trace_id"), Value::from(fields.trace_id)),
        (
            Value::from("plugin_instance"),
            Value::from(fields.plugin_instance),
        ),
    ];
    if let Some(alias) = fields.plugin_alias {
        entries.push((Value::from("plugin_alias"), Value::from(alias)));
    }
    entries.push((Value::from("records"), records_value));
    entries.push((Value::from("start_time"), Value::F64(fields.start_time)));
    entries.push((Value::from("end_time"), Value::F64(fields.end_time)));

    let envelope = Value::Array(vec![Value::F64(now), Value::Map(entries)]);
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &envelope).expect("writing to a Vec never fails");
    Ok(PackedRecords(buf))
}
