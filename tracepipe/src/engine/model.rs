use std::io::Cursor;

/// A single packed `[timestamp, record]` pair in the engine's canonical
/// binary object format.
#[derive(Debug, Clone)]
pub struct Record {
    pub timestamp: f64,
    pub value: rmpv::Value,
}

/// A back-to-back sequence of packed `[timestamp, record]` pairs, exactly
/// as a chunk would hold them on the wire.
#[derive(Debug, Clone, Default)]
pub struct PackedRecords(pub Vec<u8>);

impl PackedRecords {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, record: &Record) {
        let pair = rmpv::Value::Array(vec![
            rmpv::Value::F64(record.timestamp),
            record.value.clone(),
        ]);
        rmpv::encode::write_value(&mut self.0, &pair).expect("writing to a Vec never fails");
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First pass of the envelope encoder's two-pass protocol: walk every
    /// `[timestamp, record]` pair without keeping the decoded values, so
    /// the caller can size an array header before the second pass extracts
    /// them. Fails on the same malformed input `decode` would reject.
    pub fn count_pairs(&self) -> Result<usize, rmpv::decode::Error> {
        let mut cursor = Cursor::new(self.0.as_slice());
        let mut count = 0;
        while (cursor.position() as usize) < self.0.len() {
            let value = rmpv::decode::read_value(&mut cursor)?;
            match value {
                rmpv::Value::Array(elems) if elems.len() == 2 => count += 1,
                other => return Err(invalid_record(other)),
            }
        }
        Ok(count)
    }

    /// Decode every `[timestamp, record]` pair in this buffer, in order.
    /// This is the second pass of the two-pass protocol `count_pairs`
    /// begins; callers that need both call `count_pairs` first.
    pub fn decode(&self) -> Result<Vec<Record>, rmpv::decode::Error> {
        let mut cursor = Cursor::new(self.0.as_slice());
        let mut out = Vec::new();
        while (cursor.position() as usize) < self.0.len() {
            let value = rmpv::decode::read_value(&mut cursor)?;
            let mut elems = match value {
                rmpv::Value::Array(elems) if elems.len() == 2 => elems,
                other => {
                    return Err(invalid_record(other));
                }
            };
            let record = elems.pop().unwrap();
            let timestamp = elems.pop().unwrap();
            out.push(Record {
                timestamp: timestamp.as_f64().unwrap_or(0.0),
                value: record,
            });
        }
        Ok(out)
    }
}

fn invalid_record(value: rmpv::Value) -> rmpv::decode::Error {
    rmpv::decode::Error::InvalidMarkerRead(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("expected a 2-element [timestamp, record] array, got {value:?}"),
    ))
}

/// A unit of buffered records attached to one engine input.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub input_name: String,
    pub tag: String,
    pub data: PackedRecords,
}

impl Chunk {
    pub fn new(input_name: impl Into<String>, tag: impl Into<String>, data: PackedRecords) -> Self {
        Self {
            input_name: input_name.into(),
            tag: tag.into(),
            data,
        }
    }
}
