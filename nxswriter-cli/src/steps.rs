//! JSON step records.
//!
//! A steps file is either an array of step objects or an object with
//! optional `init`, `steps` and `final` members. Each step object maps a
//! source name to its value:
//! - number, boolean or string: scalar
//! - array of scalars: spectrum
//! - array of arrays: image
//! - `null`: no value this step
//! - `{"decoder": "UTF8", "data": "..."}`: payload for a pooled decoder

use nxswriter_core::{DataFormat, DataHolder, DecoderPool, Error, Result, Value};
use nxswriter_engine::StepRecord;
use serde_json::{Map, Value as Json};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Records for one entry.
#[derive(Debug, Default)]
pub struct Steps {
    pub init: StepRecord,
    pub steps: Vec<StepRecord>,
    pub last: StepRecord,
}

impl Steps {
    pub fn from_file<P: AsRef<Path>>(path: P, pool: &mut DecoderPool) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let json: Json =
            serde_json::from_reader(reader).map_err(|e| Error::Config(format!("steps: {e}")))?;
        Self::from_json(&json, pool)
    }

    pub fn from_json(json: &Json, pool: &mut DecoderPool) -> Result<Self> {
        match json {
            Json::Array(steps) => Ok(Self {
                steps: records(steps, pool)?,
                ..Self::default()
            }),
            Json::Object(members) => {
                let mut parsed = Self::default();
                if let Some(init) = members.get("init") {
                    parsed.init = record(init, pool)?;
                }
                if let Some(last) = members.get("final") {
                    parsed.last = record(last, pool)?;
                }
                match members.get("steps") {
                    Some(Json::Array(steps)) => parsed.steps = records(steps, pool)?,
                    Some(_) => return Err(Error::Config("steps: 'steps' must be an array".to_string())),
                    None => {}
                }
                Ok(parsed)
            }
            _ => Err(Error::Config("steps: expected an array or an object".to_string())),
        }
    }
}

fn records(steps: &[Json], pool: &mut DecoderPool) -> Result<Vec<StepRecord>> {
    steps.iter().map(|step| record(step, pool)).collect()
}

fn record(json: &Json, pool: &mut DecoderPool) -> Result<StepRecord> {
    let Json::Object(members) = json else {
        return Err(Error::Config(format!("steps: a step must be an object, got {json}")));
    };
    let mut record = StepRecord::new();
    for (source, value) in members {
        match value {
            Json::Null => {}
            Json::Object(encoded) => insert_encoded(&mut record, source, encoded, pool),
            other => match holder(other) {
                Ok(holder) => record.insert(source, holder),
                Err(err) => record.fail(source, &err.to_string()),
            },
        }
    }
    Ok(record)
}

fn insert_encoded(record: &mut StepRecord, source: &str, encoded: &Map<String, Json>, pool: &mut DecoderPool) {
    match (encoded.get("decoder"), encoded.get("data")) {
        (Some(Json::String(decoder)), Some(Json::String(data))) => {
            record.insert_encoded(source, pool, decoder, data.as_bytes());
        }
        _ => record.fail(source, "encoded values need string 'decoder' and 'data' members"),
    }
}

/// Converts one JSON value into a payload.
pub fn holder(json: &Json) -> Result<DataHolder> {
    match json {
        Json::Array(items) if items.iter().any(Json::is_array) => {
            let rows: Vec<&Vec<Json>> = items
                .iter()
                .map(|item| {
                    item.as_array()
                        .ok_or_else(|| Error::RankMismatch("image rows must all be arrays".to_string()))
                })
                .collect::<Result<_>>()?;
            let cols = rows.first().map_or(0, |row| row.len());
            if rows.iter().any(|row| row.len() != cols) {
                return Err(Error::ShapeMismatch("image rows of unequal length".to_string()));
            }
            let flat: Vec<Json> = rows.into_iter().flatten().cloned().collect();
            let value = values(&flat)?.reshape(&[items.len(), cols])?;
            DataHolder::new(DataFormat::Image, value)
        }
        Json::Array(items) => DataHolder::new(DataFormat::Spectrum, values(items)?),
        scalar => DataHolder::new(DataFormat::Scalar, values(std::slice::from_ref(scalar))?.reshape(&[])?),
    }
}

/// Flat value of the narrowest type that holds every item.
fn values(items: &[Json]) -> Result<Value> {
    if items.iter().all(Json::is_boolean) {
        return Ok(Value::from(items.iter().filter_map(Json::as_bool).collect::<Vec<_>>()));
    }
    if items.iter().all(Json::is_string) {
        let strings = items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect::<Vec<_>>();
        return Ok(Value::from(strings));
    }
    if items.iter().all(Json::is_i64) {
        return Ok(Value::from(items.iter().filter_map(Json::as_i64).collect::<Vec<_>>()));
    }
    if items.iter().all(Json::is_u64) {
        return Ok(Value::from(items.iter().filter_map(Json::as_u64).collect::<Vec<_>>()));
    }
    if items.iter().all(Json::is_number) {
        return Ok(Value::from(items.iter().filter_map(Json::as_f64).collect::<Vec<_>>()));
    }
    Err(Error::Conversion(format!(
        "mixed or unsupported JSON values: {}",
        Json::Array(items.to_vec())
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nxswriter_core::TypeCode;
    use serde_json::json;

    #[test]
    fn test_json_payloads() {
        let scalar = holder(&json!(3.5)).unwrap();
        assert_eq!(scalar.format(), DataFormat::Scalar);
        assert_eq!(scalar.value().type_code(), TypeCode::Float64);

        let spectrum = holder(&json!([1, 2, 3])).unwrap();
        assert_eq!(spectrum.format(), DataFormat::Spectrum);
        assert_eq!(spectrum.value().type_code(), TypeCode::Int64);

        let large = holder(&json!([1, u64::MAX])).unwrap();
        assert_eq!(large.value().type_code(), TypeCode::UInt64);

        let image = holder(&json!([[1, 2, 3], [4, 5.5, 6]])).unwrap();
        assert_eq!(image.format(), DataFormat::Image);
        assert_eq!(image.shape(), &[2, 3]);

        let text = holder(&json!("ready")).unwrap();
        assert_eq!(text.value().to_vec::<String>().unwrap(), vec!["ready".to_string()]);

        assert!(matches!(holder(&json!([[1, 2], [3]])), Err(Error::ShapeMismatch(_))));
        assert!(matches!(holder(&json!([1, "a"])), Err(Error::Conversion(_))));
    }

    #[test]
    fn test_steps_document() {
        let mut pool = DecoderPool::new();
        let json = json!({
            "init": {"exposure": 0.5},
            "steps": [
                {"mono": 12.1, "mca": [1, 2, 3]},
                {"mono": null, "title": {"decoder": "UTF8", "data": "scan"}}
            ],
            "final": {"clock": "2026-10-18T12:00:00"}
        });
        let steps = Steps::from_json(&json, &mut pool).unwrap();
        assert!(steps.init.get("exposure").is_ok());
        assert_eq!(steps.steps.len(), 2);
        assert!(matches!(steps.steps[1].get("mono"), Err(Error::DataUnavailable(_))));
        assert!(steps.steps[1].get("title").is_ok());
        assert!(steps.last.get("clock").is_ok());

        let plain = Steps::from_json(&json!([{"mono": 1.0}]), &mut pool).unwrap();
        assert_eq!(plain.steps.len(), 1);
        assert!(plain.init.is_empty());

        assert!(matches!(Steps::from_json(&json!(3), &mut pool), Err(Error::Config(_))));
    }
}
