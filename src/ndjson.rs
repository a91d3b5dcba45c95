//! NDJSON import/export. Each line is one record in canonical extended JSON so
//! ids and dates survive a round trip.

use crate::collection::Collection;
use crate::document::{Document, json_to_bson};
use crate::errors::AppError;
use bson::Bson;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: u64,
    pub skipped: u64,
}

/// Writes every record of `collection`, in creation order.
pub fn export_ndjson<W: Write>(collection: &Collection, writer: W) -> Result<u64, AppError> {
    let mut w = BufWriter::new(writer);
    let mut n = 0u64;
    for doc in collection.get_all_documents() {
        let line = Bson::Document(doc.data).into_canonical_extjson().to_string();
        writeln!(w, "{line}")?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}

/// Reads NDJSON (or a single JSON array when the first non-blank byte is `[`).
/// Lines carrying extended JSON keep their `_id`; plain JSON gets a fresh one.
/// With `skip_errors`, unparsable lines and unique violations are counted and skipped.
pub fn import_ndjson<R: Read>(
    collection: &Collection,
    reader: R,
    skip_errors: bool,
) -> Result<ImportReport, AppError> {
    let mut reader = BufReader::new(reader);
    let mut report = ImportReport::default();
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    if content.trim_start().starts_with('[') {
        let val: serde_json::Value = serde_json::from_str(&content)?;
        let arr = val
            .as_array()
            .ok_or_else(|| AppError::BadRequest("expected JSON array".into()))?;
        for v in arr {
            insert_value(collection, v, skip_errors, &mut report)?;
        }
        return Ok(report);
    }

    for (line_no, line) in BufReader::new(content.as_bytes()).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(v) => insert_value(collection, &v, skip_errors, &mut report)?,
            Err(e) if skip_errors => {
                log::warn!("ndjson line {} skipped: {e}", line_no + 1);
                report.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(report)
}

fn insert_value(
    collection: &Collection,
    v: &serde_json::Value,
    skip_errors: bool,
    report: &mut ImportReport,
) -> Result<(), AppError> {
    let res = value_to_document(v).and_then(|d| collection.insert_document(d));
    match res {
        Ok(_) => report.inserted += 1,
        Err(e) if skip_errors => {
            log::warn!("import into {} skipped a record: {e}", collection.name_str());
            report.skipped += 1;
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

fn value_to_document(v: &serde_json::Value) -> Result<Document, AppError> {
    let bson = Bson::try_from(v.clone()).unwrap_or_else(|_| json_to_bson(v));
    let Bson::Document(body) = bson else {
        return Err(AppError::BadRequest("expected JSON object".into()));
    };
    Document::from_stored(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn export_then_import_keeps_ids_and_dates() {
        let src = Collection::new("tours".into());
        let id = src
            .insert_document(Document::new(doc! { "name": "a", "at": bson::DateTime::from_millis(42) }))
            .unwrap();
        let mut buf = Vec::new();
        assert_eq!(export_ndjson(&src, &mut buf).unwrap(), 1);

        let dst = Collection::new("tours".into());
        let rep = import_ndjson(&dst, buf.as_slice(), false).unwrap();
        assert_eq!(rep.inserted, 1);
        let back = dst.find_document(&id).unwrap();
        assert_eq!(back.data.get_datetime("at").unwrap().timestamp_millis(), 42);
    }

    #[test]
    fn array_input_and_skipped_lines() {
        let col = Collection::new("tours".into());
        let rep = import_ndjson(&col, "[{\"a\":1},{\"a\":2}]".as_bytes(), false).unwrap();
        assert_eq!(rep.inserted, 2);

        let rep = import_ndjson(&col, "{\"a\":3}\nnot json\n".as_bytes(), true).unwrap();
        assert_eq!(rep, ImportReport { inserted: 1, skipped: 1 });
    }
}
