use std::io::{Read, Write};
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::curriculum::CurriculumMapping;
use crate::models::{BatchResultRow, ExportRow, RawStudentRow, StudentRecord};

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input)
}

fn read_rows<T: DeserializeOwned, R: Read>(input: R) -> anyhow::Result<Vec<T>> {
    let mut rows = Vec::new();
    for (index, result) in reader(input).deserialize::<T>().enumerate() {
        rows.push(result.with_context(|| format!("malformed row {}", index + 1))?);
    }
    Ok(rows)
}

fn write_rows<T: Serialize, W: Write>(output: W, rows: impl IntoIterator<Item = T>) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(output);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn open(path: &Path) -> anyhow::Result<std::fs::File> {
    std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))
}

fn create(path: &Path) -> anyhow::Result<std::fs::File> {
    std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

/// Uploaded rows are read as text so the batch can report bad cells per row.
/// Cells that are not valid UTF-8 are decoded lossily and the row is flagged
/// instead of failing the whole upload.
pub fn read_upload_from<R: Read>(input: R) -> anyhow::Result<Vec<RawStudentRow>> {
    let mut reader = reader(input);
    let (headers, _) = decode_record(reader.byte_headers()?);
    let mut rows = Vec::new();

    for (index, result) in reader.byte_records().enumerate() {
        let record = result.with_context(|| format!("malformed row {}", index + 1))?;
        let (text, bad_column) = decode_record(&record);
        let mut row: RawStudentRow = text
            .deserialize(Some(&headers))
            .with_context(|| format!("malformed row {}", index + 1))?;
        row.encoding_error = bad_column.map(|column| headers.get(column).unwrap_or_default().to_string());
        rows.push(row);
    }
    Ok(rows)
}

fn decode_record(record: &csv::ByteRecord) -> (csv::StringRecord, Option<usize>) {
    let mut decoded = csv::StringRecord::with_capacity(record.as_slice().len(), record.len());
    let mut bad_column = None;

    for (column, field) in record.iter().enumerate() {
        match std::str::from_utf8(field) {
            Ok(text) => decoded.push_field(text),
            Err(_) => {
                bad_column.get_or_insert(column);
                decoded.push_field(&String::from_utf8_lossy(field));
            }
        }
    }
    (decoded, bad_column)
}

pub fn read_upload(path: &Path) -> anyhow::Result<Vec<RawStudentRow>> {
    read_upload_from(open(path)?).with_context(|| format!("failed to read {}", path.display()))
}

pub fn write_results_to<W: Write>(output: W, rows: &[BatchResultRow]) -> anyhow::Result<()> {
    write_rows(output, rows.iter().map(ExportRow::from))
}

pub fn write_results(path: &Path, rows: &[BatchResultRow]) -> anyhow::Result<()> {
    write_results_to(create(path)?, rows)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn read_records_from<R: Read>(input: R) -> anyhow::Result<Vec<StudentRecord>> {
    let records: Vec<StudentRecord> = read_rows(input)?;
    for (index, record) in records.iter().enumerate() {
        record
            .validate()
            .with_context(|| format!("invalid record {} (NIM {})", index + 1, record.nim))?;
    }
    Ok(records)
}

pub fn read_records(path: &Path) -> anyhow::Result<Vec<StudentRecord>> {
    read_records_from(open(path)?).with_context(|| format!("failed to read {}", path.display()))
}

pub fn write_records(path: &Path, records: &[StudentRecord]) -> anyhow::Result<()> {
    write_rows(create(path)?, records)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn read_mappings_from<R: Read>(input: R) -> anyhow::Result<Vec<CurriculumMapping>> {
    read_rows(input)
}

pub fn read_mappings(path: &Path) -> anyhow::Result<Vec<CurriculumMapping>> {
    read_mappings_from(open(path)?).with_context(|| format!("failed to read {}", path.display()))
}

pub fn write_mappings<'a>(
    path: &Path,
    mappings: impl IntoIterator<Item = &'a CurriculumMapping>,
) -> anyhow::Result<()> {
    write_rows(create(path)?, mappings)
        .with_context(|| format!("failed to write {}", path.display()))
}
