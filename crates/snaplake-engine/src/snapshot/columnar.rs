//! Row-to-Parquet conversion
//!
//! Dialects decode source rows into `Cell`s and push them here. Rows are
//! buffered in Arrow builders and flushed as record batches, so memory holds
//! at most one batch of builders plus the encoded file.

use arrow::array::{
    ArrayRef, BinaryBuilder, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

use crate::errors::{columnar_error, Result};

pub const BATCH_ROWS: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    Binary,
}

impl ColumnType {
    fn data_type(self) -> DataType {
        match self {
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::Utf8,
            ColumnType::Binary => DataType::Binary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// One decoded source value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

enum ColumnBuilder {
    Boolean(BooleanBuilder),
    Int64(Int64Builder),
    Float64(Float64Builder),
    Utf8(StringBuilder),
    Binary(BinaryBuilder),
}

impl ColumnBuilder {
    fn new(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Boolean => ColumnBuilder::Boolean(BooleanBuilder::new()),
            ColumnType::Int64 => ColumnBuilder::Int64(Int64Builder::new()),
            ColumnType::Float64 => ColumnBuilder::Float64(Float64Builder::new()),
            ColumnType::Utf8 => ColumnBuilder::Utf8(StringBuilder::new()),
            ColumnType::Binary => ColumnBuilder::Binary(BinaryBuilder::new()),
        }
    }

    /// Convert `cell` to the exact variant this builder stores
    ///
    /// Applies the widening rules dynamic sources need. Nothing is appended.
    fn coerce(&self, cell: Cell, column: &str) -> Result<Cell> {
        let mismatch = |cell: &Cell, expected: &str| {
            columnar_error(
                "append_cell",
                format!("Column '{}' expects {}, got {:?}", column, expected, cell),
            )
        };

        let coerced = match (self, cell) {
            (_, Cell::Null) => Cell::Null,

            (ColumnBuilder::Boolean(_), Cell::Bool(v)) => Cell::Bool(v),
            (ColumnBuilder::Boolean(_), Cell::Int(v)) => Cell::Bool(v != 0),

            (ColumnBuilder::Int64(_), Cell::Int(v)) => Cell::Int(v),
            (ColumnBuilder::Int64(_), Cell::Bool(v)) => Cell::Int(i64::from(v)),
            (ColumnBuilder::Int64(_), Cell::Text(s)) => match s.trim().parse::<i64>() {
                Ok(v) => Cell::Int(v),
                Err(_) => return Err(mismatch(&Cell::Text(s), "an integer")),
            },

            (ColumnBuilder::Float64(_), Cell::Float(v)) => Cell::Float(v),
            (ColumnBuilder::Float64(_), Cell::Int(v)) => Cell::Float(v as f64),
            (ColumnBuilder::Float64(_), Cell::Text(s)) => match s.trim().parse::<f64>() {
                Ok(v) => Cell::Float(v),
                Err(_) => return Err(mismatch(&Cell::Text(s), "a float")),
            },

            (ColumnBuilder::Utf8(_), Cell::Text(s)) => Cell::Text(s),
            (ColumnBuilder::Utf8(_), Cell::Int(v)) => Cell::Text(v.to_string()),
            (ColumnBuilder::Utf8(_), Cell::Float(v)) => Cell::Text(v.to_string()),
            (ColumnBuilder::Utf8(_), Cell::Bool(v)) => Cell::Text(v.to_string()),
            (ColumnBuilder::Utf8(_), Cell::Bytes(v)) => {
                Cell::Text(String::from_utf8_lossy(&v).into_owned())
            }

            (ColumnBuilder::Binary(_), Cell::Bytes(v)) => Cell::Bytes(v),
            (ColumnBuilder::Binary(_), Cell::Text(s)) => Cell::Bytes(s.into_bytes()),

            (ColumnBuilder::Boolean(_), other) => return Err(mismatch(&other, "a boolean")),
            (ColumnBuilder::Int64(_), other) => return Err(mismatch(&other, "an integer")),
            (ColumnBuilder::Float64(_), other) => return Err(mismatch(&other, "a float")),
            (ColumnBuilder::Binary(_), other) => return Err(mismatch(&other, "bytes")),
        };
        Ok(coerced)
    }

    /// Append a value already passed through `coerce`
    fn append(&mut self, cell: Cell) {
        match (self, cell) {
            (ColumnBuilder::Boolean(b), Cell::Bool(v)) => b.append_value(v),
            (ColumnBuilder::Int64(b), Cell::Int(v)) => b.append_value(v),
            (ColumnBuilder::Float64(b), Cell::Float(v)) => b.append_value(v),
            (ColumnBuilder::Utf8(b), Cell::Text(s)) => b.append_value(s),
            (ColumnBuilder::Binary(b), Cell::Bytes(v)) => b.append_value(v),
            (builder, _) => builder.append_null(),
        }
    }

    fn append_null(&mut self) {
        match self {
            ColumnBuilder::Boolean(b) => b.append_null(),
            ColumnBuilder::Int64(b) => b.append_null(),
            ColumnBuilder::Float64(b) => b.append_null(),
            ColumnBuilder::Utf8(b) => b.append_null(),
            ColumnBuilder::Binary(b) => b.append_null(),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Boolean(b) => Arc::new(b.finish()),
            ColumnBuilder::Int64(b) => Arc::new(b.finish()),
            ColumnBuilder::Float64(b) => Arc::new(b.finish()),
            ColumnBuilder::Utf8(b) => Arc::new(b.finish()),
            ColumnBuilder::Binary(b) => Arc::new(b.finish()),
        }
    }
}

/// Encoded table file
#[derive(Debug, Clone)]
pub struct ColumnarFile {
    pub bytes: Vec<u8>,
    pub row_count: u64,
}

/// Streaming Parquet writer (Snappy) for one table
pub struct ColumnarWriter {
    columns: Vec<ColumnSpec>,
    schema: SchemaRef,
    builders: Vec<ColumnBuilder>,
    writer: ArrowWriter<Vec<u8>>,
    buffered: usize,
    row_count: u64,
}

impl std::fmt::Debug for ColumnarWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnarWriter")
            .field("columns", &self.columns)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ColumnarWriter {
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self> {
        if columns.is_empty() {
            return Err(columnar_error("columnar_writer", "table has no columns"));
        }

        let schema: SchemaRef = Arc::new(Schema::new(
            columns
                .iter()
                .map(|c| Field::new(&c.name, c.column_type.data_type(), true))
                .collect::<Vec<_>>(),
        ));
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(Vec::new(), schema.clone(), Some(props))
            .map_err(|e| columnar_error("columnar_writer", e.to_string()))?;

        Ok(Self {
            builders: columns
                .iter()
                .map(|c| ColumnBuilder::new(c.column_type))
                .collect(),
            columns,
            schema,
            writer,
            buffered: 0,
            row_count: 0,
        })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(columnar_error(
                "push_row",
                format!(
                    "row has {} values, table has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }

        // Coerce the whole row first so a bad cell leaves every builder untouched
        let coerced = self
            .builders
            .iter()
            .zip(&self.columns)
            .zip(row)
            .map(|((builder, spec), cell)| builder.coerce(cell, &spec.name))
            .collect::<Result<Vec<_>>>()?;
        for (builder, cell) in self.builders.iter_mut().zip(coerced) {
            builder.append(cell);
        }
        self.buffered += 1;
        self.row_count += 1;

        if self.buffered >= BATCH_ROWS {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffered == 0 {
            return Ok(());
        }
        let arrays: Vec<ArrayRef> = self.builders.iter_mut().map(ColumnBuilder::finish).collect();
        let batch = RecordBatch::try_new(self.schema.clone(), arrays)
            .map_err(|e| columnar_error("flush_batch", e.to_string()))?;
        self.writer
            .write(&batch)
            .map_err(|e| columnar_error("flush_batch", e.to_string()))?;
        self.buffered = 0;
        Ok(())
    }

    pub fn finish(mut self) -> Result<ColumnarFile> {
        self.flush()?;
        let bytes = self
            .writer
            .into_inner()
            .map_err(|e| columnar_error("finish_parquet", e.to_string()))?;
        Ok(ColumnarFile {
            bytes,
            row_count: self.row_count,
        })
    }
}

/// Parquet footers carry this magic; a cheap sanity check for callers
pub fn is_parquet(bytes: &[u8]) -> bool {
    bytes.len() >= 8 && bytes.starts_with(b"PAR1") && bytes.ends_with(b"PAR1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn read_back(file: &ColumnarFile) -> Vec<RecordBatch> {
        let mut tmp = tempfile::tempfile().unwrap();
        std::io::Write::write_all(&mut tmp, &file.bytes).unwrap();
        ParquetRecordBatchReaderBuilder::try_new(tmp)
            .unwrap()
            .build()
            .unwrap()
            .map(|b| b.unwrap())
            .collect()
    }

    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("id", ColumnType::Int64),
            ColumnSpec::new("name", ColumnType::Utf8),
        ]
    }

    #[test]
    fn test_rows_round_trip_through_parquet() {
        let mut w = ColumnarWriter::new(columns()).unwrap();
        w.push_row(vec![Cell::Int(1), Cell::Text("a".into())]).unwrap();
        w.push_row(vec![Cell::Int(2), Cell::Null]).unwrap();
        let file = w.finish().unwrap();

        assert_eq!(file.row_count, 2);
        assert!(is_parquet(&file.bytes));

        let batches = read_back(&file);
        let ids = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        let names = batches[0]
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(ids.values(), &[1, 2]);
        assert_eq!(names.value(0), "a");
        assert!(names.is_null(1));
    }

    #[test]
    fn test_empty_table_still_has_schema() {
        let file = ColumnarWriter::new(columns()).unwrap().finish().unwrap();
        assert_eq!(file.row_count, 0);
        assert!(is_parquet(&file.bytes));
    }

    #[test]
    fn test_batches_flush_past_threshold() {
        let mut w = ColumnarWriter::new(columns()).unwrap();
        for i in 0..(BATCH_ROWS as i64 + 10) {
            w.push_row(vec![Cell::Int(i), Cell::Text(i.to_string())]).unwrap();
        }
        let file = w.finish().unwrap();
        let total: usize = read_back(&file).iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, BATCH_ROWS + 10);
    }

    #[test]
    fn test_incompatible_cell_rejected() {
        let mut w = ColumnarWriter::new(columns()).unwrap();
        assert!(w
            .push_row(vec![Cell::Text("x".into()), Cell::Null])
            .is_err());
        assert!(w.push_row(vec![Cell::Int(1)]).is_err());
    }

    #[test]
    fn test_rejected_row_leaves_columns_aligned() {
        let mut w = ColumnarWriter::new(vec![
            ColumnSpec::new("name", ColumnType::Utf8),
            ColumnSpec::new("qty", ColumnType::Int64),
        ])
        .unwrap();
        assert!(w
            .push_row(vec![Cell::Text("a".into()), Cell::Text("lots".into())])
            .is_err());
        w.push_row(vec![Cell::Text("b".into()), Cell::Int(2)]).unwrap();
        let file = w.finish().unwrap();

        assert_eq!(file.row_count, 1);
        let batches = read_back(&file);
        assert_eq!(batches[0].num_rows(), 1);
        let names = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(names.value(0), "b");
    }
}
