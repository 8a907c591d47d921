#![allow(clippy::unwrap_used, clippy::expect_used)]

use arrow::array::{Array, Int64Array, StringArray};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use proptest::prelude::*;
use snaplake_engine::snapshot::columnar::is_parquet;
use snaplake_engine::snapshot::{Cell, ColumnSpec, ColumnType, ColumnarWriter};

fn write(rows: &[(Option<i64>, Option<String>)]) -> Vec<u8> {
    let mut writer = ColumnarWriter::new(vec![
        ColumnSpec::new("id", ColumnType::Int64),
        ColumnSpec::new("label", ColumnType::Utf8),
    ])
    .unwrap();
    for (id, label) in rows {
        writer
            .push_row(vec![
                id.map_or(Cell::Null, Cell::Int),
                label.clone().map_or(Cell::Null, Cell::Text),
            ])
            .unwrap();
    }
    let file = writer.finish().unwrap();
    assert_eq!(file.row_count, rows.len() as u64);
    file.bytes
}

fn read(bytes: Vec<u8>) -> Vec<(Option<i64>, Option<String>)> {
    let mut tmp = tempfile::tempfile().unwrap();
    std::io::Write::write_all(&mut tmp, &bytes).unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(tmp)
        .unwrap()
        .build()
        .unwrap();

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.unwrap();
        let ids = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        let labels = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        for i in 0..batch.num_rows() {
            out.push((
                (!ids.is_null(i)).then(|| ids.value(i)),
                (!labels.is_null(i)).then(|| labels.value(i).to_string()),
            ));
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_rows_survive_parquet(
        rows in prop::collection::vec(
            (prop::option::of(any::<i64>()), prop::option::of("[a-z ]{0,12}")),
            0..200,
        )
    ) {
        let bytes = write(&rows);
        prop_assert!(is_parquet(&bytes));
        prop_assert_eq!(read(bytes), rows);
    }
}

#[test]
fn test_text_that_is_not_a_number_is_rejected_for_integer_columns() {
    let mut writer =
        ColumnarWriter::new(vec![ColumnSpec::new("n", ColumnType::Int64)]).unwrap();
    assert!(writer.push_row(vec![Cell::Text("12".to_string())]).is_ok());
    assert!(writer.push_row(vec![Cell::Text("twelve".to_string())]).is_err());
}
