//! Conversion from Arrow RecordBatch to row-based Records.
//!
//! Every value becomes text and nulls become `None`; an empty string is a
//! real (non-null) empty value. The loader parses
//! the text back into typed bind values according to the table schema, so the
//! formats written here must be ones it accepts: ISO dates, `%H:%M:%S%.f`
//! times, `%Y-%m-%d %H:%M:%S%.f` timestamps (with a `+00:00` suffix when the
//! column carries a timezone) and hex for binary data.

use anyhow::{Context, Result, anyhow};
use arrow::array::{Array, ArrowPrimitiveType, AsArray};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Decimal128Type, Decimal256Type, Float16Type, Float32Type,
    Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, Time32MillisecondType,
    Time32SecondType, Time64MicrosecondType, Time64NanosecondType, TimeUnit,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveTime, Utc};

use crate::formats::reader::Record;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert an Arrow RecordBatch to a vector of Records
pub fn record_batch_to_records(batch: &RecordBatch) -> Result<Vec<Record>> {
    let num_rows = batch.num_rows();

    if num_rows == 0 {
        return Ok(Vec::new());
    }

    let schema = batch.schema();
    let mut columns: Vec<std::vec::IntoIter<Option<String>>> =
        Vec::with_capacity(batch.num_columns());
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        let strings = array_to_strings(array.as_ref()).with_context(|| {
            format!(
                "Failed to convert column '{}' ({}) to text",
                field.name(),
                array.data_type()
            )
        })?;
        columns.push(strings.into_iter());
    }

    // Transpose to rows
    let mut records = Vec::with_capacity(num_rows);
    for _ in 0..num_rows {
        let fields = columns
            .iter_mut()
            .map(|col| col.next().flatten())
            .collect();
        records.push(Record { fields });
    }

    Ok(records)
}

/// Rough in-memory size of a batch, used for throughput reporting
pub fn estimate_batch_size(batch: &RecordBatch) -> u64 {
    batch
        .columns()
        .iter()
        .map(|array| array.get_array_memory_size() as u64)
        .sum()
}

/// Render each non-null slot of `array`
fn collect_strings<F>(array: &dyn Array, mut render: F) -> Result<Vec<Option<String>>>
where
    F: FnMut(usize) -> Result<String>,
{
    (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                Ok(None)
            } else {
                render(i).map(Some)
            }
        })
        .collect()
}

/// Convert an Arrow array to a vector of string representations
fn array_to_strings(array: &dyn Array) -> Result<Vec<Option<String>>> {
    match array.data_type() {
        DataType::Boolean => {
            let arr = array.as_boolean();
            collect_strings(array, |i| Ok(arr.value(i).to_string()))
        }
        DataType::Int8 => convert_primitive::<Int8Type>(array),
        DataType::Int16 => convert_primitive::<Int16Type>(array),
        DataType::Int32 => convert_primitive::<Int32Type>(array),
        DataType::Int64 => convert_primitive::<Int64Type>(array),
        DataType::UInt8 => convert_primitive::<UInt8Type>(array),
        DataType::UInt16 => convert_primitive::<UInt16Type>(array),
        DataType::UInt32 => convert_primitive::<UInt32Type>(array),
        DataType::UInt64 => convert_primitive::<UInt64Type>(array),
        DataType::Float16 => convert_primitive::<Float16Type>(array),
        DataType::Float32 => convert_primitive::<Float32Type>(array),
        DataType::Float64 => convert_primitive::<Float64Type>(array),
        DataType::Utf8 => {
            let arr = array.as_string::<i32>();
            collect_strings(array, |i| Ok(arr.value(i).to_string()))
        }
        DataType::LargeUtf8 => {
            let arr = array.as_string::<i64>();
            collect_strings(array, |i| Ok(arr.value(i).to_string()))
        }
        DataType::Utf8View => {
            let arr = array.as_string_view();
            collect_strings(array, |i| Ok(arr.value(i).to_string()))
        }
        DataType::Binary => {
            let arr = array.as_binary::<i32>();
            collect_strings(array, |i| Ok(hex::encode(arr.value(i))))
        }
        DataType::LargeBinary => {
            let arr = array.as_binary::<i64>();
            collect_strings(array, |i| Ok(hex::encode(arr.value(i))))
        }
        DataType::BinaryView => {
            let arr = array.as_binary_view();
            collect_strings(array, |i| Ok(hex::encode(arr.value(i))))
        }
        DataType::FixedSizeBinary(_) => {
            let arr = array.as_fixed_size_binary();
            collect_strings(array, |i| Ok(hex::encode(arr.value(i))))
        }
        DataType::Date32 => {
            let arr = array.as_primitive::<Date32Type>();
            collect_strings(array, |i| {
                let days = i64::from(arr.value(i));
                let date = DateTime::from_timestamp(days * 86_400, 0).context("Invalid date")?;
                Ok(date.format("%Y-%m-%d").to_string())
            })
        }
        DataType::Date64 => {
            let arr = array.as_primitive::<Date64Type>();
            collect_strings(array, |i| {
                let date = DateTime::from_timestamp_millis(arr.value(i)).context("Invalid date")?;
                Ok(date.format("%Y-%m-%d").to_string())
            })
        }
        DataType::Time32(unit) => convert_time32(array, unit),
        DataType::Time64(unit) => convert_time64(array, unit),
        DataType::Timestamp(unit, tz) => convert_timestamp(array, unit, tz.is_some()),
        DataType::Decimal128(_, scale) => {
            let arr = array.as_primitive::<Decimal128Type>();
            collect_strings(array, |i| Ok(format_decimal(arr.value(i).to_string(), *scale)))
        }
        DataType::Decimal256(_, scale) => {
            let arr = array.as_primitive::<Decimal256Type>();
            collect_strings(array, |i| Ok(format_decimal(arr.value(i).to_string(), *scale)))
        }
        DataType::Dictionary(_, value_type) => {
            let values = arrow::compute::cast(array, value_type)
                .context("Failed to decode dictionary column")?;
            array_to_strings(values.as_ref())
        }
        other => Err(anyhow!("Unsupported array type for conversion: {}", other)),
    }
}

/// Helper to convert primitive arrays
fn convert_primitive<T: ArrowPrimitiveType>(array: &dyn Array) -> Result<Vec<Option<String>>>
where
    T::Native: std::fmt::Display,
{
    let arr = array.as_primitive::<T>();
    collect_strings(array, |i| Ok(arr.value(i).to_string()))
}

fn convert_time32(array: &dyn Array, unit: &TimeUnit) -> Result<Vec<Option<String>>> {
    match unit {
        TimeUnit::Second => {
            let arr = array.as_primitive::<Time32SecondType>();
            collect_strings(array, |i| {
                format_time(i64::from(arr.value(i)) * NANOS_PER_SECOND)
            })
        }
        TimeUnit::Millisecond => {
            let arr = array.as_primitive::<Time32MillisecondType>();
            collect_strings(array, |i| format_time(i64::from(arr.value(i)) * 1_000_000))
        }
        other => Err(anyhow!("Invalid unit for Time32: {:?}", other)),
    }
}

fn convert_time64(array: &dyn Array, unit: &TimeUnit) -> Result<Vec<Option<String>>> {
    match unit {
        TimeUnit::Microsecond => {
            let arr = array.as_primitive::<Time64MicrosecondType>();
            collect_strings(array, |i| format_time(arr.value(i) * 1_000))
        }
        TimeUnit::Nanosecond => {
            let arr = array.as_primitive::<Time64NanosecondType>();
            collect_strings(array, |i| format_time(arr.value(i)))
        }
        other => Err(anyhow!("Invalid unit for Time64: {:?}", other)),
    }
}

fn format_time(nanos_since_midnight: i64) -> Result<String> {
    let secs = u32::try_from(nanos_since_midnight.div_euclid(NANOS_PER_SECOND))?;
    let nanos = u32::try_from(nanos_since_midnight.rem_euclid(NANOS_PER_SECOND))?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .with_context(|| format!("Invalid time of day: {}ns", nanos_since_midnight))?;
    Ok(time.format("%H:%M:%S%.f").to_string())
}

/// Convert timestamp arrays to strings
///
/// Zoned timestamps are stored as UTC instants and keep an explicit offset so
/// they load into TIMESTAMPTZ unchanged.
fn convert_timestamp(
    array: &dyn Array,
    unit: &TimeUnit,
    zoned: bool,
) -> Result<Vec<Option<String>>> {
    let render = |datetime: DateTime<Utc>| -> String {
        if zoned {
            datetime.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string()
        } else {
            datetime.format("%Y-%m-%d %H:%M:%S%.f").to_string()
        }
    };

    match unit {
        TimeUnit::Second => {
            let arr = array.as_primitive::<TimestampSecondType>();
            collect_strings(array, |i| {
                let datetime =
                    DateTime::from_timestamp(arr.value(i), 0).context("Invalid timestamp")?;
                Ok(render(datetime))
            })
        }
        TimeUnit::Millisecond => {
            let arr = array.as_primitive::<TimestampMillisecondType>();
            collect_strings(array, |i| {
                let datetime =
                    DateTime::from_timestamp_millis(arr.value(i)).context("Invalid timestamp")?;
                Ok(render(datetime))
            })
        }
        TimeUnit::Microsecond => {
            let arr = array.as_primitive::<TimestampMicrosecondType>();
            collect_strings(array, |i| {
                let datetime =
                    DateTime::from_timestamp_micros(arr.value(i)).context("Invalid timestamp")?;
                Ok(render(datetime))
            })
        }
        TimeUnit::Nanosecond => {
            let arr = array.as_primitive::<TimestampNanosecondType>();
            collect_strings(array, |i| Ok(render(DateTime::from_timestamp_nanos(arr.value(i)))))
        }
    }
}

/// Place the decimal point in an unscaled integer rendered as text
///
/// A negative scale multiplies by a power of ten.
fn format_decimal(unscaled: String, scale: i8) -> String {
    if scale <= 0 {
        if unscaled == "0" {
            return unscaled;
        }
        return format!("{}{}", unscaled, "0".repeat(usize::from(scale.unsigned_abs())));
    }

    let (sign, digits) = match unscaled.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", unscaled.as_str()),
    };

    let scale = usize::from(scale.unsigned_abs());
    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
    } else {
        digits.to_string()
    };

    let split = padded.len() - scale;
    format!("{}{}.{}", sign, &padded[..split], &padded[split..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        BinaryArray, BooleanArray, Date32Array, Decimal128Array, DictionaryArray, Float64Array,
        Int32Array, Int64Array, StringArray, Time64MicrosecondArray,
        TimestampMicrosecondArray, TimestampSecondArray,
    };
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    fn single_column(field: Field, array: Arc<dyn Array>) -> Vec<Record> {
        let batch = RecordBatch::try_new(Arc::new(Schema::new(vec![field])), vec![array]).unwrap();
        record_batch_to_records(&batch).unwrap()
    }

    fn values(records: &[Record]) -> Vec<Option<&str>> {
        records.iter().map(|r| r.get(0)).collect()
    }

    fn owned(fields: &[Option<&str>]) -> Vec<Option<String>> {
        fields.iter().map(|f| f.map(str::to_string)).collect()
    }

    #[test]
    fn test_mixed_columns_with_nulls() {
        let schema = Schema::new(vec![
            Field::new("VendorID", DataType::Int32, false),
            Field::new("store_and_fwd_flag", DataType::Utf8, true),
            Field::new("fare_amount", DataType::Float64, true),
            Field::new("passenger_count", DataType::Int64, true),
            Field::new("flag", DataType::Boolean, false),
        ]);

        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("N"), None])),
                Arc::new(Float64Array::from(vec![Some(12.5), None])),
                Arc::new(Int64Array::from(vec![None, Some(3)])),
                Arc::new(BooleanArray::from(vec![true, false])),
            ],
        )
        .unwrap();

        let records = record_batch_to_records(&batch).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].fields,
            owned(&[Some("1"), Some("N"), Some("12.5"), None, Some("true")])
        );
        assert_eq!(
            records[1].fields,
            owned(&[Some("2"), None, None, Some("3"), Some("false")])
        );
    }

    #[test]
    fn test_empty_string_is_not_null() {
        let records = single_column(
            Field::new("store_and_fwd_flag", DataType::Utf8, true),
            Arc::new(StringArray::from(vec![Some("N"), Some(""), None])),
        );

        assert_eq!(values(&records), vec![Some("N"), Some(""), None]);

        let records = single_column(
            Field::new("payload", DataType::Binary, false),
            Arc::new(BinaryArray::from(vec![&b""[..]])),
        );
        assert_eq!(values(&records), vec![Some("")]);
    }

    #[test]
    fn test_dates() {
        // Date32 is days since epoch; 18993 = 2022-01-01
        let records = single_column(
            Field::new("date", DataType::Date32, false),
            Arc::new(Date32Array::from(vec![0, 18993, -1])),
        );

        assert_eq!(values(&records), vec![Some("1970-01-01"), Some("2022-01-01"), Some("1969-12-31")]);
    }

    #[test]
    fn test_naive_timestamps_round_trip_through_the_loader_format() {
        // 2025-01-01 00:18:38.5
        let records = single_column(
            Field::new(
                "tpep_pickup_datetime",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Arc::new(TimestampMicrosecondArray::from(vec![
                Some(1_735_690_718_500_000),
                None,
            ])),
        );

        assert_eq!(values(&records), vec![Some("2025-01-01 00:18:38.500"), None]);
        assert!(records[0]
            .get(0)
            .and_then(crate::db::schema::parse_timestamp)
            .is_some());
    }

    #[test]
    fn test_zoned_timestamps_carry_offset() {
        let array = TimestampSecondArray::from(vec![0]).with_timezone("America/New_York");
        let records = single_column(
            Field::new(
                "ts",
                DataType::Timestamp(TimeUnit::Second, Some("America/New_York".into())),
                false,
            ),
            Arc::new(array),
        );

        assert_eq!(values(&records), vec![Some("1970-01-01 00:00:00+00:00")]);
    }

    #[test]
    fn test_times() {
        let records = single_column(
            Field::new("t", DataType::Time64(TimeUnit::Microsecond), false),
            Arc::new(Time64MicrosecondArray::from(vec![
                0,
                (13 * 3600 + 5 * 60 + 9) * 1_000_000 + 250_000,
            ])),
        );

        assert_eq!(values(&records), vec![Some("00:00:00"), Some("13:05:09.250")]);
    }

    #[test]
    fn test_binary_is_hex() {
        let records = single_column(
            Field::new("payload", DataType::Binary, true),
            Arc::new(BinaryArray::from(vec![Some(&b"\x00\xff"[..]), None])),
        );

        assert_eq!(values(&records), vec![Some("00ff"), None]);
    }

    #[test]
    fn test_decimal_column() {
        let array = Decimal128Array::from(vec![Some(1250), Some(-5), None])
            .with_precision_and_scale(10, 2)
            .unwrap();
        let records = single_column(
            Field::new("amount", DataType::Decimal128(10, 2), true),
            Arc::new(array),
        );

        assert_eq!(values(&records), vec![Some("12.50"), Some("-0.05"), None]);
    }

    #[test]
    fn test_dictionary_strings() {
        let array: DictionaryArray<Int32Type> =
            vec![Some("Manhattan"), Some("Queens"), None, Some("Manhattan")]
                .into_iter()
                .collect();
        let records = single_column(
            Field::new(
                "borough",
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
                true,
            ),
            Arc::new(array),
        );

        assert_eq!(values(&records), vec![Some("Manhattan"), Some("Queens"), None, Some("Manhattan")]);
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal("12345".to_string(), 2), "123.45");
        assert_eq!(format_decimal("1".to_string(), 2), "0.01");
        assert_eq!(format_decimal("100".to_string(), 2), "1.00");
        assert_eq!(format_decimal("-12345".to_string(), 2), "-123.45");
        assert_eq!(format_decimal("-5".to_string(), 2), "-0.05");
        assert_eq!(format_decimal("12345".to_string(), 0), "12345");
        assert_eq!(format_decimal("12".to_string(), -2), "1200");
        assert_eq!(format_decimal("0".to_string(), -2), "0");
    }

    #[test]
    fn test_empty_batch() {
        let records = single_column(
            Field::new("id", DataType::Int32, false),
            Arc::new(Int32Array::from(Vec::<i32>::new())),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_estimate_batch_size_is_nonzero() {
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)])),
            vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
        )
        .unwrap();
        assert!(estimate_batch_size(&batch) >= 24);
    }
}
