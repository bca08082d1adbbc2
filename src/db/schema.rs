use anyhow::{Result, anyhow};
use arrow::datatypes::{DataType, Schema as ArrowSchema};

use crate::formats::Record;

/// SQL data type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric,
    Text,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Bytea,
}

impl SqlType {
    /// Returns the Postgres type name
    pub fn to_postgres(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Numeric => "NUMERIC",
            SqlType::Text => "TEXT",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            SqlType::Bytea => "BYTEA",
        }
    }

    /// Whether values of this type are bound as text and converted with CAST()
    /// on the server instead of being parsed into a native Rust value
    pub fn needs_cast(&self) -> bool {
        matches!(
            self,
            SqlType::Numeric | SqlType::Date | SqlType::Time | SqlType::TimestampTz
        )
    }

    /// Find the most specific common type that accommodates both types
    pub fn common_type(&self, other: &SqlType) -> SqlType {
        if self == other {
            return *self;
        }

        // Type promotions
        let type_promotion = |a: &SqlType, b: &SqlType| -> Option<SqlType> {
            use SqlType::*;
            match (a, b) {
                // Integer type promotions
                (SmallInt, Integer) | (Integer, SmallInt) => Some(Integer),
                (SmallInt, BigInt) | (BigInt, SmallInt) => Some(BigInt),
                (Integer, BigInt) | (BigInt, Integer) => Some(BigInt),

                // Integer to Numeric promotions
                (SmallInt | Integer | BigInt, Numeric) | (Numeric, SmallInt | Integer | BigInt) => {
                    Some(Numeric)
                }

                // Float type promotions
                (Real, DoublePrecision) | (DoublePrecision, Real) => Some(DoublePrecision),

                // Numeric to float promotions
                (Numeric, Real | DoublePrecision) | (Real | DoublePrecision, Numeric) => {
                    Some(DoublePrecision)
                }

                // Integer to float promotions
                (SmallInt, Real) | (Real, SmallInt) => Some(Real),
                (Integer | BigInt, Real) | (Real, Integer | BigInt) => Some(DoublePrecision),
                (SmallInt | Integer | BigInt, DoublePrecision)
                | (DoublePrecision, SmallInt | Integer | BigInt) => Some(DoublePrecision),

                // Date/Time/Timestamp promotions
                (Date, Timestamp) | (Timestamp, Date) => Some(Timestamp),
                (Date, TimestampTz) | (TimestampTz, Date) => Some(TimestampTz),
                (Timestamp, TimestampTz) | (TimestampTz, Timestamp) => Some(TimestampTz),

                _ => None,
            }
        };

        type_promotion(self, other).unwrap_or(SqlType::Text)
    }

    /// Map an Arrow data type onto the Postgres type that holds it without loss
    pub fn from_arrow(data_type: &DataType) -> Result<SqlType> {
        Ok(match data_type {
            DataType::Boolean => SqlType::Boolean,
            DataType::Int8 | DataType::Int16 | DataType::UInt8 => SqlType::SmallInt,
            DataType::Int32 | DataType::UInt16 => SqlType::Integer,
            DataType::Int64 | DataType::UInt32 => SqlType::BigInt,
            DataType::UInt64 | DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => {
                SqlType::Numeric
            }
            DataType::Float16 | DataType::Float32 => SqlType::Real,
            DataType::Float64 => SqlType::DoublePrecision,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => SqlType::Text,
            DataType::Binary
            | DataType::LargeBinary
            | DataType::BinaryView
            | DataType::FixedSizeBinary(_) => SqlType::Bytea,
            DataType::Date32 | DataType::Date64 => SqlType::Date,
            DataType::Time32(_) | DataType::Time64(_) => SqlType::Time,
            DataType::Timestamp(_, None) => SqlType::Timestamp,
            DataType::Timestamp(_, Some(_)) => SqlType::TimestampTz,
            DataType::Dictionary(_, value_type) => SqlType::from_arrow(value_type)?,
            other => {
                return Err(anyhow!("Unsupported column type: {:?}", other));
            }
        })
    }
}

/// A column in a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

/// A database schema (collection of columns)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    /// Derive a table schema from an Arrow schema, keeping column order
    pub fn from_arrow(schema: &ArrowSchema) -> Result<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                let sql_type = SqlType::from_arrow(field.data_type()).map_err(|e| {
                    anyhow!("Column '{}' cannot be stored: {}", field.name(), e)
                })?;
                Ok(Column {
                    name: field.name().clone(),
                    sql_type,
                    nullable: field.is_nullable(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Schema { columns })
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Quote an identifier for use in SQL, doubling any embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Generate DDL statement for creating a table
pub fn generate_ddl(table_name: &str, schema: &Schema) -> String {
    let mut ddl = format!("CREATE TABLE {} (\n", quote_ident(table_name));

    let column_defs: Vec<String> = schema
        .columns
        .iter()
        .map(|col| {
            let nullable_clause = if col.nullable { "" } else { " NOT NULL" };
            format!(
                "  {} {}{}",
                quote_ident(&col.name),
                col.sql_type.to_postgres(),
                nullable_clause
            )
        })
        .collect();

    ddl.push_str(&column_defs.join(",\n"));
    ddl.push_str("\n)");

    ddl
}

/// Schema inferrer for text sources whose values carry no type information
pub struct SchemaInferrer;

impl SchemaInferrer {
    /// Infer the type of a single value
    fn infer_value_type(value: &str) -> Option<SqlType> {
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return None; // Null value
        }

        // Boolean
        if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            return Some(SqlType::Boolean);
        }

        // Integers are always BIGINT regardless of magnitude
        if trimmed.parse::<i64>().is_ok() {
            return Some(SqlType::BigInt);
        }

        // Integers too wide for BIGINT
        let digits = trimmed.trim_start_matches(['-', '+']);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return Some(SqlType::Numeric);
        }

        if Self::is_float(trimmed) {
            return Some(SqlType::DoublePrecision);
        }

        if Self::is_valid_date(trimmed) {
            return Some(SqlType::Date);
        }

        if Self::is_valid_timestamp(trimmed) {
            return Some(SqlType::Timestamp);
        }

        // Default to text
        Some(SqlType::Text)
    }

    /// Decimal numbers in plain or exponent notation
    ///
    /// Rust's float parser also accepts words like "inf" and "NaN"; those are
    /// left as text.
    fn is_float(value: &str) -> bool {
        value.parse::<f64>().is_ok()
            && value
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
            && value.chars().any(|c| c.is_ascii_digit())
    }

    /// ISO dates only (YYYY-MM-DD); values like 2025-02-30 stay text
    fn is_valid_date(value: &str) -> bool {
        chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
    }

    /// Check if a value looks like a valid ISO timestamp
    fn is_valid_timestamp(value: &str) -> bool {
        parse_timestamp(value).is_some()
    }

    /// Infer column types from multiple values
    fn infer_column_type<'a>(values: impl Iterator<Item = &'a str>) -> (SqlType, bool) {
        let mut inferred_type: Option<SqlType> = None;
        let mut has_nulls = false;

        for value in values {
            match Self::infer_value_type(value) {
                Some(val_type) => {
                    inferred_type = Some(match inferred_type {
                        None => val_type,
                        Some(current) => current.common_type(&val_type),
                    });
                }
                None => {
                    has_nulls = true;
                }
            }
        }

        match inferred_type {
            Some(sql_type) => (sql_type, has_nulls),
            // No values at all: nothing to go on, keep the column open
            None => (SqlType::Text, true),
        }
    }

    /// Infer a schema from a header and every data row
    ///
    /// A header with no data rows yields all-TEXT nullable columns.
    pub fn infer_from_records(header: &[String], records: &[Record]) -> Result<Schema> {
        if header.is_empty() {
            anyhow::bail!("Cannot infer schema without column names");
        }

        let columns = header
            .iter()
            .enumerate()
            .map(|(col_idx, name)| {
                // NULLs and fields missing from short rows infer as empty
                let values = records
                    .iter()
                    .map(move |row| row.get(col_idx).unwrap_or(""));
                let (sql_type, nullable) = Self::infer_column_type(values);

                Column {
                    name: name.clone(),
                    sql_type,
                    nullable,
                }
            })
            .collect();

        Ok(Schema { columns })
    }
}

/// Timestamp layouts accepted for TIMESTAMP columns
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f", // 2025-01-01 12:34:56[.789]
    "%Y-%m-%dT%H:%M:%S%.f", // 2025-01-01T12:34:56[.789] (ISO 8601)
    "%Y-%m-%d %H:%M",       // Without seconds
    "%Y-%m-%dT%H:%M",       // ISO 8601 without seconds
];

/// Parse a timestamp in one of the layouts produced by the readers
///
/// A bare ISO date is midnight, since DATE and TIMESTAMP values merge into a
/// TIMESTAMP column.
pub fn parse_timestamp(value: &str) -> Option<chrono::NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| chrono::NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, TimeUnit};

    fn rows(values: &[&[&str]]) -> Vec<Record> {
        values
            .iter()
            .map(|row| Record {
                fields: row
                    .iter()
                    .map(|s| (!s.is_empty()).then(|| s.to_string()))
                    .collect(),
            })
            .collect()
    }

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_infer_value_types() {
        assert_eq!(SchemaInferrer::infer_value_type("42"), Some(SqlType::BigInt));
        assert_eq!(
            SchemaInferrer::infer_value_type("9999999999"),
            Some(SqlType::BigInt)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("99999999999999999999"),
            Some(SqlType::Numeric)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("3.14"),
            Some(SqlType::DoublePrecision)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("1e-5"),
            Some(SqlType::DoublePrecision)
        );
        assert_eq!(
            SchemaInferrer::infer_value_type("TRUE"),
            Some(SqlType::Boolean)
        );
        assert_eq!(SchemaInferrer::infer_value_type("EWR"), Some(SqlType::Text));
        assert_eq!(SchemaInferrer::infer_value_type("NaN"), Some(SqlType::Text));
        assert_eq!(
            SchemaInferrer::infer_value_type("2025-12-03"),
            Some(SqlType::Date)
        );
        assert_eq!(SchemaInferrer::infer_value_type("-"), Some(SqlType::Text));
        assert_eq!(SchemaInferrer::infer_value_type(""), None);
        assert_eq!(SchemaInferrer::infer_value_type("   "), None);
    }

    #[test]
    fn test_type_promotion() {
        assert_eq!(
            SqlType::SmallInt.common_type(&SqlType::Integer),
            SqlType::Integer
        );
        assert_eq!(
            SqlType::Integer.common_type(&SqlType::BigInt),
            SqlType::BigInt
        );
        assert_eq!(
            SqlType::BigInt.common_type(&SqlType::DoublePrecision),
            SqlType::DoublePrecision
        );
        assert_eq!(
            SqlType::Real.common_type(&SqlType::DoublePrecision),
            SqlType::DoublePrecision
        );
        assert_eq!(
            SqlType::Date.common_type(&SqlType::Timestamp),
            SqlType::Timestamp
        );
        assert_eq!(SqlType::BigInt.common_type(&SqlType::Text), SqlType::Text);
        assert_eq!(
            SqlType::Boolean.common_type(&SqlType::BigInt),
            SqlType::Text
        );
    }

    #[test]
    fn test_infer_zone_lookup_schema() {
        let records = rows(&[
            &["1", "EWR", "Newark Airport", "EWR"],
            &["2", "Queens", "Jamaica Bay", "Boro Zone"],
            &["264", "Unknown", "", "N/A"],
        ]);

        let schema = SchemaInferrer::infer_from_records(
            &header(&["LocationID", "Borough", "Zone", "service_zone"]),
            &records,
        )
        .unwrap();

        assert_eq!(schema.columns.len(), 4);
        assert_eq!(schema.columns[0].name, "LocationID");
        assert_eq!(schema.columns[0].sql_type, SqlType::BigInt);
        assert!(!schema.columns[0].nullable);
        assert_eq!(schema.columns[1].sql_type, SqlType::Text);
        assert_eq!(schema.columns[2].sql_type, SqlType::Text);
        assert!(schema.columns[2].nullable);
    }

    #[test]
    fn test_mixed_types_promote_to_text() {
        let records = rows(&[&["123"], &["hello"], &["456"]]);
        let schema = SchemaInferrer::infer_from_records(&header(&["value"]), &records).unwrap();

        assert_eq!(schema.columns[0].sql_type, SqlType::Text);
    }

    #[test]
    fn test_numeric_promotion() {
        let records = rows(&[&["1"], &["100000"], &["3.14"]]);
        let schema = SchemaInferrer::infer_from_records(&header(&["value"]), &records).unwrap();

        assert_eq!(schema.columns[0].sql_type, SqlType::DoublePrecision);
    }

    #[test]
    fn test_header_only_yields_text_columns() {
        let schema = SchemaInferrer::infer_from_records(&header(&["a", "b"]), &[]).unwrap();

        assert_eq!(schema.columns.len(), 2);
        assert!(
            schema
                .columns
                .iter()
                .all(|c| c.sql_type == SqlType::Text && c.nullable)
        );
    }

    #[test]
    fn test_short_rows_count_as_nulls() {
        let records = rows(&[&["1", "x"], &["2"]]);
        let schema = SchemaInferrer::infer_from_records(&header(&["id", "tag"]), &records).unwrap();

        assert_eq!(schema.columns[1].sql_type, SqlType::Text);
        assert!(schema.columns[1].nullable);
        assert!(!schema.columns[0].nullable);
    }

    #[test]
    fn test_generate_ddl() {
        let schema = Schema {
            columns: vec![
                Column {
                    name: "VendorID".to_string(),
                    sql_type: SqlType::Integer,
                    nullable: false,
                },
                Column {
                    name: "store_and_fwd_flag".to_string(),
                    sql_type: SqlType::Text,
                    nullable: true,
                },
                Column {
                    name: "fare_amount".to_string(),
                    sql_type: SqlType::DoublePrecision,
                    nullable: true,
                },
            ],
        };

        let ddl = generate_ddl("yellow_taxi_trips", &schema);

        assert!(ddl.starts_with("CREATE TABLE \"yellow_taxi_trips\""));
        assert!(ddl.contains("\"VendorID\" INTEGER NOT NULL"));
        assert!(ddl.contains("\"store_and_fwd_flag\" TEXT"));
        assert!(!ddl.contains("\"store_and_fwd_flag\" TEXT NOT NULL"));
        assert!(ddl.contains("\"fare_amount\" DOUBLE PRECISION"));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("zones"), "\"zones\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_schema_from_arrow() {
        let arrow_schema = ArrowSchema::new(vec![
            Field::new("VendorID", DataType::Int32, true),
            Field::new(
                "tpep_pickup_datetime",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Field::new("passenger_count", DataType::Int64, true),
            Field::new("trip_distance", DataType::Float64, false),
            Field::new("store_and_fwd_flag", DataType::Utf8, true),
            Field::new(
                "dropoff_at",
                DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
                true,
            ),
            Field::new("price", DataType::Decimal128(10, 2), true),
        ]);

        let schema = Schema::from_arrow(&arrow_schema).unwrap();
        let types: Vec<SqlType> = schema.columns.iter().map(|c| c.sql_type).collect();

        assert_eq!(
            types,
            vec![
                SqlType::Integer,
                SqlType::Timestamp,
                SqlType::BigInt,
                SqlType::DoublePrecision,
                SqlType::Text,
                SqlType::TimestampTz,
                SqlType::Numeric,
            ]
        );
        assert!(schema.columns[0].nullable);
        assert!(!schema.columns[3].nullable);
    }

    #[test]
    fn test_schema_from_arrow_rejects_nested_types() {
        let arrow_schema = ArrowSchema::new(vec![Field::new(
            "tags",
            DataType::List(std::sync::Arc::new(Field::new("item", DataType::Utf8, true))),
            true,
        )]);

        let err = Schema::from_arrow(&arrow_schema).unwrap_err();
        assert!(err.to_string().contains("tags"));
    }

    #[test]
    fn test_date_parsing() {
        let test_cases = [
            ("2025-01-01", SqlType::Date, "ISO date"),
            ("2024-02-29", SqlType::Date, "Valid leap year"),
            ("2025-02-29", SqlType::Text, "Invalid non-leap year Feb 29"),
            ("2025-13-01", SqlType::Text, "Invalid month 13"),
            ("2025-04-31", SqlType::Text, "April 31 doesn't exist"),
            ("12/25/2025", SqlType::Text, "Ambiguous US format"),
        ];

        for (input, expected, description) in test_cases {
            assert_eq!(
                SchemaInferrer::infer_value_type(input),
                Some(expected),
                "Failed: {} - input '{}'",
                description,
                input
            );
        }
    }

    #[test]
    fn test_timestamp_parsing() {
        let test_cases = [
            ("2025-01-01T12:34:56", SqlType::Timestamp, "ISO 8601"),
            ("2025-01-01 12:34:56", SqlType::Timestamp, "SQL format"),
            ("2025-01-01 12:34", SqlType::Timestamp, "Without seconds"),
            (
                "2025-01-01 12:34:56.123",
                SqlType::Timestamp,
                "With fractional seconds",
            ),
            ("path/to/file:123", SqlType::Text, "File path"),
            ("http://example.com:8080", SqlType::Text, "URL"),
        ];

        for (input, expected, description) in test_cases {
            assert_eq!(
                SchemaInferrer::infer_value_type(input),
                Some(expected),
                "Failed: {} - input '{}'",
                description,
                input
            );
        }
    }

    #[test]
    fn test_dates_load_into_timestamp_columns() {
        let schema = SchemaInferrer::infer_from_records(
            &["picked_up".to_string()],
            &rows(&[&["2025-01-01"], &["2025-01-01 08:15:00"]]),
        )
        .unwrap();
        assert_eq!(schema.columns[0].sql_type, SqlType::Timestamp);

        let midnight = parse_timestamp("2025-01-01").unwrap();
        assert_eq!(midnight.to_string(), "2025-01-01 00:00:00");
        assert!(parse_timestamp("2025-02-30").is_none());
    }
}
