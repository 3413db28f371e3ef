//! Decoders turning Parquet and CSV input into [`JourneyRecord`]s.
//!
//! Parquet is read through Arrow: only the mapped columns are projected and,
//! when a line set is given, the line predicate runs inside the reader so
//! rows of other lines are never decoded. Column types are normalised with
//! Arrow casts, text columns go through the same parsers as CSV fields.

use std::collections::HashSet;
use std::io::Read;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Date32Type, Float64Type, Time32SecondType, TimeUnit, TimestampSecondType,
};
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{
    ArrowPredicate, ArrowPredicateFn, ArrowReaderBuilder, ParquetRecordBatchReaderBuilder,
    RowFilter,
};
use parquet::file::reader::ChunkReader;
use parquet::schema::types::SchemaDescriptor;
use tracing::debug;

use crate::config::ColumnMapping;
use crate::error::{DashboardError, Result};
use crate::record::JourneyRecord;

const BATCH_SIZE: usize = 8192;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// What to read from a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    pub columns: ColumnMapping,
    /// When set, rows of other lines may be skipped while reading.
    pub lines: Option<HashSet<String>>,
}

impl ScanRequest {
    pub fn new(columns: ColumnMapping) -> Self {
        Self {
            columns,
            lines: None,
        }
    }

    pub fn with_lines(mut self, lines: impl IntoIterator<Item = String>) -> Self {
        self.lines = Some(lines.into_iter().collect());
        self
    }

    fn keeps(&self, line: &str) -> bool {
        self.lines.as_ref().is_none_or(|l| l.contains(line))
    }
}

/// Records decoded from one input plus the count of rows that could not be placed.
#[derive(Debug, Default)]
pub struct Decoded {
    pub records: Vec<JourneyRecord>,
    /// Rows lacking a date, line or arrival time.
    pub dropped: usize,
}

impl Decoded {
    fn append(&mut self, mut other: Decoded) {
        self.records.append(&mut other.records);
        self.dropped += other.dropped;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Parquet,
    Csv,
    CsvGz,
}

impl FileFormat {
    /// Picks the decoder from a file name or the path part of a URL.
    ///
    /// `name` is taken literally: callers holding a URL pass its path, never
    /// the query or fragment.
    pub fn detect(name: &str) -> Result<Self> {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".parquet") || name.ends_with(".pq") {
            Ok(Self::Parquet)
        } else if name.ends_with(".csv") {
            Ok(Self::Csv)
        } else if name.ends_with(".csv.gz") {
            Ok(Self::CsvGz)
        } else {
            Err(DashboardError::Decode(format!(
                "unsupported file type for '{name}', expected .parquet, .csv or .csv.gz"
            )))
        }
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
}

pub fn parse_arrival(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .map(|dt| dt.time())
        .or_else(|| {
            TIME_FORMATS
                .iter()
                .find_map(|f| NaiveTime::parse_from_str(s, f).ok())
        })
}

pub fn parse_delay(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.round() as i64))
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}

/// Assembles a record from already-typed fields, or `None` if it cannot be placed.
fn assemble(
    date: Option<NaiveDate>,
    line: Option<&str>,
    trip_id: Option<&str>,
    stop_name: Option<&str>,
    arrival: Option<NaiveTime>,
    delay_min: Option<i64>,
    cancelled: Option<bool>,
) -> Option<JourneyRecord> {
    let line = line.map(str::trim).filter(|l| !l.is_empty())?;
    Some(JourneyRecord {
        date: date?,
        line: line.to_string(),
        trip_id: trip_id.unwrap_or_default().to_string(),
        stop_name: stop_name.unwrap_or_default().to_string(),
        arrival: arrival?,
        delay_min: delay_min.unwrap_or(0),
        cancelled: cancelled.unwrap_or(false),
    })
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| DashboardError::MissingColumn(name.to_string()))
}

fn is_text(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Dictionary(_, _)
    )
}

fn text_values(array: &ArrayRef) -> Result<Vec<Option<String>>> {
    let text = cast(array, &DataType::Utf8)?;
    Ok(text
        .as_string::<i32>()
        .iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

fn date_values(array: &ArrayRef) -> Result<Vec<Option<NaiveDate>>> {
    if is_text(array.data_type()) {
        return Ok(text_values(array)?
            .into_iter()
            .map(|v| v.as_deref().and_then(parse_date))
            .collect());
    }
    let dates = cast(array, &DataType::Date32)?;
    let dates = dates.as_primitive::<Date32Type>();
    Ok((0..dates.len())
        .map(|i| {
            if dates.is_null(i) {
                None
            } else {
                dates.value_as_date(i)
            }
        })
        .collect())
}

fn arrival_values(array: &ArrayRef) -> Result<Vec<Option<NaiveTime>>> {
    match array.data_type() {
        dt if is_text(dt) => Ok(text_values(array)?
            .into_iter()
            .map(|v| v.as_deref().and_then(parse_arrival))
            .collect()),
        DataType::Time32(_) | DataType::Time64(_) => {
            let times = cast(array, &DataType::Time32(TimeUnit::Second))?;
            let times = times.as_primitive::<Time32SecondType>();
            Ok((0..times.len())
                .map(|i| {
                    if times.is_null(i) {
                        None
                    } else {
                        times.value_as_time(i)
                    }
                })
                .collect())
        }
        _ => {
            let stamps = cast(array, &DataType::Timestamp(TimeUnit::Second, None))?;
            let stamps = stamps.as_primitive::<TimestampSecondType>();
            Ok((0..stamps.len())
                .map(|i| {
                    if stamps.is_null(i) {
                        None
                    } else {
                        stamps.value_as_datetime(i).map(|dt| dt.time())
                    }
                })
                .collect())
        }
    }
}

fn delay_values(array: &ArrayRef) -> Result<Vec<Option<i64>>> {
    if is_text(array.data_type()) {
        return Ok(text_values(array)?
            .into_iter()
            .map(|v| v.as_deref().and_then(parse_delay))
            .collect());
    }
    let delays = cast(array, &DataType::Float64)?;
    Ok(delays
        .as_primitive::<Float64Type>()
        .iter()
        .map(|v| v.filter(|v| v.is_finite()).map(|v| v.round() as i64))
        .collect())
}

fn bool_values(array: &ArrayRef) -> Result<Vec<Option<bool>>> {
    if is_text(array.data_type()) {
        return Ok(text_values(array)?
            .into_iter()
            .map(|v| v.as_deref().and_then(parse_bool))
            .collect());
    }
    let flags = cast(array, &DataType::Boolean)?;
    Ok(flags.as_boolean().iter().collect())
}

/// Decodes one Arrow batch into journey records.
pub fn decode_batch(batch: &RecordBatch, scan: &ScanRequest) -> Result<Decoded> {
    let cols = &scan.columns;
    let dates = date_values(column(batch, &cols.date)?)?;
    let lines = text_values(column(batch, &cols.line)?)?;
    let trips = text_values(column(batch, &cols.trip_id)?)?;
    let stops = text_values(column(batch, &cols.stop_name)?)?;
    let arrivals = arrival_values(column(batch, &cols.arrival)?)?;
    let delays = delay_values(column(batch, &cols.delay_min)?)?;
    let cancelled = bool_values(column(batch, &cols.cancelled)?)?;

    let mut out = Decoded::default();
    for i in 0..batch.num_rows() {
        match assemble(
            dates[i],
            lines[i].as_deref(),
            trips[i].as_deref(),
            stops[i].as_deref(),
            arrivals[i],
            delays[i],
            cancelled[i],
        ) {
            Some(r) if scan.keeps(&r.line) => out.records.push(r),
            Some(_) => {}
            None => out.dropped += 1,
        }
    }
    Ok(out)
}

fn leaf_index(schema: &SchemaDescriptor, name: &str) -> Result<usize> {
    schema
        .columns()
        .iter()
        .position(|c| c.name() == name)
        .ok_or_else(|| DashboardError::MissingColumn(name.to_string()))
}

/// Restricts a Parquet reader to the mapped columns and, when requested,
/// pushes the line predicate into it.
pub(crate) fn configure_reader<T>(
    builder: ArrowReaderBuilder<T>,
    scan: &ScanRequest,
) -> Result<ArrowReaderBuilder<T>> {
    let schema = builder.parquet_schema();
    let leaves = scan
        .columns
        .names()
        .into_iter()
        .map(|name| leaf_index(schema, name))
        .collect::<Result<Vec<_>>>()?;
    let projection = ProjectionMask::leaves(schema, leaves);

    let row_filter = match &scan.lines {
        Some(lines) => {
            let mask = ProjectionMask::leaves(schema, [leaf_index(schema, &scan.columns.line)?]);
            let lines = lines.clone();
            let predicate = ArrowPredicateFn::new(mask, move |batch: RecordBatch| {
                let values = cast(batch.column(0), &DataType::Utf8)?;
                Ok(values
                    .as_string::<i32>()
                    .iter()
                    .map(|v| Some(v.is_some_and(|s| lines.contains(s.trim()))))
                    .collect::<BooleanArray>())
            });
            let predicates: Vec<Box<dyn ArrowPredicate>> = vec![Box::new(predicate)];
            Some(RowFilter::new(predicates))
        }
        None => None,
    };

    let builder = builder
        .with_projection(projection)
        .with_batch_size(BATCH_SIZE);
    Ok(match row_filter {
        Some(filter) => builder.with_row_filter(filter),
        None => builder,
    })
}

/// Reads a Parquet file (or in-memory buffer).
pub fn read_parquet<R: ChunkReader + 'static>(reader: R, scan: &ScanRequest) -> Result<Decoded> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(reader)?;
    debug!(
        rows = builder.metadata().file_metadata().num_rows(),
        row_groups = builder.metadata().num_row_groups(),
        "Opened parquet input"
    );
    let reader = configure_reader(builder, scan)?.build()?;

    let mut out = Decoded::default();
    for batch in reader {
        out.append(decode_batch(&batch?, scan)?);
    }
    Ok(out)
}

/// Reads CSV with a header row naming the mapped columns.
pub fn read_csv<R: Read>(reader: R, scan: &ScanRequest) -> Result<Decoded> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let index = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| DashboardError::MissingColumn(name.to_string()))
    };
    let cols = &scan.columns;
    let [date, line, trip, stop, arrival, delay, cancelled] = [
        index(&cols.date)?,
        index(&cols.line)?,
        index(&cols.trip_id)?,
        index(&cols.stop_name)?,
        index(&cols.arrival)?,
        index(&cols.delay_min)?,
        index(&cols.cancelled)?,
    ];

    let mut out = Decoded::default();
    for row in rdr.records() {
        let row = row?;
        let record = assemble(
            row.get(date).and_then(parse_date),
            row.get(line),
            row.get(trip),
            row.get(stop),
            row.get(arrival).and_then(parse_arrival),
            row.get(delay).and_then(parse_delay),
            row.get(cancelled).and_then(parse_bool),
        );
        match record {
            Some(r) if scan.keeps(&r.line) => out.records.push(r),
            Some(_) => {}
            None => out.dropped += 1,
        }
    }
    Ok(out)
}

/// Reads a gzip-compressed CSV.
pub fn read_csv_gz<R: Read>(reader: R, scan: &ScanRequest) -> Result<Decoded> {
    read_csv(flate2::read::GzDecoder::new(reader), scan)
}
