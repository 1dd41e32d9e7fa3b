//! Parquet storage for price samples and trade logs

use crate::history::PriceSample;
use crate::position::ClosedPosition;
use arrow::array::{
    Array, ArrayRef, BooleanArray, StringArray, TimestampMicrosecondArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

fn timestamp_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    )
}

/// Price sample schema
///
/// Decimals are stored as strings to keep their exact value.
pub fn price_sample_schema() -> Schema {
    Schema::new(vec![
        timestamp_field("timestamp"),
        Field::new("market_id", DataType::Utf8, false),
        Field::new("price", DataType::Utf8, false),
        Field::new("volume", DataType::Utf8, true),
    ])
}

/// Closed trade schema
pub fn trade_schema() -> Schema {
    Schema::new(vec![
        Field::new("position_id", DataType::UInt64, false),
        Field::new("market_id", DataType::Utf8, false),
        Field::new("side", DataType::Utf8, false),
        Field::new("size", DataType::Utf8, false),
        Field::new("entry_price", DataType::Utf8, false),
        Field::new("exit_price", DataType::Utf8, false),
        timestamp_field("opened_at"),
        timestamp_field("closed_at"),
        Field::new("reason", DataType::Utf8, false),
        Field::new("gross_pnl", DataType::Utf8, false),
        Field::new("fees", DataType::Utf8, false),
        Field::new("realized_pnl", DataType::Utf8, false),
        Field::new("needs_review", DataType::Boolean, false),
    ])
}

fn micros<T>(rows: &[T], f: impl Fn(&T) -> DateTime<Utc>) -> ArrayRef {
    let values: Vec<i64> = rows.iter().map(|r| f(r).timestamp_micros()).collect();
    Arc::new(TimestampMicrosecondArray::from(values).with_timezone("UTC"))
}

fn decimals<T>(rows: &[T], f: impl Fn(&T) -> Decimal) -> ArrayRef {
    let values: Vec<String> = rows.iter().map(|r| f(r).to_string()).collect();
    Arc::new(StringArray::from(values))
}

fn strings<T>(rows: &[T], f: impl Fn(&T) -> String) -> ArrayRef {
    let values: Vec<String> = rows.iter().map(f).collect();
    Arc::new(StringArray::from(values))
}

/// Writes Parquet files with a fixed compression
pub struct ParquetWriter {
    compression: Compression,
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
        }
    }

    /// Write price samples; nothing is created for an empty slice
    pub fn write_price_samples(&self, path: &Path, samples: &[PriceSample]) -> anyhow::Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let volumes: Vec<Option<String>> = samples
            .iter()
            .map(|s| s.volume.map(|v| v.to_string()))
            .collect();
        let columns = vec![
            micros(samples, |s| s.timestamp),
            strings(samples, |s| s.market_id.clone()),
            decimals(samples, |s| s.price),
            Arc::new(StringArray::from(volumes)) as ArrayRef,
        ];
        self.write_batch(path, price_sample_schema(), columns)?;

        tracing::debug!(path = ?path, count = samples.len(), "Wrote price samples to Parquet");
        Ok(())
    }

    /// Write the closed trade log; nothing is created for an empty slice
    pub fn write_trades(&self, path: &Path, trades: &[ClosedPosition]) -> anyhow::Result<()> {
        if trades.is_empty() {
            return Ok(());
        }

        let ids: Vec<u64> = trades.iter().map(|t| t.position.id).collect();
        let review: Vec<bool> = trades.iter().map(|t| t.position.needs_review).collect();
        let columns = vec![
            Arc::new(UInt64Array::from(ids)) as ArrayRef,
            strings(trades, |t| t.position.market_id.clone()),
            strings(trades, |t| t.position.side.to_string()),
            decimals(trades, |t| t.position.size),
            decimals(trades, |t| t.position.entry_price),
            decimals(trades, |t| t.exit_price),
            micros(trades, |t| t.position.opened_at),
            micros(trades, |t| t.closed_at),
            strings(trades, |t| t.reason.as_str().to_string()),
            decimals(trades, |t| t.gross_pnl),
            decimals(trades, |t| t.fees),
            decimals(trades, |t| t.realized_pnl),
            Arc::new(BooleanArray::from(review)) as ArrayRef,
        ];
        self.write_batch(path, trade_schema(), columns)?;

        tracing::debug!(path = ?path, count = trades.len(), "Wrote trades to Parquet");
        Ok(())
    }

    fn write_batch(&self, path: &Path, schema: Schema, columns: Vec<ArrayRef>) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let schema = Arc::new(schema);
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .build();
        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

        let batch = RecordBatch::try_new(schema, columns)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }
}

/// Reader for Parquet files
pub struct ParquetReader {
    path: PathBuf,
}

impl ParquetReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read price samples in file order
    pub fn read_price_samples(&self) -> anyhow::Result<Vec<PriceSample>> {
        let file = File::open(&self.path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut samples = Vec::new();
        for batch in reader {
            let batch = batch?;

            let timestamps = column::<TimestampMicrosecondArray>(&batch, "timestamp")?;
            let markets = column::<StringArray>(&batch, "market_id")?;
            let prices = column::<StringArray>(&batch, "price")?;
            let volumes = column::<StringArray>(&batch, "volume")?;

            for i in 0..batch.num_rows() {
                let timestamp = DateTime::from_timestamp_micros(timestamps.value(i))
                    .ok_or_else(|| anyhow::anyhow!("Invalid timestamp in row {}", i))?;
                let mut sample = PriceSample::new(
                    markets.value(i),
                    timestamp,
                    Decimal::from_str(prices.value(i))?,
                );
                if volumes.is_valid(i) {
                    sample = sample.with_volume(Decimal::from_str(volumes.value(i))?);
                }
                samples.push(sample);
            }
        }

        tracing::debug!(path = ?self.path, count = samples.len(), "Read price samples from Parquet");
        Ok(samples)
    }
}

/// Read every price sample in a file
pub fn read_price_samples(path: impl AsRef<Path>) -> anyhow::Result<Vec<PriceSample>> {
    ParquetReader::new(path.as_ref()).read_price_samples()
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow::anyhow!("Invalid {} column", name))
}
