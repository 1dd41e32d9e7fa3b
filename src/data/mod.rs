//! Data storage
//!
//! Price samples and trade logs in Parquet for replay and analysis

mod parquet;

pub use parquet::{
    price_sample_schema, read_price_samples, trade_schema, ParquetReader, ParquetWriter,
};
