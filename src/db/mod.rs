//! Database layer - connection pooling, schema inference and DDL

pub mod pool;
pub mod schema;

pub use pool::{Pool, PoolTransaction};
pub use schema::{Schema, SchemaInferrer};
