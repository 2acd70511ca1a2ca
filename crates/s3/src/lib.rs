//! bulkup-s3: S3 SDK adapter for bulkup
//!
//! This crate implements the `ObjectStore` trait from bulkup-core on top of
//! aws-sdk-s3, targeting AWS S3 and S3-compatible services.

mod client;

pub use client::{S3Store, classify_status};
