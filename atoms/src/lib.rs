//! Domain atoms for the photo service.
//!
//! `photos` owns the upload path into the photo bucket, `records` owns the
//! metadata table the storage trigger keeps in step with that bucket.
//! Everything here takes its clients as arguments.

pub mod error;
pub mod memory;
pub mod photos;
pub mod records;
pub mod response;

pub use error::PhotoError;
