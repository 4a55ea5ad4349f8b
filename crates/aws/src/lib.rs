//! S3-compatible object store provider for turbocache
//!
//! [`ObjectStoreProvider`] implements the storage contract on top of
//! `aws-sdk-s3`, so it works against AWS S3 and any compatible service
//! reachable through a custom endpoint.

mod parts;
pub mod s3;

pub use parts::PART_SIZE;
pub use s3::ObjectStoreProvider;
