pub mod config;
pub mod error;
pub mod logging;
pub mod occurrence_repository;
pub mod quota_repository;
pub mod storage;
