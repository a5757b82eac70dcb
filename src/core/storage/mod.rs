// Storage layer orchestration - startup sequence and shutdown.

mod storage_service;

pub use storage_service::StorageLayer;
