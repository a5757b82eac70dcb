// Storage configuration - keys, typed settings and the provider port.

mod storage_config;

pub use storage_config::*;
