pub mod file_field;
pub mod lease_sweeper;
pub mod memory_storage;
pub mod object_urls;
pub mod preview;
pub mod storage;
pub mod upload_coordinator;
pub mod upload_transport;
