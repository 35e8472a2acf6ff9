pub mod janitor;
pub mod relay;
pub mod staging;
pub mod telegram;
pub mod transport;
pub mod upload_service;
