pub mod embed;
pub mod file_store;
pub mod image_service;
pub mod ledger;
pub mod media_service;
pub mod serving;
pub mod sniffer;
pub mod transport;
pub mod validator;
