pub mod account;
pub mod amendment;
pub mod entry;
pub mod policy;
pub mod progress;
pub mod request;
