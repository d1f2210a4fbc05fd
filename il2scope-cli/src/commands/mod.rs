pub mod common;
pub mod exports;
pub mod info;
pub mod resolve;
pub mod scan;
