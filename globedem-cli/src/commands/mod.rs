pub mod ascii;
pub mod download;
pub mod info;
pub mod query;
