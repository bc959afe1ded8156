pub mod cache;
pub mod export;
pub mod model;
pub mod source;
