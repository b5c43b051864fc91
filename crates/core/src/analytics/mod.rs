pub mod aggregate;
pub mod error;
pub mod price;
pub mod recommend;
pub mod stats;
