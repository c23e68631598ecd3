pub mod errors;
pub mod fees;
pub mod models;
pub mod refund;
pub mod services;
