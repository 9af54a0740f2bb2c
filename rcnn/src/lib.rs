pub mod activation;
pub mod config;
pub mod dtype;
pub mod error;
pub mod loss;
pub mod math;
pub mod net;
pub mod persist;
pub mod scoring;
pub mod tensor;
pub mod util;

pub use error::{Error, Result};
