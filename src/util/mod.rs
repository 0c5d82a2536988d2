pub mod rolling_mean;

pub use rolling_mean::RollingMean;
