//! Fitted feature transforms shared by the latent builder and the classifiers

pub mod encoder;
pub mod scaler;

pub use encoder::OneHotEncoder;
pub use scaler::RobustScaler;
