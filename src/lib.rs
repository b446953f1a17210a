pub mod bundle;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod cross_validation;
pub mod csv_loader;
pub mod error;
pub mod feature_extractor;
pub mod folds;
pub mod predictor;
pub mod softmax;
pub mod stream;
pub mod types;
pub mod window_buffer;

pub use classifier::Classifier;
pub use config::TrainerConfig;
pub use controller::{OnlineTrainer, SessionReport};
pub use error::{Result, TrainerError};
pub use predictor::{FeatureSource, RealTimePredictor, Vote};
