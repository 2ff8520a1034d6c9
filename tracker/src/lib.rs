//! GazeHome tracker library: webcam-feature gaze estimation for hands-free
//! control.
//!
//! Per-user calibration fits a regression model from facial features to
//! screen coordinates; the gaze loop smooths its output and turns it into
//! blink and dwell clicks. The binary entry point lives in `main.rs`.

pub mod calibration;
pub mod clock;
pub mod config;
pub mod error;
pub mod feature_source;
pub mod features;
pub mod filter;
pub mod gaze_loop;
pub mod health;
pub mod interaction;
pub mod model;
pub mod screen;
pub mod simulate;

pub use calibration::{CalibrationConfig, CalibrationSession, CalibrationState, PointLayout};
pub use config::TrackerConfig;
pub use error::{CalibrationError, ErrorKind, FilterError, TrainingFailure};
pub use features::{FeatureVector, HeadPose};
pub use gaze_loop::{GazeLoop, GazeUpdateEvent};
pub use model::{ModelKind, TrainedModel};
pub use screen::{GazePoint, ScreenSize};
