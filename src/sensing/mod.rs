pub mod config;
pub mod controller;
pub mod detector;
pub mod locator;
pub mod loop_worker;
pub mod patterns;
pub mod reader;
pub mod supervisor;

pub use config::SensingConfig;
pub use controller::{PipelineHandle, SensingController};
pub use detector::SubmissionDetector;
pub use locator::{InputLocator, LocatedInput};
pub use loop_worker::Submission;
pub use reader::read_value;
pub use supervisor::{PipelinePhase, PipelineStatus};
