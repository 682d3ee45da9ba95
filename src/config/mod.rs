pub mod duration;
pub mod loader;
pub mod types;

pub use duration::{parse_duration, parse_think_time};
pub use loader::{Execution, ReportSettings, ScenarioLoader, TestPlan};
pub use types::{ScenarioConfig, ScenarioFile};
