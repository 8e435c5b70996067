pub mod bundle;
pub mod performance_tracker;
pub mod simulator;
pub mod state;
pub mod submission;

pub use bundle::{Bundle, BundleBuilder};
pub use performance_tracker::{PerformanceTracker, SimulationStats};
pub use simulator::Simulator;
pub use state::StateMachine;
pub use submission::{BundleCollector, SubmissionSink};
