pub mod progress;
pub mod schedule;
pub mod session;

pub use progress::{ProgressError, ProgressSnapshot, ProgressTracker, StageState};
pub use schedule::{ScheduleStep, StageMark, StageSchedule};
pub use session::{Session, SessionTag, StartRequest};
