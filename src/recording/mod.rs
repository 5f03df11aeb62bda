pub mod paths;
pub mod recorder;
pub mod report;
pub mod store;

pub use self::paths::OutputLocation;
pub use self::recorder::{CaptureTicket, Recorder, StopOutcome};
pub use self::report::{save_report, FrequencyReport};
pub use self::store::FrameStore;
