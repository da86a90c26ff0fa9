pub mod images;
pub mod loaders;
pub mod result;
pub mod settings;
pub mod stage;

pub use images::{ImageHandle, ImagePair};
pub use loaders::load_settings_file;
pub use result::{
    AnalysisMetrics, AnalyzeResponse, Decision, HealthStatus, QcResult, ReportHandle,
    UploadResponse,
};
pub use settings::{QcSettings, ScoreThresholds};
pub use stage::{Stage, StageId, StageRegistry};
