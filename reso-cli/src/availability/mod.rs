//! Data availability scoring and reporting

pub mod models;
pub mod report;
pub mod scorer;
pub mod stats;

pub use models::{
    AvailabilityAccumulator, FieldAvailability, ResourceAvailability, ResourceKey, ResponseInfo,
};
pub use report::{
    AvailabilityReport, ConsolidatedReport, FieldReport, REPORT_FILE_NAME, ReportSettings,
    ResourceReport, consolidate,
};
pub use scorer::{ScoringConfig, ScoringContext, score_page, score_payload};
