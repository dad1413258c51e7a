//! Paged replication of RESO Web API resources
//!
//! A [`RequestDescriptor`] names what to fetch, a [`ReplicationStrategy`]
//! decides how the next page is addressed, the [`ReplicationIterator`] walks
//! the pages and the [`Replicator`] runs descriptors end to end.

pub mod iterator;
pub mod orchestrator;
pub mod page;
pub mod request;
pub mod strategy;
pub mod writer;

pub use iterator::{DEFAULT_MAX_ERROR_COUNT, IteratorOptions, IteratorStatus, ReplicationIterator};
pub use orchestrator::{DescriptorSummary, ReplicationOutcome, Replicator, RunSummary, StopReason};
pub use page::{IterationState, PageError, PageErrorKind, PageResult};
pub use request::RequestDescriptor;
pub use strategy::{DEFAULT_PAGE_SIZE, ReplicationStrategy, build_request_uri};
pub use writer::{DirectoryPageWriter, JsonReportWriter, PageWriter, ReportWriter};
