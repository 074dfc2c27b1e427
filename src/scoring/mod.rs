pub mod aggregator;
pub mod sink;

pub use aggregator::{ScoreAggregator, SessionSummary};
pub use sink::{build_payload, HttpResultSink, ResultSink, SubmissionConfig};
