//! Analytics engine services
//!
//! Small, constructed service objects (no global state) composed by the
//! application. The recorder is the write path; the aggregator, trend and
//! summary builders are independent read-side components.

pub mod bot_detector;
pub mod insight_aggregator;
pub mod profile_tracker;
pub mod recorder;
pub mod scorer;
pub mod summary_builder;
pub mod trend_builder;
pub mod verification_reader;

pub use bot_detector::BotDetector;
pub use insight_aggregator::InsightAggregator;
pub use profile_tracker::ProfileTracker;
pub use recorder::{Demographics, ParticipationRecorder, RecordOutcome};
pub use scorer::TierScorer;
pub use summary_builder::SummaryBuilder;
pub use trend_builder::{DailyCount, TrendBuilder};
pub use verification_reader::VerificationReader;
