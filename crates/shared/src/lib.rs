// Public modules
pub mod claude;
pub mod clustering;
pub mod config;
pub mod extractor;
pub mod heat;
pub mod io;
pub mod mock;
pub mod model;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod selector;
pub mod sources;

// Re-export commonly used types
pub use claude::ClaudeTopicModel;
pub use clustering::{ClusterError, TopicClusterer};
pub use config::{Credentials, MonitorConfig};
pub use extractor::{ExtractionFailure, FailureReason, TopicExtractor};
pub use heat::HeatScorer;
pub use io::RunStore;
pub use mock::MockTopicModel;
pub use model::{ModelError, TopicModel, TopicSignal};
pub use models::{
    Article, Category, DegradationFlag, RunSlot, SelectionResult, TimeWindow, TopicCandidate,
    TopicCluster,
};
pub use pipeline::{Pipeline, PipelineError};
pub use report::{MarkdownReportSink, ReportSink};
pub use scheduler::{run_slot, MonitorScheduler};
pub use selector::Selector;
pub use sources::{ArticleSource, RssArticleSource};
