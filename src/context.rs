use std::sync::Arc;

use crate::{
    cover_letter::CoverLetterGenerator,
    tasks::{email_sender::delivery::Notifier, job_monitor::feed_reader::FeedSource, types::Timeouts},
    DbPool,
};

/// Everything a pipeline run needs: the store plus the three external
/// collaborators. Built once by the process entry point and cloned into the
/// scheduler task.
#[derive(Clone)]
pub struct AppContext {
    pub pool: DbPool,
    pub feeds: Arc<dyn FeedSource>,
    pub generator: Arc<dyn CoverLetterGenerator>,
    pub notifier: Arc<dyn Notifier>,
    pub timeouts: Timeouts,
}

impl AppContext {
    pub fn new(
        pool: DbPool,
        feeds: Arc<dyn FeedSource>,
        generator: Arc<dyn CoverLetterGenerator>,
        notifier: Arc<dyn Notifier>,
        timeouts: Timeouts,
    ) -> Self {
        AppContext {
            pool,
            feeds,
            generator,
            notifier,
            timeouts,
        }
    }
}
