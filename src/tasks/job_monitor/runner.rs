use std::time::Duration;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{info_span, Instrument};

use super::pipeline::run_once;
use crate::context::AppContext;

/// Background task that runs the job pipeline on a fixed interval.
///
/// Runs happen inside the one task, so a run that overruns the interval
/// delays the next tick instead of overlapping it.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Spawns the scheduler. The first run happens one full `every` after
    /// start.
    pub fn start(ctx: AppContext, every: Duration) -> Self {
        let (shutdown, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            log::info!("Starting job monitor, polling every {}s", every.as_secs());
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let span = info_span!("job_poll");
                        if let Err(e) = run_once(&ctx).instrument(span).await {
                            log::error!("Job poll failed: {e}");
                        }
                    }
                    _ = stop_rx.changed() => {
                        log::info!("Job monitor stopping");
                        break;
                    }
                }
            }
        });

        Scheduler { shutdown, handle }
    }

    /// Signals the task and waits for it. A run in progress finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            log::error!("Job monitor task ended abnormally: {e}");
        }
    }
}
