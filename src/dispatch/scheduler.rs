use crate::model::NotificationFrequency;
use crate::server::AppState;
use crate::settings::NotificationSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;

/// Registers the two periodic notification triggers. Each trigger, when it
/// fires, starts exactly one run for its frequency; overlap with a still
/// running previous run is handled inside the dispatcher. Shutdown stops new
/// triggers while an in-flight run finishes naturally.
#[instrument(level = "debug", skip(task_tracker, app))]
pub fn spawn_schedules(
    task_tracker: &TaskTracker, app: &AppState, settings: &NotificationSettings,
) {
    let schedules = [
        (NotificationFrequency::Hourly, settings.hourly_period),
        (NotificationFrequency::Daily, settings.daily_period),
    ];

    for (frequency, period) in schedules {
        let dispatcher = Arc::clone(&app.dispatcher);
        task_tracker.spawn(async move {
            run_schedule(dispatcher, frequency, period).await;
        });
    }
}

async fn run_schedule(
    dispatcher: Arc<crate::server::Dispatcher>, frequency: NotificationFrequency, period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first interval tick completes immediately; consume it so the first
    // run fires one full period after startup
    interval.tick().await;

    info!(%frequency, ?period, "notification schedule started");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let outcome = dispatcher.run(frequency).await;
                info!(%frequency, ?outcome, "scheduled notification run finished");
            },
            _ = crate::shutdown() => {
                info!(%frequency, "shutdown signal received, stopping notification schedule");
                break;
            },
        }
    }
}
