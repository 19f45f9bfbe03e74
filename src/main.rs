use clap::Parser;
use settings_loader::{LoadingOptions, SettingsLoader};
use tokio_util::task::TaskTracker;
use weather_notify::server::{self, AppState};
use weather_notify::CliOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = weather_notify::setup_tracing::get_tracing_subscriber("info");
    weather_notify::setup_tracing::init_subscriber(subscriber);

    let options = CliOptions::parse();
    if options.secrets.is_none() {
        tracing::warn!("No secrets configuration provided. Passwords and API keys (e.g., for the database and weather providers) should be confined to a secret configuration and sourced in a secure manner.");
    }
    let settings = load_settings(&options);
    tracing::info!("settings = {settings:?}");
    let settings = settings?;

    let app_state = AppState::new(&settings).await?;

    let task_tracker = TaskTracker::new();
    weather_notify::dispatch::spawn_schedules(&task_tracker, &app_state, &settings.notification);

    let server = server::Server::build(app_state, &settings).await?;
    tracing::info!(?server, "starting server...");
    let run_result = server.run_until_stopped().await;

    task_tracker.close();
    task_tracker.wait().await;
    run_result.map_err(|err| err.into())
}

#[tracing::instrument(level = "debug", ret, err)]
fn load_settings(options: &CliOptions) -> anyhow::Result<weather_notify::Settings> {
    let app_environment = std::env::var(CliOptions::env_app_environment()).ok();
    if app_environment.is_none() {
        tracing::info!("No environment configuration override provided.");
    }

    weather_notify::Settings::load(options).map_err(|err| err.into())
}
