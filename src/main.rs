//! Binary entrypoint: one run of the digest pipeline.
//! One parameterless pass per invocation; scheduling is left to cron / CI.

use std::process::ExitCode;

use topic_digest_bot::config::{load_settings_default, Settings};
use topic_digest_bot::notify::telegram::TelegramMessenger;
use topic_digest_bot::pipeline::{http_client, report_failure};
use topic_digest_bot::{init_tracing, Pipeline};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when the scheduler injects the environment.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = match load_settings_default() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = ?e, "cannot load settings");
            report_with_env_credentials(&e).await;
            return ExitCode::FAILURE;
        }
    };

    let pipeline = match Pipeline::from_settings(settings) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = ?e, "cannot build pipeline");
            report_with_env_credentials(&e).await;
            return ExitCode::FAILURE;
        }
    };

    match pipeline.run(chrono::Utc::now()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

/// Best-effort operator report when no profile could be loaded.
async fn report_with_env_credentials(err: &anyhow::Error) {
    let env = Settings::from_env_only();
    let Ok(client) = http_client(env.request_timeout_secs) else {
        return;
    };
    let messenger = TelegramMessenger::new(
        env.messaging_token.clone(),
        env.messaging_api_base.clone(),
        client,
    );
    report_failure(&messenger, env.operator_chat_id, err).await;
}
