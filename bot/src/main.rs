use std::{str::FromStr, sync::Arc, time::Duration};

use advent_stars_bot::{
    api::prometheus::PrometheusClient,
    jobs::{self, Context, Job, Schedule},
    store::DB,
};
use rocket::{http::Status, routes, serde::json::Json};
use serde::Deserialize;
use shared::{advent::LeaderboardClient, slack, ReportSnapshot};
use strum::VariantNames;
use tokio::signal;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

#[derive(Deserialize)]
struct Env {
    advent_cookie: String,
    advent_year: u32,
    advent_team: String,
    slack_webhook_url: String,
    database_url: String,
    alert_webhook_url: Option<String>,
    poll_cron: Option<String>,
    deletions_cron: Option<String>,
    build_report_cron: Option<String>,
    send_report_cron: Option<String>,
    http_timeout_secs: Option<u64>,
}

#[rocket::get("/metrics")]
pub async fn metrics(
    state: &rocket::State<Context>,
) -> Option<(
    rocket::http::ContentType,
    rocket::response::content::RawHtml<String>,
)> {
    let metrics = state.prometheus.encode().ok()?;
    Some((
        rocket::http::ContentType::new(
            "application/openmetrics-text",
            " version=1.0.0; charset=utf-8",
        ),
        rocket::response::content::RawHtml(metrics),
    ))
}

#[rocket::get("/report/latest")]
pub async fn latest_report(
    state: &rocket::State<Context>,
) -> Result<Option<Json<ReportSnapshot>>, Status> {
    let reports = state.reports.latest_reports(1).await.map_err(|e| {
        error!("Failed to load the latest report: {e:#}");
        Status::InternalServerError
    })?;
    Ok(reports.into_iter().next().map(Json))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let env = envy::from_env::<Env>()?;

    let alerts = env
        .alert_webhook_url
        .clone()
        .map(slack::SlackAlertLayer::new);
    let subscriber = tracing_subscriber::registry()
        .with(alerts)
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;

    let one_shot = std::env::args()
        .nth(1)
        .map(|name| {
            Job::from_str(&name).map_err(|_| {
                anyhow::anyhow!(
                    "Unknown job {name:?}, expected one of {}",
                    Job::VARIANTS.join(", ")
                )
            })
        })
        .transpose()?;

    let timeout = Duration::from_secs(env.http_timeout_secs.unwrap_or(30));
    let leaderboard = LeaderboardClient::new(
        env.advent_year,
        &env.advent_team,
        &env.advent_cookie,
        timeout,
    )?;
    let db = Arc::new(DB::connect(&env.database_url).await?);
    let context = Context {
        leaderboard: Arc::new(leaderboard),
        members: db.clone(),
        reports: db,
        slack: Arc::new(slack::SlackWebhook::new(env.slack_webhook_url)),
        prometheus: Arc::new(PrometheusClient::default()),
    };

    if let Some(job) = one_shot {
        tracing::info!("Running {job} once");
        return job.run(&context).await;
    }

    let defaults = Schedule::default();
    let schedule = Schedule {
        poll: env.poll_cron.unwrap_or(defaults.poll),
        deletions: env.deletions_cron.unwrap_or(defaults.deletions),
        build_report: env.build_report_cron.unwrap_or(defaults.build_report),
        send_report: env.send_report_cron.unwrap_or(defaults.send_report),
    };
    let mut scheduler = jobs::scheduler(context.clone(), &schedule).await?;
    scheduler.start().await?;
    tracing::warn!("Starting bot...");

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::warn!("Received SIGINT. Exiting.");
        }
        _ = rocket::build()
            .mount("/", routes![metrics, latest_report])
            .manage(context)
            .launch() => {

            }
    }

    scheduler.shutdown().await?;
    tracing::warn!("Exiting bot...");

    Ok(())
}
