//! CLI module for the fishersafe command-line client.
//!
//! Provides subcommands against the safety backend:
//! - `login` / `logout` / `status` - Manage the stored session
//! - `sos list` / `sos send` - Read and raise SOS reports
//! - `machines latest` / `machines logs` - Sensor machine data
//! - `weather` - Current conditions at a coordinate
//! - `watch` - Run the session gate and print every transition

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::api::{ApiError, MachineLog, MachineReading, SosReport, SosSubmission, WeatherReport};
use crate::session::{redirect_for, GateState, RouteGroup};
use crate::AppContext;

/// How long `logout` waits for the server-side invalidation before exiting
const LOGOUT_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "fishersafe")]
#[command(author, version, about = "Fisherman safety client: SOS, sensors and weather", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "fishersafe.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Backend URL (overrides the configuration file)
    #[arg(long, env = "FISHERSAFE_API_URL")]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,
        /// Account password
        #[arg(short, long, env = "FISHERSAFE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and clear the stored session
    Logout,

    /// Show the stored session
    Status,

    /// SOS commands
    #[command(subcommand)]
    Sos(SosCommands),

    /// Sensor machine commands
    #[command(subcommand)]
    Machines(MachinesCommands),

    /// Show current weather at a coordinate
    Weather {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Weather API key (falls back to the configuration file)
        #[arg(long, env = "WEATHER_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Watch the session gate until interrupted
    Watch,
}

/// SOS subcommands
#[derive(Subcommand, Debug)]
pub enum SosCommands {
    /// List recent SOS reports
    List {
        /// Group id (defaults to the signed-in user's group)
        #[arg(long)]
        group: Option<u64>,
    },
    /// Send an SOS with a position
    Send {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Group staff fisherman id (defaults to the signed-in user's id)
        #[arg(long)]
        fisherman_id: Option<u64>,
        /// User id placed in the request path (defaults to the signed-in user's id)
        #[arg(long)]
        user_id: Option<String>,
    },
}

/// Machines subcommands
#[derive(Subcommand, Debug)]
pub enum MachinesCommands {
    /// Latest machine positions
    Latest,
    /// Full sensor log
    Logs,
}

/// Run a CLI command
pub async fn run_command(cli: &Cli, ctx: &AppContext) -> Result<()> {
    match &cli.command {
        Commands::Login { email, password } => cmd_login(ctx, email, password).await,
        Commands::Logout => cmd_logout(ctx).await,
        Commands::Status => cmd_status(ctx).await,
        Commands::Sos(SosCommands::List { group }) => cmd_sos_list(ctx, *group).await,
        Commands::Sos(SosCommands::Send {
            lat,
            lng,
            fisherman_id,
            user_id,
        }) => cmd_sos_send(ctx, *lat, *lng, *fisherman_id, user_id.clone()).await,
        Commands::Machines(MachinesCommands::Latest) => cmd_machines_latest(ctx).await,
        Commands::Machines(MachinesCommands::Logs) => cmd_machines_logs(ctx).await,
        Commands::Weather { lat, lon, api_key } => {
            cmd_weather(ctx, *lat, *lon, api_key.as_deref()).await
        }
        Commands::Watch => cmd_watch(ctx).await,
    }
}

/// Turn an API error into a CLI error carrying its message.
fn fail(err: ApiError) -> anyhow::Error {
    match err {
        ApiError::Unauthenticated => {
            anyhow::anyhow!("Not signed in. Run `fishersafe login` first.")
        }
        other => anyhow::anyhow!(other.message()),
    }
}

async fn cmd_login(ctx: &AppContext, email: &str, password: &str) -> Result<()> {
    let user = ctx.session.login(email, password).await.map_err(fail)?;
    println!("Signed in as {} <{}>", user.name, user.email);
    println!("Group:      {} (#{})", user.group_name, user.group_id);
    Ok(())
}

async fn cmd_logout(ctx: &AppContext) -> Result<()> {
    ctx.session.logout().await.map_err(fail)?;
    if tokio::time::timeout(LOGOUT_SETTLE_TIMEOUT, ctx.session.settle())
        .await
        .is_err()
    {
        tracing::warn!("Server-side logout still pending at exit");
    }
    println!("Signed out.");
    Ok(())
}

async fn cmd_status(ctx: &AppContext) -> Result<()> {
    println!();
    println!("=== Session ===");
    println!();
    println!("Backend:    {}", ctx.config.server.base_url);
    println!("Storage:    {}", ctx.config.storage.path.display());

    match ctx.session.current_user().await {
        Some(user) => {
            println!("Status:     [OK] Signed in");
            println!("User:       {} <{}> (#{})", user.name, user.email, user.id);
            println!("Role:       {}", user.role);
            println!("Group:      {} (#{})", user.group_name, user.group_id);
        }
        None => println!("Status:     [!!] Signed out"),
    }
    println!();
    Ok(())
}

async fn cmd_sos_list(ctx: &AppContext, group: Option<u64>) -> Result<()> {
    let group_id = match group {
        Some(id) => id,
        None => ctx
            .session
            .current_user()
            .await
            .map(|u| u.group_id)
            .ok_or_else(|| fail(ApiError::Unauthenticated))?,
    };

    let reports = ctx
        .client
        .fetch_sos_reports(group_id)
        .await
        .map_err(fail)?;
    print_sos_reports(&reports);
    Ok(())
}

async fn cmd_sos_send(
    ctx: &AppContext,
    lat: f64,
    lng: f64,
    fisherman_id: Option<u64>,
    user_id: Option<String>,
) -> Result<()> {
    validate_coordinates(lat, lng)?;

    let user = ctx.session.current_user().await;
    let user_id = user_id
        .or_else(|| user.as_ref().map(|u| u.id.to_string()))
        .ok_or_else(|| fail(ApiError::Unauthenticated))?;
    let fisherman_id = fisherman_id
        .or_else(|| user.as_ref().map(|u| u.id))
        .context("No fisherman id given and no signed-in user to default from")?;

    let submission = SosSubmission {
        lat,
        lng,
        group_staff_fishermans_id: fisherman_id,
    };
    let receipt = ctx
        .client
        .submit_sos(&submission, &user_id)
        .await
        .map_err(fail)?;

    println!("SOS sent from {:.5}, {:.5}", lat, lng);
    println!("Server:     {}", receipt.message);
    Ok(())
}

async fn cmd_machines_latest(ctx: &AppContext) -> Result<()> {
    let readings = ctx.client.fetch_machine_readings().await.map_err(fail)?;
    print_machine_readings(&readings);
    Ok(())
}

async fn cmd_machines_logs(ctx: &AppContext) -> Result<()> {
    let logs = ctx.client.fetch_machine_logs().await.map_err(fail)?;
    print_machine_logs(&logs);
    Ok(())
}

async fn cmd_weather(ctx: &AppContext, lat: f64, lon: f64, api_key: Option<&str>) -> Result<()> {
    validate_coordinates(lat, lon)?;
    let api_key = api_key
        .or(ctx.config.weather.api_key.as_deref())
        .context("No weather API key. Use --api-key or set WEATHER_API_KEY.")?;

    let report = ctx
        .weather
        .fetch_weather(lat, lon, api_key)
        .await
        .map_err(fail)?;
    print_weather(&report);
    Ok(())
}

async fn cmd_watch(ctx: &AppContext) -> Result<()> {
    let gate = ctx.spawn_gate();
    let mut rx = gate.subscribe();
    let mut last = GateState::Unverified;
    let mut route = RouteGroup::Login;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!("Watching session (Ctrl+C to stop)...");
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = *rx.borrow_and_update();
                if snapshot.state != last {
                    println!("{:?} -> {:?}", last, snapshot.state);
                    last = snapshot.state;
                }
                if let Some(next) = redirect_for(&snapshot, route) {
                    println!("  route: {:?} -> {:?}", route, next);
                    route = next;
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    gate.shutdown().await;
    Ok(())
}

fn validate_coordinates(lat: f64, lng: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        anyhow::bail!("Coordinates out of range: {}, {}", lat, lng);
    }
    Ok(())
}

fn print_sos_reports(reports: &[SosReport]) {
    if reports.is_empty() {
        println!("No SOS reports.");
        return;
    }

    println!();
    println!("{:<10}  {:<24}  {:>11}  {:>11}", "ID", "NAME", "LAT", "LNG");
    println!("{}", "-".repeat(62));
    for report in reports {
        println!(
            "{:<10}  {:<24}  {:>11.5}  {:>11.5}",
            report.group_staff_fishermans_id,
            truncate(&report.staff_nm, 24),
            report.lat,
            report.lng
        );
    }
    println!();
}

fn print_machine_readings(readings: &[MachineReading]) {
    if readings.is_empty() {
        println!("No machine readings.");
        return;
    }

    println!();
    println!("{:<10}  {:<10}  {:>11}  {:>11}", "MACHINE", "HOST", "LAT", "LNG");
    println!("{}", "-".repeat(48));
    for reading in readings {
        println!(
            "{:<10}  {:<10}  {:>11.5}  {:>11.5}",
            reading.machine_name, reading.host_id, reading.lat, reading.lng
        );
    }
    println!();
}

fn print_machine_logs(logs: &[MachineLog]) {
    if logs.is_empty() {
        println!("No machine logs.");
        return;
    }

    println!();
    println!(
        "{:<8}  {:<6}  {:>7}  {:>8}  {:>9}  {:<20}",
        "ID", "HOST", "TEMP", "HUMIDITY", "PRESSURE", "RECORDED"
    );
    println!("{}", "-".repeat(68));
    for log in logs {
        let recorded = log
            .created_at_utc()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| log.created_at.clone());
        println!(
            "{:<8}  {:<6}  {:>7.1}  {:>8.1}  {:>9.1}  {:<20}",
            log.id, log.host_id, log.temp, log.humidity, log.pressure, recorded
        );
    }
    println!();
}

fn print_weather(report: &WeatherReport) {
    println!();
    println!("=== Weather: {} ===", report.name);
    println!();
    println!("Conditions: {}", report.summary().unwrap_or("-"));
    println!(
        "Temp:       {:.1} (feels {:.1}, {:.1}..{:.1})",
        report.main.temp, report.main.feels_like, report.main.temp_min, report.main.temp_max
    );
    println!("Humidity:   {:.0}%", report.main.humidity);
    println!("Pressure:   {:.0} hPa", report.main.pressure);
    match report.wind.gust {
        Some(gust) => println!("Wind:       {:.1} m/s (gust {:.1})", report.wind.speed, gust),
        None => println!("Wind:       {:.1} m/s", report.wind.speed),
    }
    println!("Clouds:     {}%", report.clouds.all);
    println!();
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
