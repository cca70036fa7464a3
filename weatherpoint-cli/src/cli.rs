use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use inquire::{CustomType, Password, PasswordDisplayMode};
use weatherpoint_core::{
    Config, Coordinates, Credential, LocationConfig, ProviderId, RefreshingObservationCache,
    Snapshot,
    provider::{default_provider_from_config, provider_from_config},
};

use crate::server::{self, AppState};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weatherpoint", version, about = "Current weather for a fixed location")]
pub struct Cli {
    /// Log at debug level (RUST_LOG still takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials and location for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "fake".
        provider: String,
    },

    /// Serve current weather over HTTP at /weather/current.
    Serve {
        #[command(flatten)]
        source: SourceArgs,

        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:5000")]
        listen: SocketAddr,

        /// Fetch once at startup and exit if the provider cannot be reached.
        #[arg(long)]
        probe: bool,
    },

    /// Fetch current weather once and print it.
    Show {
        #[command(flatten)]
        source: SourceArgs,
    },
}

/// Where the data comes from. Flags override the config file.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Provider short name; defaults to the configured one.
    #[arg(short, long)]
    pub service: Option<String>,

    /// Latitude of the location, e.g. 55.03.
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude of the location, e.g. 82.92.
    #[arg(long, allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// Min seconds between requests to the provider.
    #[arg(short = 't', long)]
    pub interval: Option<u64>,
}

impl SourceArgs {
    fn apply(&self, config: &mut Config) {
        if self.lat.is_some() || self.lon.is_some() {
            let current = config.location.unwrap_or_default();
            config.location = Some(LocationConfig {
                lat: self.lat.unwrap_or(current.lat),
                lon: self.lon.unwrap_or(current.lon),
            });
        }
        if let Some(secs) = self.interval {
            config.refresh_interval_secs = Some(secs);
        }
    }

    /// Validates everything up front; no network traffic happens here.
    pub fn build_cache(&self, mut config: Config) -> anyhow::Result<RefreshingObservationCache> {
        self.apply(&mut config);
        let provider = match self.service.as_deref() {
            Some(name) => provider_from_config(ProviderId::try_from(name)?, &config)?,
            None => default_provider_from_config(&config)?,
        };

        Ok(RefreshingObservationCache::new(provider, config.refresh_interval()))
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Serve { source, listen, probe } => {
                let config = Config::load()?.with_env_overrides();
                let cache = Arc::new(source.build_cache(config)?);

                if probe {
                    let snapshot = cache.current_snapshot().await;
                    if let Some(err) = snapshot.status.error() {
                        anyhow::bail!("Startup probe of '{}' failed: {err}", cache.provider_id());
                    }
                }

                let listener = tokio::net::TcpListener::bind(listen)
                    .await
                    .with_context(|| format!("Failed to bind {listen}"))?;
                tracing::info!(
                    provider = %cache.provider_id(),
                    refresh_interval_secs = cache.refresh_interval().as_secs_f64(),
                    "Server starting on http://{listen}"
                );

                server::serve(listener, AppState { cache }).await
            }
            Command::Show { source } => {
                let config = Config::load()?.with_env_overrides();
                let cache = source.build_cache(config)?;
                let snapshot = cache.current_snapshot().await;

                print!("{}", render(&snapshot));
                match snapshot.status.error() {
                    Some(err) => Err(anyhow::anyhow!("Failed to fetch current weather: {err}")),
                    None => Ok(()),
                }
            }
        }
    }
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    if id.requires_api_key() {
        let key = Password::new(&format!("API key for {id}:"))
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()?;
        let credential = Credential::new(id, Some(key.as_str()))?;
        config.upsert_provider_api_key(id, credential.expose().to_string());
    } else if config.default_provider.is_none() {
        config.set_default_provider(id);
    }

    let current = config.location.unwrap_or_default();
    let lat = CustomType::<f64>::new("Latitude:")
        .with_default(current.lat)
        .with_error_message("Please type a number")
        .prompt()?;
    let lon = CustomType::<f64>::new("Longitude:")
        .with_default(current.lon)
        .with_error_message("Please type a number")
        .prompt()?;
    let coordinates = Coordinates::new(lat, lon)?;
    config.location = Some(LocationConfig { lat: coordinates.lat(), lon: coordinates.lon() });

    let interval = CustomType::<u64>::new("Min seconds between provider requests:")
        .with_default(config.refresh_interval().as_secs())
        .with_error_message("Please type a whole number of seconds")
        .prompt()?;
    config.refresh_interval_secs = Some(interval);

    config.save()?;
    println!("Saved configuration for '{id}' to {}", Config::config_file_path()?.display());

    Ok(())
}

fn render(snapshot: &Snapshot) -> String {
    fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
        value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
    }

    let obs = &snapshot.observation;
    let place = obs.title.as_deref().unwrap_or("Unknown place");
    let location = obs
        .location
        .map(|l| format!(" ({:.2}, {:.2})", l.lat, l.lon))
        .unwrap_or_default();
    let observed = obs.observed_at.map(|dt| dt.format("%Y-%m-%d %H:%M:%S %:z"));
    let fetched = snapshot
        .refreshed_at
        .map(|dt| dt.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"));

    format!(
        "{place}{location}\n\
         Observed:    {}\n\
         Temperature: {} °C\n\
         Humidity:    {} %\n\
         Pressure:    {} atm\n\
         Fetched:     {}\n\
         Status:      {}\n",
        or_dash(observed),
        or_dash(obs.temperature_c.map(|t| format!("{t:.1}"))),
        or_dash(obs.humidity_percent),
        or_dash(obs.pressure_atm),
        or_dash(fetched),
        snapshot.status,
    )
}
