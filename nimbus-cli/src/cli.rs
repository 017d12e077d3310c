use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use inquire::{Confirm, Password, PasswordDisplayMode};
use nimbus_core::{
    Config, FailureReason, FavoriteChange, FetchOrchestrator, LookupRequest, ProviderId,
    RunOutcome, RunResult, SnapshotCache,
};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "nimbus", version, about = "Current weather and short forecast")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,
    },

    /// Show weather for a place, or for the current location if none is given.
    Show {
        /// Place name, e.g. "Springfield" or "Paris,FR".
        place: Option<String>,

        /// Number of forecast entries to print (defaults to the configured limit).
        #[arg(long)]
        forecast: Option<usize>,
    },

    /// Look up the last shown place again.
    Retry,

    /// Manage favorite places.
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum FavoritesAction {
    /// List saved places in the order they were added.
    List,
    /// Save the last shown place.
    Add,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::load()?;

        match self.command {
            Command::Configure { provider } => configure(config, &provider),
            Command::Show { place, forecast } => {
                let limit = forecast.unwrap_or(config.display.forecast_limit);
                let orchestrator = FetchOrchestrator::from_config(&config)?;
                let request = match place {
                    Some(name) => LookupRequest::Place(name),
                    None => device_request(&config),
                };
                show(orchestrator.run(request).await, limit)
            }
            Command::Retry => {
                let orchestrator = FetchOrchestrator::from_config(&config)?;
                let request = orchestrator
                    .current_place()
                    .map(LookupRequest::Place)
                    .unwrap_or_else(|| device_request(&config));
                show(orchestrator.run(request).await, config.display.forecast_limit)
            }
            Command::Favorites { action } => {
                favorites(&SnapshotCache::from_config(&config)?, action)
            }
        }
    }
}

fn device_request(config: &Config) -> LookupRequest {
    LookupRequest::Device {
        fallback_place: config.location.fallback_place().map(str::to_owned),
    }
}

fn configure(mut config: Config, provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;

    let api_key = Password::new(&format!("API key for {id}:"))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("No API key entered")?;
    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        return Err(anyhow!("The API key must not be empty."));
    }

    config.upsert_provider_api_key(id, api_key);

    if config.default_provider_id().ok() != Some(id) {
        let make_default = Confirm::new(&format!("Use {id} as the default provider?"))
            .with_default(true)
            .prompt()
            .context("No answer given")?;
        if make_default {
            config.set_default_provider(id);
        }
    }

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn show(result: RunResult, forecast_limit: usize) -> anyhow::Result<()> {
    let outcome = match result {
        RunResult::Committed(outcome) => outcome,
        // Only one run per invocation, so nothing can supersede it.
        RunResult::Superseded { sequence } => {
            return Err(anyhow!("Lookup {sequence} was interrupted; try again."));
        }
    };

    match &outcome {
        RunOutcome::Failed(no_data) => Err(anyhow!("{no_data}\nHint: {}", hint(no_data.reason))),
        _ => {
            print!("{}", render::outcome(&outcome, forecast_limit));
            if let Some(FailureReason::NotFound) = outcome.reason() {
                println!("Place not found; try another name.");
            }
            Ok(())
        }
    }
}

fn hint(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::PermissionDenied => {
            "location access is off; run `nimbus show <place>` or set [location] fallback_place."
        }
        FailureReason::NotFound => "no place matched; check the spelling or add a country code.",
        FailureReason::Network => "the weather service could not be reached; run `nimbus retry`.",
    }
}

/// Favorites only touch the local cache, so no provider has to be configured.
fn favorites(cache: &SnapshotCache, action: FavoritesAction) -> anyhow::Result<()> {
    match action {
        FavoritesAction::List => {
            let favorites = cache.load_favorites();
            if favorites.is_empty() {
                println!("No favorites yet. Show a place, then run `nimbus favorites add`.");
            }
            for place in favorites.iter() {
                println!("{place}");
            }
        }
        FavoritesAction::Add => match add_last_shown(cache) {
            Some(FavoriteChange::Added(place)) => println!("Added {place} to favorites."),
            Some(FavoriteChange::AlreadyPresent(place)) => {
                println!("{place} is already a favorite.")
            }
            None => {
                return Err(anyhow!(
                    "No place to add yet.\nHint: run `nimbus show <place>` first."
                ));
            }
        },
    }
    Ok(())
}

/// Add the place of the cached snapshot; `None` when nothing was shown yet.
fn add_last_shown(cache: &SnapshotCache) -> Option<FavoriteChange> {
    let place = cache.load()?.place_name().to_string();
    let mut favorites = cache.load_favorites();
    if favorites.add(place.clone()) {
        cache.save_favorites(&favorites);
        Some(FavoriteChange::Added(place))
    } else {
        Some(FavoriteChange::AlreadyPresent(place))
    }
}
