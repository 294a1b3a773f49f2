pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::cli::rent::RentOptions;
use crate::core::config::AppConfig;
use crate::core::{
    DeliveryMethod, EntitlementStore, ExchangeRateProvider, FavoritesStore, ItemId,
    RentalConfiguration, RentalStatus,
};
use crate::providers::book_api::BookApi;
use crate::providers::exchange_rate_api::ExchangeRateApi;
use crate::providers::payment_gateway::PaymentGatewayApi;
use crate::store::KeyValueStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Quote {
        item_id: ItemId,
        weeks: u32,
        delivery: DeliveryMethod,
    },
    Rent(RentOptions),
    Rentals {
        status: Option<RentalStatus>,
    },
    Favorite {
        item_id: ItemId,
    },
    Favorites,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("BookRent starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let catalog = BookApi::new(&config.api.base_url, config.api.timeout())?;
    let rates = ExchangeRateProvider::new(Arc::new(ExchangeRateApi::new(
        &config.exchange_rate.base_url,
        &config.exchange_rate.currency,
        config.exchange_rate.timeout(),
    )?));
    let currency = config.exchange_rate.currency.as_str();

    match command {
        AppCommand::Quote {
            item_id,
            weeks,
            delivery,
        } => {
            let rental = RentalConfiguration::new(item_id, weeks, delivery)?;
            cli::quote::run(&catalog, &rates, rental, currency).await
        }
        AppCommand::Rent(options) => {
            let store = KeyValueStore::open(&config.data_path()?)?;
            let entitlements = Arc::new(EntitlementStore::open(&store)?);
            let gateway = Arc::new(PaymentGatewayApi::new(
                &config.api.base_url,
                config.api.timeout(),
            )?);
            cli::rent::run(&catalog, &rates, gateway, entitlements, options, currency).await
        }
        AppCommand::Rentals { status } => {
            let store = KeyValueStore::open(&config.data_path()?)?;
            let entitlements = EntitlementStore::open(&store)?;
            cli::rentals::run(&entitlements, &catalog, status).await
        }
        AppCommand::Favorite { item_id } => {
            let store = KeyValueStore::open(&config.data_path()?)?;
            cli::favorites::toggle(&FavoritesStore::open(&store)?, item_id).await
        }
        AppCommand::Favorites => {
            let store = KeyValueStore::open(&config.data_path()?)?;
            cli::favorites::list(&FavoritesStore::open(&store)?, &catalog).await
        }
    }
}
