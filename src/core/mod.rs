//! Core rental abstractions and business rules

pub mod cache;
pub mod catalog;
pub mod config;
pub mod currency;
pub mod entitlement;
pub mod favorites;
pub mod gateway;
pub mod log;
pub mod payment;
pub mod pricing;
pub mod rental;

// Re-export main types for cleaner imports
pub use catalog::{Book, BookCatalog};
pub use currency::{ExchangeRate, ExchangeRateProvider, RateQuoteSource};
pub use entitlement::{Entitlement, EntitlementStore, RentalStatus};
pub use favorites::FavoritesStore;
pub use gateway::{GatewayResponse, PaymentGateway, PaymentRequest};
pub use payment::{FlowError, PaymentFlowController, PaymentState, ValidationError};
pub use pricing::{CostBreakdown, ItemPrice, compute_cost};
pub use rental::{DeliveryMethod, ItemId, RentalConfiguration, RentalDuration};
