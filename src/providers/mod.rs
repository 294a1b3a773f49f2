pub mod book_api;
pub mod exchange_rate_api;
pub mod payment_gateway;
pub mod util;
