pub mod favorites;
pub mod quote;
pub mod rent;
pub mod rentals;
pub mod setup;
pub mod ui;
