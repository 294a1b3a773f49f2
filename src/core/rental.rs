//! Rental configuration chosen by the user before paying.

use crate::core::payment::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Catalog identifier of a rentable item.
pub type ItemId = u64;

/// Rental lengths offered to the user, in weeks.
pub const ALLOWED_DURATIONS: [u32; 6] = [1, 2, 4, 8, 12, 24];

/// A rental length in weeks, restricted to [`ALLOWED_DURATIONS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RentalDuration(u32);

impl RentalDuration {
    pub fn weeks(&self) -> u32 {
        self.0
    }

    pub fn to_duration(&self) -> chrono::Duration {
        chrono::Duration::weeks(i64::from(self.0))
    }
}

impl Default for RentalDuration {
    fn default() -> Self {
        RentalDuration(1)
    }
}

impl TryFrom<u32> for RentalDuration {
    type Error = ValidationError;

    fn try_from(weeks: u32) -> Result<Self, Self::Error> {
        if ALLOWED_DURATIONS.contains(&weeks) {
            Ok(RentalDuration(weeks))
        } else {
            Err(ValidationError::InvalidDuration(weeks))
        }
    }
}

impl From<RentalDuration> for u32 {
    fn from(duration: RentalDuration) -> Self {
        duration.0
    }
}

impl Display for RentalDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 == 1 {
            write!(f, "1 week")
        } else {
            write!(f, "{} weeks", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    #[default]
    Pickup,
    Delivery,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::Pickup => "pickup",
            DeliveryMethod::Delivery => "delivery",
        }
    }
}

impl Display for DeliveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pickup" => Ok(DeliveryMethod::Pickup),
            "delivery" => Ok(DeliveryMethod::Delivery),
            _ => Err(ValidationError::UnknownDeliveryMethod(s.to_string())),
        }
    }
}

/// What the user is about to rent. Lives only until the payment session
/// for it completes or is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentalConfiguration {
    pub item_id: ItemId,
    pub duration: RentalDuration,
    pub delivery: DeliveryMethod,
}

impl RentalConfiguration {
    /// Validates `weeks` against the allowed set before building the
    /// configuration.
    pub fn new(
        item_id: ItemId,
        weeks: u32,
        delivery: DeliveryMethod,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            item_id,
            duration: RentalDuration::try_from(weeks)?,
            delivery,
        })
    }
}
