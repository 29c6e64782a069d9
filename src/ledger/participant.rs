use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::address::Address;

/// Registry entry for a registered market participant
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    /// Caller-supplied external identifier
    pub external_id: String,

    /// Display name
    pub name: String,

    /// Derived address token
    pub address: Address,

    /// Energy source tag
    pub energy_type: String,

    /// When the participant registered
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub registered_at: DateTime<Utc>,

    /// Cumulative energy sold, in kWh
    pub energy_produced: f64,

    /// Cumulative energy bought, in kWh
    pub energy_consumed: f64,
}

impl Profile {
    pub fn new(
        external_id: String,
        name: String,
        energy_type: String,
        address: Address,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Profile {
            external_id,
            name,
            address,
            energy_type,
            registered_at,
            energy_produced: 0.0,
            energy_consumed: 0.0,
        }
    }
}
