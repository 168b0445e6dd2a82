mod capacity;
mod closures;
mod consumption;
mod error;
mod loader;
mod payload;
mod queries;
mod status;
mod tables;

pub use capacity::{resolve_ceiling, room_capacity, CapacityTarget};
pub use closures::{effective_windows, ClosureCheck, ClosureEvaluator, Frequency, Recurrence};
pub use consumption::{consumption, OccupancyIndex, ReservationFilter, Usage};
pub use error::EngineError;
pub use loader::{DataLoader, Snapshot};
pub use payload::{build_response, build_slot, DayAvailability, SlotPayload, SlotsMeta, SlotsResponse};
pub use queries::ALL_DAY_MEAL;
pub use status::{determine_status, CapacitySnapshot, Determination};
pub use tables::{suggest_tables, SuggestedTable, TableSuggestion};

use std::sync::Arc;

use serde::Deserialize;

use crate::config::{AvailabilityConfig, Settings};
use crate::schedule::{parse_schedule, WeeklySchedule};
use crate::store::AvailabilityStore;

/// Input of [`Availability::find_slots`], as received from the widget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlotCriteria {
    /// `YYYY-MM-DD`, required.
    pub date: Option<String>,
    /// Positive, required.
    pub party: Option<i64>,
    #[serde(default)]
    pub meal: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Attach a table suggestion to every bookable slot.
    #[serde(default)]
    pub assign_tables: bool,
}

impl SlotCriteria {
    pub fn new(date: impl Into<String>, party: i64) -> Self {
        Self {
            date: Some(date.into()),
            party: Some(party),
            ..Default::default()
        }
    }

    pub fn meal(mut self, meal: impl Into<String>) -> Self {
        self.meal = Some(meal.into());
        self
    }

    pub fn room(mut self, room: impl ToString) -> Self {
        self.room = Some(room.to_string());
        self
    }

    pub fn table(mut self, table: impl ToString) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn assign_tables(mut self) -> Self {
        self.assign_tables = true;
        self
    }
}

/// Read-side availability engine. Stateless between calls; every query loads its own
/// snapshot, so concurrent calls never share mutable state.
pub struct Availability {
    store: Arc<dyn AvailabilityStore>,
    config: AvailabilityConfig,
    schedule: WeeklySchedule,
}

impl Availability {
    pub fn new(store: Arc<dyn AvailabilityStore>, config: AvailabilityConfig) -> Self {
        let schedule = parse_schedule(&config.service_hours);
        Self {
            store,
            config,
            schedule,
        }
    }

    pub fn from_settings(
        store: Arc<dyn AvailabilityStore>,
        settings: &impl Settings,
    ) -> Result<Self, EngineError> {
        let config = AvailabilityConfig::from_settings(settings)?;
        Ok(Self::new(store, config))
    }

    pub fn config(&self) -> &AvailabilityConfig {
        &self.config
    }

    pub fn schedule(&self) -> &WeeklySchedule {
        &self.schedule
    }
}
