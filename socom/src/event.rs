// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Event identities, subscription modes, and server-visible event state.

/// Index of an event within a connector's configured `num_events`.
pub type EventId = u16;

/// The strength of an event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventMode {
    /// Deliver future updates only.
    Update,
    /// Deliver future updates, and request an immediate snapshot via
    /// `on_event_update_request`.
    UpdateAndInitialValue,
}

impl EventMode {
    /// Combines two subscriber modes. If either is
    /// [`EventMode::UpdateAndInitialValue`] the dominant mode is
    /// `update_and_initial_value`: if *any* current subscriber requests
    /// `update_and_initial_value`, the server-visible mode is dominant.
    pub fn dominant(self, other: EventMode) -> EventMode {
        std::cmp::max(self, other)
    }
}

/// Server-visible subscription state for one event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// No client is currently subscribed.
    Unsubscribed,
    /// At least one client is currently subscribed.
    Subscribed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_and_initial_value_dominates_update() {
        assert_eq!(EventMode::Update.dominant(EventMode::Update), EventMode::Update);
        assert_eq!(
            EventMode::Update.dominant(EventMode::UpdateAndInitialValue),
            EventMode::UpdateAndInitialValue
        );
        assert_eq!(
            EventMode::UpdateAndInitialValue.dominant(EventMode::Update),
            EventMode::UpdateAndInitialValue
        );
    }
}
