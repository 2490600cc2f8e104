use crate::Map;

pub const CREATE_TRIGGER: &str = "data.create";
pub const CHANGE_TRIGGER: &str = "data.change";
pub const REMOVE_TRIGGER: &str = "data.remove";

/// Reserved input key holding the increments of an update.
pub const INC: &str = "$inc";

/// Receiver of the domain events raised by mutations.
///
/// Delivery is fire and forget, the session does not wait on it.
pub trait EventBus: Send + Sync {
    fn trigger(&self, name: &str, payload: Option<Map>);
}

impl<F> EventBus for F
where
    F: Fn(&str, Option<Map>) + Send + Sync,
{
    fn trigger(&self, name: &str, payload: Option<Map>) {
        self(name, payload)
    }
}

/// Bus dropping every event.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoEvents;

impl EventBus for NoEvents {
    fn trigger(&self, name: &str, _payload: Option<Map>) {
        log::trace!("Dropping event `{}`", name);
    }
}

/// Event recorded while a manual transaction is open.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub name: String,
    pub payload: Option<Map>,
}

impl Trigger {
    pub fn new(name: impl Into<String>, payload: Option<Map>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}
