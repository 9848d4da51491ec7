use crate::domain::models::event::BusEvent;

/// Port for emitting events onto the cross-domain bus.
///
/// Publishing is fire-and-forget; implementations must not block on
/// subscribers.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: BusEvent);
}
