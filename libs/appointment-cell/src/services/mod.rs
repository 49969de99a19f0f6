pub mod booking;
pub mod conflict;
pub mod lifecycle;

#[cfg(test)]
pub mod test_support;

pub use booking::BookingService;
pub use conflict::{SchedulingGuard, SchedulingPolicy};
pub use lifecycle::BookingLifecycle;
