//! Domain layer for event-push.
//!
//! Value objects shared by the client-side subscription core and the
//! server-side binder/fan-out service.

pub mod value_objects;

pub use value_objects::*;
