//! Calendar event operations used by the rest of the service.

mod service;

pub use service::{EventService, EventServiceError};
