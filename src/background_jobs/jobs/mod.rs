//! Specific background job implementations.

pub mod event_archive;

pub use event_archive::EventArchiveJob;
