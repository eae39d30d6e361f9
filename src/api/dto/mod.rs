//! Data Transfer Objects for REST request/response serialization.
//!
//! Domain types never cross the HTTP boundary directly, apart from
//! [`crate::domain::EventDraft`], which already is the validated input
//! shape of an event.

pub mod auth_dto;
pub mod card_dto;
pub mod common_dto;
pub mod event_dto;
pub mod import_dto;

pub use auth_dto::*;
pub use card_dto::*;
pub use common_dto::*;
pub use event_dto::*;
pub use import_dto::*;
