//! # occasion-keeper
//!
//! REST service that remembers birthdays, anniversaries and other yearly
//! occasions, emails reminders ahead of them, and lets users build small
//! greeting cards from uploaded photos and audio to share by link.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)            External scheduler / `jobs` CLI
//!     │                              │
//!     ├── REST Handlers (api/)       │
//!     │                              │
//!     ├── Services (service/) ◄──────┘
//!     │     auth · events · cards · imports · analytics · jobs
//!     │
//!     ├── Domain rules (domain/)
//!     │
//!     ├── Store (persistence/)      PostgreSQL or in-memory
//!     ├── ObjectStorage (storage/)  Supabase Storage or in-memory
//!     └── Mailer (mail/)            MailerSend or log-only
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod mail;
pub mod persistence;
pub mod service;
pub mod storage;
