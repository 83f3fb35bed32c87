//! Conference follow-up campaign core: a tick-driven scheduler that walks
//! clients through multi-stage email sequences, plus a per-account IMAP
//! monitor keeping local mail state current in near real time. Runs
//! embedded inside a larger service; the CRUD/API surface lives elsewhere.

pub mod config;
pub mod db;
pub mod error;
pub mod followup;
pub mod imap;
pub mod models;
pub mod render;
pub mod services;
pub mod smtp;
