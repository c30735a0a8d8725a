//! # Kallkeyy order server
//! This crate hosts the HTTP front end of the order engine. It is responsible for:
//! * Authenticating shoppers and admins with JWT bearer tokens and enforcing role checks.
//! * Exposing checkout, order, return and refund endpoints over the engine APIs.
//! * Receiving signed webhooks from the payment gateway and the shipping partner.
//! * Running the reconciliation sweep for pending orders in the background.
//! * Talking to Razorpay through [`integrations::razorpay::RazorpayGateway`].
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! See [`routes`] for the full list. Public routes are `/health`, `/cart/validate` and the two webhooks. Everything
//! else needs a bearer token, and `/admin/...` routes need the `admin` role.
pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod notifications;
pub mod reconciliation_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
