mod admin;
mod auth;
mod checkout;
mod helpers;
mod mocks;
mod orders;
mod webhooks;
