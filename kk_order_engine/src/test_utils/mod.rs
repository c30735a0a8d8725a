//! Helpers for tests: throw-away SQLite databases, a scriptable payment gateway and data fixtures.
pub mod fixtures;
pub mod mock_gateway;
pub mod prepare_env;
pub mod storefront;
