//! Integration tests: full runs through the public engine API.

mod mock_client;
mod scenarios;
