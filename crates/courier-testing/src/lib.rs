//! Test doubles for the outbound HTTP services
//!
//! `MockServer` listens on a random local port and answers requests from a
//! list of expectations, recording every request it sees so tests can assert
//! on what the CRM or mail relay would have received.

pub mod expectation;
pub mod matcher;
pub mod server;

pub use expectation::{Expectation, MockResponse, Times};
pub use matcher::RequestMatcher;
pub use server::{MockServer, RecordedRequest};
