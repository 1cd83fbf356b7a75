//! Integration tests against a local mock venue

mod session_test;
mod transport_test;
