//! Test suites for node bootstrap and router composition.

mod router_http;
pub(crate) mod support;
