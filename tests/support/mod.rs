#![allow(dead_code, unused_imports)]

mod harness;
mod http_utils;
mod logging;
mod proxy_client;
mod upstream;

pub use harness::{ProxyHarness, ProxyHarnessBuilder};
pub use http_utils::{read_http_response, read_until_double_crlf};
pub use logging::LogCapture;
pub use proxy_client::ProxyClient;
pub use upstream::{CapturedRequest, TestUpstream};
