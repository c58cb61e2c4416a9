use std::time::Duration;

use reqwest::Client;

const USER_AGENT: &str = concat!("roadside-server/", env!("CARGO_PKG_VERSION"));

/// Shared builder for upstream HTTP clients.
///
/// reqwest is compiled without a bundled TLS provider, so the process-wide
/// rustls provider is installed here on first use.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}
