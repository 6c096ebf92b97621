use crate::builder::TransportBuilder;
use crate::client::Transport;
use crate::config::TransportConfig;
use crate::endpoint::Endpoint;
use crate::proxy::NoProxy;
use httpmock::MockServer;
use std::sync::Arc;

/// Plain-http transport against a mock server, rooted at `/api`.
pub fn mock_transport(server: &MockServer) -> Transport {
    TransportBuilder::with_config(
        Endpoint::new("http", server.address().to_string(), "/api"),
        TransportConfig::for_testing(),
    )
    .proxy_provider(Arc::new(NoProxy))
    .build()
    .unwrap()
}
