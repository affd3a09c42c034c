use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::Instant;

use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;
use video_signaling_cell::{signaling_routes, RelayStats, SignalingRelay};

pub struct TestRelayServer {
    pub addr: SocketAddr,
    pub relay: SignalingRelay,
}

impl TestRelayServer {
    pub async fn start() -> Self {
        Self::start_with(TestConfig::default().to_arc()).await
    }

    pub async fn start_with(config: Arc<AppConfig>) -> Self {
        let listener = TcpListener::bind((config.signaling_host.as_str(), 0))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let relay = SignalingRelay::new();
        let app = signaling_routes(config, relay.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, relay }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Polls relay state until `check` holds, since cleanup runs after the
    /// client side has already seen the socket close.
    pub async fn wait_until<F>(&self, check: F) -> bool
    where
        F: FnMut(RelayStats) -> bool,
    {
        self.wait_for(Duration::from_secs(2), check).await
    }

    pub async fn wait_for<F>(&self, limit: Duration, mut check: F) -> bool
    where
        F: FnMut(RelayStats) -> bool,
    {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if check(self.relay.stats().await) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        check(self.relay.stats().await)
    }
}
