use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use shared_config::AppConfig;

pub type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub struct TestConfig {
    pub host: String,
    pub heartbeat_interval_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            heartbeat_interval_secs: 0,
        }
    }
}

impl TestConfig {
    pub fn with_heartbeat(secs: u64) -> Self {
        Self {
            heartbeat_interval_secs: secs,
            ..Self::default()
        }
    }

    /// Port 0 lets the OS pick a free port for each test server.
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            signaling_host: self.host.clone(),
            signaling_port: 0,
            signaling_max_port: 0,
            port_retry_delay_ms: 0,
            heartbeat_interval_secs: self.heartbeat_interval_secs,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// WebSocket client speaking the signaling protocol, for driving a relay
/// from tests.
pub struct TestSignalingClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub user_id: String,
}

impl TestSignalingClient {
    pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    pub async fn connect(url: &str, user_id: &str) -> TestResult<Self> {
        let (stream, _) = connect_async(url).await?;
        Ok(Self {
            stream,
            user_id: user_id.to_string(),
        })
    }

    /// Connects and registers, consuming the `user-registered` acknowledgment.
    pub async fn register_new(
        url: &str,
        user_id: &str,
        role: &str,
        appointment_id: &str,
    ) -> TestResult<Self> {
        let mut client = Self::connect(url, user_id).await?;
        client.register(role, appointment_id).await?;

        let ack = client.recv_json().await?;
        if ack["type"] != "user-registered" {
            return Err(format!("expected user-registered, got {}", ack).into());
        }
        Ok(client)
    }

    pub async fn send_json(&mut self, value: Value) -> TestResult<()> {
        self.send_text(value.to_string()).await
    }

    pub async fn send_text(&mut self, text: String) -> TestResult<()> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    pub async fn register(&mut self, role: &str, appointment_id: &str) -> TestResult<()> {
        let message = json!({
            "type": "register",
            "userId": self.user_id,
            "role": role,
            "appointmentId": appointment_id,
        });
        self.send_json(message).await
    }

    pub async fn send_offer(&mut self, offer: Value, appointment_id: &str) -> TestResult<()> {
        self.send_json(json!({
            "type": "call-offer",
            "offer": offer,
            "appointmentId": appointment_id,
        }))
        .await
    }

    pub async fn send_answer(&mut self, answer: Value, to: &str) -> TestResult<()> {
        self.send_json(json!({
            "type": "call-answer",
            "answer": answer,
            "to": to,
        }))
        .await
    }

    pub async fn send_candidate(&mut self, candidate: Value, to: &str) -> TestResult<()> {
        self.send_json(json!({
            "type": "ice-candidate",
            "candidate": candidate,
            "to": to,
        }))
        .await
    }

    pub async fn end_call(&mut self, appointment_id: &str) -> TestResult<()> {
        self.send_json(json!({
            "type": "call-ended",
            "appointmentId": appointment_id,
        }))
        .await
    }

    /// Next text frame, skipping control frames.
    pub async fn recv_text(&mut self) -> TestResult<String> {
        loop {
            let frame = timeout(Self::RECV_TIMEOUT, self.stream.next())
                .await
                .map_err(|_| "timed out waiting for message")?;

            match frame {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Close(_))) | None => return Err("connection closed".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    pub async fn recv_json(&mut self) -> TestResult<Value> {
        let text = self.recv_text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Waits for the next message of the given type, failing on any other.
    pub async fn expect(&mut self, kind: &str) -> TestResult<Value> {
        let message = self.recv_json().await?;
        if message["type"] == kind {
            Ok(message)
        } else {
            Err(format!("expected {}, got {}", kind, message).into())
        }
    }

    /// True if no text frame arrives within `wait`. Control frames keep the
    /// stream polled but do not extend the wait.
    pub async fn assert_silent(&mut self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            match timeout_at(deadline, self.stream.next()).await {
                Err(_) => return true,
                Ok(Some(Ok(Message::Text(_)))) => return false,
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return true,
                Ok(Some(Ok(_))) => continue,
            }
        }
    }

    pub async fn close(mut self) -> TestResult<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
