// libs/video-signaling-cell/src/services/listener.rs
use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::SignalingError;

/// Binds the first free port in `ports`, waiting `retry_delay` after each
/// port that is already in use. Any other bind failure is returned at once.
pub async fn bind_with_fallback(
    host: &str,
    ports: RangeInclusive<u16>,
    retry_delay: Duration,
) -> Result<TcpListener, SignalingError> {
    let (first, last) = (*ports.start(), *ports.end());

    for port in ports {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                info!("Video call signaling relay bound to {}:{}", host, port);
                return Ok(listener);
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                warn!("Port {} is already in use", port);
                if port < last {
                    info!("Trying alternative port {} in {:?}", port + 1, retry_delay);
                    tokio::time::sleep(retry_delay).await;
                }
            }
            Err(source) => return Err(SignalingError::Bind { port, source }),
        }
    }

    error!("Unable to find available port for video call signaling relay");
    Err(SignalingError::NoAvailablePort { first, last })
}
