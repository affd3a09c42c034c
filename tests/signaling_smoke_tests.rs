/// Signaling Relay Smoke Test Suite
///
/// Drives a running relay the way two browser clients would, end to end over
/// real sockets. Point it at a deployment with SIGNALING_URL and
/// SIGNALING_HTTP_URL (defaults target a local relay on port 3002).
///
/// Test Categories:
/// - Relay health
/// - Registration and pairing
/// - Offer / answer / ICE candidate exchange
/// - Hangup and disconnect cleanup

use std::time::Duration;
use serde_json::{json, Value};
use shared_utils::test_utils::{TestResult, TestSignalingClient};
use uuid::Uuid;

const DEFAULT_WS_URL: &str = "ws://localhost:3002";
const DEFAULT_HTTP_URL: &str = "http://localhost:3002";

/// Test results tracker
#[derive(Debug, Default)]
pub struct TestResults {
    pub passed: u32,
    pub failed: u32,
    pub failures: Vec<String>,
}

impl TestResults {
    pub fn record(&mut self, test_name: &str, outcome: TestResult<()>) {
        match outcome {
            Ok(()) => {
                self.passed += 1;
                println!("✅ {}", test_name);
            }
            Err(e) => {
                self.failed += 1;
                self.failures.push(format!("{}: {}", test_name, e));
                println!("❌ {}: {}", test_name, e);
            }
        }
    }

    pub fn summary(&self) {
        println!("\n📊 Test Summary:");
        println!("✅ Passed: {}", self.passed);
        println!("❌ Failed: {}", self.failed);

        if !self.failures.is_empty() {
            println!("\n🔍 Failures:");
            for failure in &self.failures {
                println!("  - {}", failure);
            }
        }
    }
}

pub struct SmokeTarget {
    pub ws_url: String,
    pub http_url: String,
}

impl SmokeTarget {
    pub fn from_env() -> Self {
        Self {
            ws_url: std::env::var("SIGNALING_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string()),
            http_url: std::env::var("SIGNALING_HTTP_URL")
                .unwrap_or_else(|_| DEFAULT_HTTP_URL.to_string()),
        }
    }

    async fn get_json(&self, path: &str) -> TestResult<(reqwest::StatusCode, Value)> {
        let response = reqwest::get(format!("{}{}", self.http_url, path)).await?;
        let status = response.status();
        Ok((status, response.json().await?))
    }
}

fn unique_appointment() -> String {
    format!("smoke-{}", Uuid::new_v4())
}

async fn check_health(target: &SmokeTarget) -> TestResult<()> {
    let (status, body) = target.get_json("/health").await?;
    if !status.is_success() || body["status"] != "healthy" {
        return Err(format!("unexpected health response {}: {}", status, body).into());
    }
    Ok(())
}

async fn check_call_flow(target: &SmokeTarget) -> TestResult<()> {
    let appointment = unique_appointment();
    let doctor_id = format!("doctor-{}", Uuid::new_v4());
    let patient_id = format!("patient-{}", Uuid::new_v4());

    let mut doctor = TestSignalingClient::register_new(&target.ws_url, &doctor_id, "doctor", &appointment).await?;
    let mut patient = TestSignalingClient::register_new(&target.ws_url, &patient_id, "patient", &appointment).await?;
    patient.expect("user-joined").await?;
    doctor.expect("user-joined").await?;

    let (status, group) = target.get_json(&format!("/groups/{}", appointment)).await?;
    if !status.is_success() || group["members"].as_array().map(Vec::len) != Some(2) {
        return Err(format!("group not visible: {} {}", status, group).into());
    }

    doctor.send_offer(json!({ "type": "offer", "sdp": "v=0\r\n" }), &appointment).await?;
    let offer = patient.expect("call-offer").await?;
    if offer["from"] != doctor_id.as_str() {
        return Err(format!("offer from wrong sender: {}", offer).into());
    }

    patient.send_answer(json!({ "type": "answer", "sdp": "v=0\r\n" }), &doctor_id).await?;
    doctor.expect("call-answer").await?;

    let candidate = json!({ "candidate": "candidate:0 1 UDP 2122252543 10.0.0.5 40000 typ host", "sdpMid": "0" });
    doctor.send_candidate(candidate.clone(), &patient_id).await?;
    let forwarded = patient.expect("ice-candidate").await?;
    if forwarded["candidate"] != candidate {
        return Err(format!("candidate altered: {}", forwarded).into());
    }

    doctor.end_call(&appointment).await?;
    patient.expect("call-ended").await?;

    doctor.close().await?;
    let gone = patient.expect("user-disconnected").await?;
    if gone["userId"] != doctor_id.as_str() {
        return Err(format!("wrong disconnect notice: {}", gone).into());
    }

    patient.close().await?;
    Ok(())
}

async fn check_group_teardown(target: &SmokeTarget) -> TestResult<()> {
    let appointment = unique_appointment();
    let client = TestSignalingClient::register_new(&target.ws_url, "smoke-solo", "patient", &appointment).await?;
    client.close().await?;

    for _ in 0..25 {
        let (status, _) = target.get_json(&format!("/groups/{}", appointment)).await?;
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err("group still present after last participant left".into())
}

/// Runs every smoke check against the configured relay
pub async fn run_smoke_tests() -> TestResults {
    let target = SmokeTarget::from_env();
    let mut results = TestResults::default();

    println!("🚀 Starting Signaling Relay Smoke Tests");
    println!("📍 WebSocket URL: {}", target.ws_url);

    println!("\n🩺 Health");
    results.record("Relay health", check_health(&target).await);

    println!("\n🎥 Call Flow");
    results.record("Offer/answer/candidate/hangup", check_call_flow(&target).await);

    println!("\n🧹 Cleanup");
    results.record("Group teardown", check_group_teardown(&target).await);

    results
}

#[tokio::main]
async fn main() {
    let results = run_smoke_tests().await;
    results.summary();

    if results.failed > 0 {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a running signaling relay"]
    async fn test_smoke_against_running_relay() {
        let results = run_smoke_tests().await;
        assert_eq!(results.failed, 0, "{:?}", results.failures);
    }

    #[test]
    fn test_results_tracking() {
        let mut results = TestResults::default();
        results.record("ok", Ok(()));
        results.record("broken", Err("boom".into()));

        assert_eq!(results.passed, 1);
        assert_eq!(results.failed, 1);
        assert_eq!(results.failures, vec!["broken: boom".to_string()]);
    }
}
