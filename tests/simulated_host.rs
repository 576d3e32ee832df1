use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use diag_api::v1::{
    nat::{NatResult, NatVerdict},
    report::{Report, TestStatus},
};
use rtc_diagnostics::{
    capabilities::simulated::HostProfile,
    diagnostics::{build_suite, CameraCheckConfig, DiagnosticsConfig, NatTypeProbe, ProbeKind},
    error::Result,
    probe::{Probe, ProbeTask},
    suite::TestSuite,
};

fn quick_config() -> DiagnosticsConfig {
    let mut config = DiagnosticsConfig {
        camera: CameraCheckConfig {
            duration_ms: 1000,
            width: 640,
            height: 480,
        },
        ..Default::default()
    };
    config.audio_bandwidth.duration_ms = 2000;
    config.video_bandwidth.duration_ms = 2000;
    config
}

fn suite_for(profile: HostProfile, config: &DiagnosticsConfig) -> TestSuite {
    build_suite(
        "Diagnostics",
        &ProbeKind::ALL,
        config,
        &profile.capabilities(),
    )
}

fn names(report: &Report) -> Vec<&str> {
    report.entries.iter().map(|entry| entry.name.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn healthy_host_passes_every_test() {
    let report = suite_for(HostProfile::Healthy, &quick_config())
        .start()
        .await
        .unwrap();

    let expected: Vec<_> = ProbeKind::ALL.iter().map(ProbeKind::display_name).collect();
    assert_eq!(names(&report), expected);
    assert!(report
        .entries
        .iter()
        .all(|entry| entry.status == TestStatus::Passed && entry.results.is_some()));
}

#[tokio::test(start_paused = true)]
async fn symmetric_nat_is_detected() {
    let report = suite_for(HostProfile::SymmetricNat, &quick_config())
        .start()
        .await
        .unwrap();

    let nat = report
        .entries
        .iter()
        .find(|entry| entry.name == ProbeKind::NatType.display_name())
        .unwrap();
    let result: NatResult = serde_json::from_value(nat.results.clone().unwrap()).unwrap();
    assert_eq!(result.verdict, NatVerdict::Symmetric);
    assert_eq!(nat.results.as_ref().unwrap()["verdict"], json!("nat.symmetric"));
}

#[tokio::test(start_paused = true)]
async fn missing_camera_fails_video_tests_only() {
    let error = suite_for(HostProfile::NoCamera, &quick_config())
        .start()
        .await
        .unwrap_err();

    let report = error.report().unwrap();
    assert_eq!(report.len(), ProbeKind::ALL.len());
    let failed: Vec<_> = report.failures().map(|entry| entry.name.as_str()).collect();
    assert_eq!(failed, ["Camera", "Video bandwidth"]);
    assert_eq!(
        report.entries[1].message.as_deref(),
        Some("Failed to acquire media: Device unavailable: No camera found")
    );
}

#[tokio::test(start_paused = true)]
async fn stop_on_failure_ends_at_the_first_failure() {
    let config = DiagnosticsConfig {
        stop_on_failure: true,
        ..quick_config()
    };
    let error = suite_for(HostProfile::BlackCamera, &config)
        .start()
        .await
        .unwrap_err();

    let report = error.report().unwrap();
    assert_eq!(names(report), ["Microphone", "Camera"]);
    assert_eq!(
        report.entries[1].message.as_deref(),
        Some("Camera delivered mostly black frames")
    );
    assert!(report.entries[1].details.is_some());
}

#[tokio::test(start_paused = true)]
async fn no_ice_servers_fail_network_tests_fast() {
    let config = DiagnosticsConfig {
        ice_servers: Vec::new(),
        ..quick_config()
    };
    let error = suite_for(HostProfile::Healthy, &config)
        .start()
        .await
        .unwrap_err();

    let report = error.report().unwrap();
    let failed: Vec<_> = report.failures().map(|entry| entry.name.as_str()).collect();
    assert_eq!(failed, ["Connectivity", "Audio bandwidth", "Video bandwidth"]);
    assert!(report
        .failures()
        .all(|entry| entry.message.as_deref() == Some("Connectivity failure: No ICE servers configured")));
}

struct Stuck;

#[async_trait]
impl Probe for Stuck {
    fn name(&self) -> &str {
        "Stuck"
    }

    async fn run(&mut self) -> Result<serde_json::Value> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn timed_out_probe_is_reported_and_the_suite_goes_on() {
    let config = quick_config();
    let capabilities = HostProfile::Healthy.capabilities();

    let mut suite = build_suite("Diagnostics", &[ProbeKind::Microphone], &config, &capabilities);
    suite.add_task(ProbeTask::new(Box::new(Stuck)).with_timeout(Duration::from_millis(500)));
    suite.add_test(NatTypeProbe::new(&config, &capabilities));

    let error = suite.start().await.unwrap_err();
    let report = error.report().unwrap();

    assert_eq!(report.len(), 3);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].name, "Stuck");
    assert_eq!(failures[0].message.as_deref(), Some("Timed out after 500 ms"));
}

#[tokio::test(start_paused = true)]
async fn stopping_interrupts_a_running_bandwidth_test() {
    let mut config = quick_config();
    config.video_bandwidth.duration_ms = 40_000;
    let mut suite = build_suite(
        "Diagnostics",
        &[ProbeKind::VideoBandwidth, ProbeKind::NatType],
        &config,
        &HostProfile::Healthy.capabilities(),
    );

    let stop = suite.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        stop.stop();
    });

    let error = suite.start().await.unwrap_err();
    let report = error.report().unwrap();
    assert_eq!(names(report), ["Video bandwidth"]);
    assert_eq!(
        report.entries[0].message.as_deref(),
        Some("Stopped before completion")
    );
    assert_eq!(suite.pending(), 0);
}
