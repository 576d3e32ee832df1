use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::*;

use diag_api::v1::stats::{BandwidthResult, StatsReport, StatsSnapshot};

use crate::{capabilities::PeerLink, error::Error, stats::StatisticsAggregate};

/// Fraction of the target bitrate the estimate has to exceed to count as
/// ramped up.
pub const RAMP_UP_FRACTION: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthConfig {
    pub max_bitrate_kbps: f64,
    pub duration_ms: u64,
    pub stat_step_ms: u64,
}

impl BandwidthConfig {
    pub fn new(max_bitrate_kbps: f64) -> Self {
        Self {
            max_bitrate_kbps,
            duration_ms: 40_000,
            stat_step_ms: 100,
        }
    }

    pub fn ramp_up_threshold_kbps(&self) -> f64 {
        self.max_bitrate_kbps * RAMP_UP_FRACTION
    }
}

/// Polls a peer link for stats on a fixed cadence for a fixed duration and
/// summarizes bandwidth, round trip time and packet loss.
///
/// Every poll completes before the next one is scheduled. A failed poll is
/// logged and skipped. The total duration is checked between polls only, so a
/// stalled poll delays completion; the owning probe's timeout is the hard
/// limit.
#[derive(Debug)]
pub struct BandwidthSampler {
    config: BandwidthConfig,
    /// Congestion controller estimate, kbps.
    estimated_bandwidth: StatisticsAggregate,
    /// Differenced `bytesSent`, kbps.
    bandwidth: StatisticsAggregate,
    /// Milliseconds.
    rtt: StatisticsAggregate,
    frame_rate: StatisticsAggregate,
    previous_bytes_sent: HashMap<String, (f64, u64)>,
    packets_sent: u64,
    packets_lost: u64,
    failed_polls: u64,
}

impl BandwidthSampler {
    pub fn new(config: BandwidthConfig) -> Self {
        let threshold = config.ramp_up_threshold_kbps();
        Self {
            config,
            estimated_bandwidth: StatisticsAggregate::new(threshold),
            bandwidth: StatisticsAggregate::new(threshold),
            rtt: StatisticsAggregate::default(),
            frame_rate: StatisticsAggregate::default(),
            previous_bytes_sent: HashMap::new(),
            packets_sent: 0,
            packets_lost: 0,
            failed_polls: 0,
        }
    }

    pub fn config(&self) -> &BandwidthConfig {
        &self.config
    }

    pub fn failed_polls(&self) -> u64 {
        self.failed_polls
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn run(&mut self, link: &mut dyn PeerLink) -> BandwidthResult {
        let started = Instant::now();
        let duration = Duration::from_millis(self.config.duration_ms);
        let step = Duration::from_millis(self.config.stat_step_ms);

        while started.elapsed() <= duration {
            match link.poll_stats().await {
                Ok(snapshot) => self.ingest(&snapshot),
                Err(error) => {
                    self.failed_polls += 1;
                    let error = match error {
                        Error::StatsCollection(_) => error,
                        other => Error::StatsCollection(other.to_string()),
                    };
                    warn!("{error}");
                }
            }
            tokio::time::sleep(step).await;
        }

        debug!(
            "Sampling done after {:?}, {} failed poll(s)",
            started.elapsed(),
            self.failed_polls
        );
        self.completed()
    }

    /// Routes the relevant values of a snapshot into their aggregates.
    ///
    /// The estimate and round trip time come from the selected candidate
    /// pair only. Sent counters come from `outbound-rtp` and loss from
    /// `remote-inbound-rtp`; every other report is ignored.
    pub fn ingest(&mut self, snapshot: &StatsSnapshot) {
        if let Some(pair) = snapshot.selected_candidate_pair() {
            if let Some(bitrate) = pair.available_outgoing_bitrate {
                self.estimated_bandwidth.add(pair.timestamp, bitrate / 1000.0);
            }
            if let Some(rtt) = pair.current_round_trip_time {
                self.rtt.add(pair.timestamp, rtt * 1000.0);
            }
        }

        for report in snapshot.iter() {
            match report.report_type.as_str() {
                "outbound-rtp" => self.ingest_outbound(report),
                "remote-inbound-rtp" => {
                    if let Some(packets_lost) = report.packets_lost {
                        self.packets_lost = self.packets_lost.max(packets_lost.max(0) as u64);
                    }
                }
                _ => {}
            }
        }
    }

    fn ingest_outbound(&mut self, report: &StatsReport) {
        let time = report.timestamp;

        if let Some(bytes_sent) = report.bytes_sent {
            if let Some((previous_time, previous_bytes)) = self
                .previous_bytes_sent
                .insert(report.id.clone(), (time, bytes_sent))
            {
                let elapsed_ms = time - previous_time;
                if elapsed_ms > 0.0 && bytes_sent >= previous_bytes {
                    // bits per millisecond is kbps
                    let kbps = (bytes_sent - previous_bytes) as f64 * 8.0 / elapsed_ms;
                    self.bandwidth.add(time, kbps);
                }
            }
        }

        if let Some(frames_per_second) = report.frames_per_second {
            self.frame_rate.add(time, frames_per_second);
        }

        if let Some(packets_sent) = report.packets_sent {
            self.packets_sent = self.packets_sent.max(packets_sent);
        }
    }

    pub fn completed(&self) -> BandwidthResult {
        let packet_loss =
            (self.packets_sent > 0).then(|| self.packets_lost as f64 / self.packets_sent as f64);

        BandwidthResult {
            target_bitrate_kbps: self.config.max_bitrate_kbps,
            avg_bandwidth_kbps: self.bandwidth.average(),
            max_bandwidth_kbps: self.bandwidth.max(),
            avg_estimated_bandwidth_kbps: self.estimated_bandwidth.average(),
            max_estimated_bandwidth_kbps: self.estimated_bandwidth.max(),
            ramp_up_time_ms: self.estimated_bandwidth.ramp_up_duration(),
            avg_rtt_ms: self.rtt.average(),
            max_rtt_ms: self.rtt.max(),
            packet_loss,
            packets_sent: self.packets_sent,
            packets_lost: self.packets_lost,
            avg_frame_rate: (self.frame_rate.count() > 0).then(|| self.frame_rate.average()),
            samples: self.bandwidth.count().max(self.estimated_bandwidth.count()),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        capabilities::{IceCandidateEvent, TrackInfo},
        error::Result,
    };

    fn selected_pair(time: f64, estimate_bps: f64, rtt_s: f64) -> StatsReport {
        let mut pair = StatsReport::new("CP", "candidate-pair", time);
        pair.state = Some("succeeded".to_string());
        pair.nominated = Some(true);
        pair.available_outgoing_bitrate = Some(estimate_bps);
        pair.current_round_trip_time = Some(rtt_s);
        pair
    }

    fn snapshot(time: f64, estimate_bps: f64, rtt_s: f64, bytes_sent: u64) -> StatsSnapshot {
        let pair = selected_pair(time, estimate_bps, rtt_s);

        let mut outbound = StatsReport::new("OUT", "outbound-rtp", time);
        outbound.bytes_sent = Some(bytes_sent);
        outbound.packets_sent = Some(bytes_sent / 1000);

        StatsSnapshot {
            reports: vec![pair, outbound],
        }
    }

    #[test]
    fn routes_values_and_differences_bytes() {
        let mut sampler = BandwidthSampler::new(BandwidthConfig::new(2000.0));

        sampler.ingest(&snapshot(0.0, 500_000.0, 0.020, 0));
        sampler.ingest(&snapshot(100.0, 1_000_000.0, 0.040, 12_500));
        sampler.ingest(&snapshot(200.0, 1_600_000.0, 0.030, 37_500));

        let result = sampler.completed();
        // 12500 B / 100 ms = 1000 kbps, then 25000 B / 100 ms = 2000 kbps
        assert_eq!(result.avg_bandwidth_kbps, 1500.0);
        assert_eq!(result.max_bandwidth_kbps, 2000.0);
        assert_eq!(result.max_estimated_bandwidth_kbps, 1600.0);
        // 1600 > 0.75 * 2000
        assert_eq!(result.ramp_up_time_ms, Some(200.0));
        assert!((result.avg_rtt_ms - 30.0).abs() < 1e-9);
        assert!((result.max_rtt_ms - 40.0).abs() < 1e-9);
    }

    #[test]
    fn ignores_pairs_that_were_not_selected() {
        let mut sampler = BandwidthSampler::new(BandwidthConfig::new(2000.0));

        for (step, bytes_sent) in [0u64, 25_000, 50_000].into_iter().enumerate() {
            let time = step as f64 * 100.0;
            let mut failed = StatsReport::new("CP2", "candidate-pair", time);
            failed.state = Some("failed".to_string());
            failed.bytes_sent = Some(0);
            failed.packets_sent = Some(9_999);
            failed.current_round_trip_time = Some(2.0);
            failed.available_outgoing_bitrate = Some(10_000.0);

            let mut transport = StatsReport::new("T1", "transport", time);
            transport.bytes_sent = Some(0);

            let mut snapshot = snapshot(time, 1_800_000.0, 0.020, bytes_sent);
            snapshot.reports.extend([failed, transport]);
            sampler.ingest(&snapshot);
        }

        let result = sampler.completed();
        // 25000 B / 100 ms = 2000 kbps on both steps
        assert_eq!(result.avg_bandwidth_kbps, 2000.0);
        assert!((result.avg_rtt_ms - 20.0).abs() < 1e-9);
        assert!((result.max_rtt_ms - 20.0).abs() < 1e-9);
        assert_eq!(result.max_estimated_bandwidth_kbps, 1800.0);
        assert_eq!(result.avg_estimated_bandwidth_kbps, 1800.0);
        assert_eq!(result.packets_sent, 50);
    }

    #[test]
    fn packet_loss_requires_sent_packets() {
        let mut sampler = BandwidthSampler::new(BandwidthConfig::new(192.0));
        assert_eq!(sampler.completed().packet_loss, None);

        let mut outbound = StatsReport::new("OUT", "outbound-rtp", 0.0);
        outbound.packets_sent = Some(200);
        let mut remote = StatsReport::new("RIN", "remote-inbound-rtp", 0.0);
        remote.packets_lost = Some(10);
        sampler.ingest(&StatsSnapshot {
            reports: vec![outbound, remote],
        });

        assert_eq!(sampler.completed().packet_loss, Some(0.05));
    }

    #[test]
    fn never_ramping_up_is_not_a_latency() {
        let mut sampler = BandwidthSampler::new(BandwidthConfig::new(2000.0));
        sampler.ingest(&snapshot(0.0, 100_000.0, 0.01, 0));
        assert_eq!(sampler.completed().ramp_up_time_ms, None);
    }

    struct FlakyLink {
        polls: u64,
    }

    #[async_trait]
    impl PeerLink for FlakyLink {
        fn add_track(&mut self, _track: &TrackInfo) -> Result<()> {
            Ok(())
        }

        async fn negotiate(&mut self) -> Result<()> {
            Ok(())
        }

        async fn poll_stats(&mut self) -> Result<StatsSnapshot> {
            self.polls += 1;
            if self.polls % 2 == 0 {
                return Err(Error::Connectivity("getStats rejected".into()));
            }
            let time = self.polls as f64 * 100.0;
            Ok(snapshot(time, 1_800_000.0, 0.05, self.polls * 10_000))
        }

        fn ice_candidates(&mut self) -> mpsc::UnboundedReceiver<IceCandidateEvent> {
            mpsc::unbounded_channel().1
        }

        fn close(&mut self) {}
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn failed_polls_are_logged_and_skipped() {
        let mut sampler = BandwidthSampler::new(BandwidthConfig {
            max_bitrate_kbps: 2000.0,
            duration_ms: 1000,
            stat_step_ms: 100,
        });
        let mut link = FlakyLink { polls: 0 };

        let result = sampler.run(&mut link).await;

        assert!(link.polls >= 10 && link.polls <= 12, "{}", link.polls);
        assert_eq!(sampler.failed_polls(), link.polls / 2);
        assert!(result.samples > 0);
        assert_eq!(result.ramp_up_time_ms, Some(0.0));
        assert!(logs_contain("Failed collecting stats: Connectivity failure: getStats rejected"));
    }
}
