use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A single entry of a peer link stats snapshot, following the shape of the
/// W3C [RTCStats](https://www.w3.org/TR/webrtc-stats/) dictionaries.
///
/// Only the members the diagnostics consume are modeled; everything else the
/// host reports is dropped on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub id: String,
    #[serde(rename = "type")]
    pub report_type: String,
    /// Milliseconds, host clock.
    pub timestamp: f64,
    /// Bits per second, from the congestion controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_outgoing_bitrate: Option<f64>,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_round_trip_time: Option<f64>,
    #[ts(type = "number")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<u64>,
    #[ts(type = "number")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets_sent: Option<u64>,
    #[ts(type = "number")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets_lost: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_candidate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nominated: Option<bool>,
}

impl StatsReport {
    pub fn new(id: impl Into<String>, report_type: impl Into<String>, timestamp: f64) -> Self {
        Self {
            id: id.into(),
            report_type: report_type.into(),
            timestamp,
            ..Default::default()
        }
    }

    pub fn is_type(&self, report_type: &str) -> bool {
        self.report_type == report_type
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(transparent)]
pub struct StatsSnapshot {
    pub reports: Vec<StatsReport>,
}

impl StatsSnapshot {
    pub fn iter(&self) -> impl Iterator<Item = &StatsReport> {
        self.reports.iter()
    }

    pub fn find(&self, id: &str) -> Option<&StatsReport> {
        self.reports.iter().find(|report| report.id == id)
    }

    /// The candidate pair the ICE agent settled on, if any.
    pub fn selected_candidate_pair(&self) -> Option<&StatsReport> {
        self.reports.iter().find(|report| {
            report.is_type("candidate-pair")
                && report.nominated.unwrap_or(false)
                && report.state.as_deref() == Some("succeeded")
        })
    }
}

/// Counters kept by a frame quality monitor for its whole life.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    pub num_frames: u64,
    pub num_black_frames: u64,
    pub num_frozen_frames: u64,
}

/// Result payload of the audio and video bandwidth probes.
///
/// Bandwidths are in kbps, round trip times in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthResult {
    pub target_bitrate_kbps: f64,
    pub avg_bandwidth_kbps: f64,
    pub max_bandwidth_kbps: f64,
    pub avg_estimated_bandwidth_kbps: f64,
    pub max_estimated_bandwidth_kbps: f64,
    /// `None` when the estimate never crossed the ramp-up threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramp_up_time_ms: Option<f64>,
    pub avg_rtt_ms: f64,
    pub max_rtt_ms: f64,
    /// Lost over sent; `None` when nothing was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_loss: Option<f64>,
    #[ts(type = "number")]
    pub packets_sent: u64,
    #[ts(type = "number")]
    pub packets_lost: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_frame_rate: Option<f64>,
    #[ts(type = "number")]
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct MicrophoneResult {
    pub track_label: String,
    pub sample_rate: Option<u32>,
    #[ts(type = "number")]
    pub samples: u64,
    /// Linear full scale, 0..1.
    pub peak_level: f64,
    pub rms_level: f64,
    pub rms_dbfs: f64,
    pub clipping: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CameraResult {
    pub track_label: String,
    pub requested_width: u32,
    pub requested_height: u32,
    pub actual_width: Option<u32>,
    pub actual_height: Option<u32>,
    pub frame_stats: FrameStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityResult {
    pub local_candidate_type: Option<String>,
    pub round_trip_time_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_host_stats_and_ignores_unknown_members() {
        let json = serde_json::json!([
            {
                "id": "CP1",
                "type": "candidate-pair",
                "timestamp": 1000.0,
                "availableOutgoingBitrate": 1500000.0,
                "currentRoundTripTime": 0.05,
                "nominated": true,
                "state": "succeeded",
                "requestsSent": 12
            },
            {"id": "OUT1", "type": "outbound-rtp", "timestamp": 1000.0, "bytesSent": 4200, "packetsSent": 10}
        ]);

        let snapshot: StatsSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(snapshot.reports.len(), 2);
        let pair = snapshot.selected_candidate_pair().unwrap();
        assert_eq!(pair.available_outgoing_bitrate, Some(1_500_000.0));
        assert_eq!(snapshot.find("OUT1").unwrap().bytes_sent, Some(4200));
    }
}
