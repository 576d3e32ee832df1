/// Streaming summary of a noisy time series: average, maximum, and how long it
/// took the series to first exceed a threshold ("ramp-up").
///
/// Samples are only ever appended. `sum` and `max` do not depend on the order
/// samples arrive in, but the start time and the ramp-up time latch on the
/// first call that sets them, so ramp-up depends on chronological feeding.
#[derive(Debug, Clone)]
pub struct StatisticsAggregate {
    count: u64,
    sum: f64,
    max: f64,
    start_time: Option<f64>,
    ramp_up_threshold: f64,
    ramp_up_time: Option<f64>,
}

impl Default for StatisticsAggregate {
    fn default() -> Self {
        Self::new(f64::INFINITY)
    }
}

impl StatisticsAggregate {
    pub fn new(ramp_up_threshold: f64) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            max: 0.0,
            start_time: None,
            ramp_up_threshold,
            ramp_up_time: None,
        }
    }

    pub fn add(&mut self, time: f64, value: f64) {
        if self.start_time.is_none() {
            self.start_time = Some(time);
        }
        self.sum += value;
        self.max = self.max.max(value);
        if self.ramp_up_time.is_none() && value > self.ramp_up_threshold {
            self.ramp_up_time = Some(time);
        }
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Zero when no sample was added.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    /// Time of the first sample above the threshold.
    pub fn ramp_up_time_stamp(&self) -> Option<f64> {
        self.ramp_up_time
    }

    /// Time between the first sample and the first threshold crossing.
    ///
    /// Returns `f64::INFINITY` when the threshold was never crossed; that value
    /// means "never ramped up" and must not be read as a latency.
    pub fn ramp_up_time(&self) -> f64 {
        match (self.start_time, self.ramp_up_time) {
            (Some(start), Some(ramp_up)) => ramp_up - start,
            _ => f64::INFINITY,
        }
    }

    /// [`Self::ramp_up_time`] with the sentinel mapped to `None`.
    pub fn ramp_up_duration(&self) -> Option<f64> {
        Some(self.ramp_up_time()).filter(|time| time.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_aggregate_has_zero_average() {
        let aggregate = StatisticsAggregate::new(500.0);
        assert_eq!(aggregate.average(), 0.0);
        assert_eq!(aggregate.max(), 0.0);
        assert!(aggregate.ramp_up_time().is_infinite());
        assert_eq!(aggregate.ramp_up_duration(), None);
    }

    #[test]
    fn average_and_max() {
        let mut aggregate = StatisticsAggregate::new(500.0);
        for (time, value) in [(0.0, 100.0), (100.0, 300.0), (200.0, 200.0)] {
            aggregate.add(time, value);
        }
        assert_eq!(aggregate.count(), 3);
        assert_eq!(aggregate.average(), 200.0);
        assert_eq!(aggregate.max(), 300.0);
    }

    #[test]
    fn ramp_up_measured_from_first_sample() {
        let mut aggregate = StatisticsAggregate::new(750.0);
        aggregate.add(1000.0, 100.0);
        aggregate.add(1100.0, 700.0);
        aggregate.add(1250.0, 800.0);
        aggregate.add(1300.0, 900.0);
        assert_eq!(aggregate.ramp_up_time(), 250.0);
        assert_eq!(aggregate.ramp_up_duration(), Some(250.0));
    }

    #[test]
    fn start_and_ramp_up_latch_on_first_call() {
        let mut aggregate = StatisticsAggregate::new(500.0);
        aggregate.add(5.0, 1000.0);
        aggregate.add(1.0, 2000.0);

        assert_eq!(aggregate.start_time(), Some(5.0));
        assert_eq!(aggregate.ramp_up_time_stamp(), Some(5.0));
        assert_eq!(aggregate.ramp_up_time(), 0.0);
        assert_eq!(aggregate.max(), 2000.0);
        assert_eq!(aggregate.average(), 1500.0);
    }

    #[test]
    fn threshold_must_be_exceeded_not_reached() {
        let mut aggregate = StatisticsAggregate::new(500.0);
        aggregate.add(0.0, 500.0);
        assert_eq!(aggregate.ramp_up_duration(), None);
        aggregate.add(10.0, 500.1);
        assert_eq!(aggregate.ramp_up_duration(), Some(10.0));
    }
}
