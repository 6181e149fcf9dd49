//! Sink that keeps every observation in memory

use parking_lot::Mutex;
use pvemon_agent::{MetricObservation, MetricSink};

#[derive(Default)]
pub struct RecordingSink {
    observations: Mutex<Vec<MetricObservation>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<MetricObservation> {
        self.observations.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.observations.lock().len()
    }

    /// Observations with metric name `name`
    pub fn named(&self, name: &str) -> Vec<MetricObservation> {
        self.observations
            .lock()
            .iter()
            .filter(|o| o.name == name)
            .cloned()
            .collect()
    }

    /// Observations whose label `key` equals `value`
    pub fn labelled(&self, key: &str, value: &str) -> Vec<MetricObservation> {
        self.observations
            .lock()
            .iter()
            .filter(|o| o.labels.get(key) == Some(value))
            .cloned()
            .collect()
    }

    /// Value of the single observation `name` carrying label `key=value`
    pub fn value_of(&self, name: &str, key: &str, value: &str) -> Option<f64> {
        self.observations
            .lock()
            .iter()
            .find(|o| o.name == name && o.labels.get(key) == Some(value))
            .map(|o| o.value)
    }

    pub fn clear(&self) {
        self.observations.lock().clear();
    }
}

impl MetricSink for RecordingSink {
    fn report(&self, observation: MetricObservation) {
        self.observations.lock().push(observation);
    }
}
