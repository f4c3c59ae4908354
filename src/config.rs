use crate::error::{Result, ValveError};
use crate::valve::Valve;
use std::time::Duration;

/// Immutable settings of a valve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValveConfig {
    /// Upper bound on how long a partial batch waits before a flush attempt
    pub tick_interval: Duration,
    /// Batch length that triggers an immediate flush attempt
    pub batch_size: usize,
    /// Capacity of the input queue (0 means rendezvous)
    pub input_capacity: usize,
    /// Capacity of the output queue (0 means rendezvous)
    pub output_capacity: usize,
}

impl ValveConfig {
    /// Create a config from all four required settings
    pub fn new(
        tick_interval: Duration,
        batch_size: usize,
        input_capacity: usize,
        output_capacity: usize,
    ) -> Self {
        Self {
            tick_interval,
            batch_size,
            input_capacity,
            output_capacity,
        }
    }

    /// Check the settings a running valve relies on
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ValveError::Config("batch_size must be positive".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(ValveError::Config("tick_interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for constructing valves
///
/// Every setting is required; `build` reports the first one left unset.
#[derive(Debug, Default)]
pub struct ValveBuilder {
    tick_interval: Option<Duration>,
    batch_size: Option<usize>,
    input_capacity: Option<usize>,
    output_capacity: Option<usize>,
}

impl ValveBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the periodic flush interval
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    /// Set the size-triggered flush threshold
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set the input queue capacity
    pub fn input_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = Some(capacity);
        self
    }

    /// Set the output queue capacity
    pub fn output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = Some(capacity);
        self
    }

    /// Resolve the settings into a validated config
    pub fn config(&self) -> Result<ValveConfig> {
        let config = ValveConfig {
            tick_interval: require(self.tick_interval, "tick_interval")?,
            batch_size: require(self.batch_size, "batch_size")?,
            input_capacity: require(self.input_capacity, "input_capacity")?,
            output_capacity: require(self.output_capacity, "output_capacity")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build the valve
    pub fn build<T>(self) -> Result<Valve<T>> {
        Valve::new(self.config()?)
    }
}

fn require<V>(value: Option<V>, name: &str) -> Result<V> {
    value.ok_or_else(|| ValveError::Config(format!("{name} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_builder() -> ValveBuilder {
        ValveBuilder::new()
            .tick_interval(Duration::from_millis(100))
            .batch_size(10)
            .input_capacity(100)
            .output_capacity(2)
    }

    #[test]
    fn test_builder_resolves_config() {
        let config = full_builder().config().unwrap();
        assert_eq!(
            config,
            ValveConfig::new(Duration::from_millis(100), 10, 100, 2)
        );
    }

    #[test]
    fn test_missing_setting() {
        let result = ValveBuilder::new()
            .tick_interval(Duration::from_millis(100))
            .batch_size(10)
            .input_capacity(100)
            .config();
        assert_eq!(
            result,
            Err(ValveError::Config("output_capacity is required".into()))
        );
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = full_builder().batch_size(0).config();
        assert!(matches!(result, Err(ValveError::Config(_))));
    }

    #[test]
    fn test_zero_tick_rejected() {
        let result = full_builder().tick_interval(Duration::ZERO).config();
        assert!(matches!(result, Err(ValveError::Config(_))));
    }

    #[test]
    fn test_zero_capacities_allowed() {
        let config = full_builder()
            .input_capacity(0)
            .output_capacity(0)
            .config()
            .unwrap();
        assert_eq!(config.input_capacity, 0);
        assert_eq!(config.output_capacity, 0);
    }
}
