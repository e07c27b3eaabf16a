//! RSSI smoothing filters

use std::collections::VecDeque;
use std::sync::Arc;

/// Per-device running filter over RSSI samples
pub trait Smoother: Send {
    /// Feed one sample, get the smoothed value back
    fn smooth(&mut self, value: f32) -> f32;
}

/// Creates one smoother per newly seen device
pub type SmootherFactory = Arc<dyn Fn() -> Box<dyn Smoother> + Send + Sync>;

/// Constant weight running average.
///
/// The first sample seeds the average; every later sample moves it by
/// `(sample - average) / factor`. A factor of 1 tracks the raw value.
#[derive(Clone, Debug)]
pub struct ConstantFilter {
    factor: f32,
    average: Option<f32>,
}

impl ConstantFilter {
    /// `factor` below 1 is clamped to 1
    pub fn new(factor: f32) -> Self {
        ConstantFilter {
            factor: factor.max(1.0),
            average: None,
        }
    }

    pub fn factory(factor: f32) -> SmootherFactory {
        Arc::new(move || Box::new(ConstantFilter::new(factor)) as Box<dyn Smoother>)
    }

    pub fn average(&self) -> Option<f32> {
        self.average
    }
}

impl Smoother for ConstantFilter {
    fn smooth(&mut self, value: f32) -> f32 {
        let average = match self.average {
            Some(average) => average + (value - average) / self.factor,
            None => value,
        };
        self.average = Some(average);
        average
    }
}

/// Mean of the last `size` samples
#[derive(Clone, Debug)]
pub struct WindowAverage {
    size: usize,
    samples: VecDeque<f32>,
    sum: f32,
}

impl WindowAverage {
    /// `size` of zero is treated as one
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        WindowAverage {
            size,
            samples: VecDeque::with_capacity(size),
            sum: 0.0,
        }
    }

    pub fn factory(size: usize) -> SmootherFactory {
        Arc::new(move || Box::new(WindowAverage::new(size)) as Box<dyn Smoother>)
    }
}

impl Smoother for WindowAverage {
    fn smooth(&mut self, value: f32) -> f32 {
        if self.samples.len() == self.size {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }
        self.samples.push_back(value);
        self.sum += value;
        self.sum / self.samples.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_filter_halves_the_gap() {
        let mut filter = ConstantFilter::new(2.0);
        assert_eq!(filter.smooth(-50.0), -50.0);
        assert_eq!(filter.smooth(-40.0), -45.0);
        assert_eq!(filter.smooth(-35.0), -40.0);
        assert_eq!(filter.smooth(-38.0), -39.0);
        assert_eq!(filter.smooth(-36.0), -37.5);
        assert_eq!(filter.average(), Some(-37.5));
    }

    #[test]
    fn test_constant_filter_factor_one_is_raw() {
        let mut filter = ConstantFilter::new(0.5);
        filter.smooth(-80.0);
        assert_eq!(filter.smooth(-20.0), -20.0);
    }

    #[test]
    fn test_window_average() {
        let mut window = WindowAverage::new(3);
        assert_eq!(window.smooth(-30.0), -30.0);
        assert_eq!(window.smooth(-60.0), -45.0);
        assert_eq!(window.smooth(-90.0), -60.0);
        // -30 drops out
        assert_eq!(window.smooth(-30.0), -60.0);
    }

    #[test]
    fn test_factories_create_independent_state() {
        let factory = ConstantFilter::factory(2.0);
        let mut a = factory();
        let mut b = factory();
        a.smooth(-10.0);
        assert_eq!(b.smooth(-90.0), -90.0);
        assert_eq!(a.smooth(-20.0), -15.0);
    }
}
