use crate::common::*;

/// Negative slope used by every residual block.
pub const DEFAULT_LEAKY_SLOPE: f64 = 0.2;

/// Leaky ReLU with a configurable negative slope.
pub fn leaky_relu(xs: &Tensor, slope: f64) -> Tensor {
    xs.relu() * (1.0 - slope) + xs * slope
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakyRelu {
    pub slope: f64,
}

impl Default for LeakyRelu {
    fn default() -> Self {
        Self {
            slope: DEFAULT_LEAKY_SLOPE,
        }
    }
}

impl nn::Module for LeakyRelu {
    fn forward(&self, xs: &Tensor) -> Tensor {
        leaky_relu(xs, self.slope)
    }
}
