//! Separable bicubic filter and the depthwise downsampler built on it.

use crate::common::*;

/// Sharpness parameter of Keys' cubic convolution kernel.
pub const DEFAULT_BICUBIC_A: f64 = -0.5;

/// Piecewise cubic convolution kernel evaluated at `x`.
pub fn bicubic_kernel(x: f64, a: f64) -> f64 {
    let x = x.abs();

    if x <= 1.0 {
        (a + 2.0) * x.powi(3) - (a + 3.0) * x.powi(2) + 1.0
    } else if x < 2.0 {
        a * x.powi(3) - 5.0 * a * x.powi(2) + 8.0 * a * x - 4.0 * a
    } else {
        0.0
    }
}

/// Normalized 1-D taps of a bicubic filter that shrinks by `factor`.
///
/// The filter spans `4 * factor` taps. Tap `i` samples the kernel at
/// `(i - size / 2 + 0.5) / factor`, so the taps are symmetric around the
/// filter center.
pub fn bicubic_taps(factor: usize, a: f64) -> Result<Vec<f64>> {
    ensure!(factor > 0, "downsampling factor must be positive");

    let size = factor * 4;
    let half = (size / 2) as f64;
    let scale = (factor as f64).recip();

    let taps: Vec<f64> = (0..size)
        .map(|index| bicubic_kernel(scale * (index as f64 - half + 0.5), a))
        .collect();
    let sum: f64 = taps.iter().sum();
    ensure!(
        sum.abs() > f64::EPSILON,
        "bicubic taps sum to zero for a = {}",
        a
    );

    Ok(taps.into_iter().map(|tap| tap / sum).collect())
}

/// Row-major 2-D bicubic filter, the outer product of [bicubic_taps] with itself.
pub fn bicubic_filter_2d(factor: usize, a: f64) -> Result<Vec<f64>> {
    let taps = bicubic_taps(factor, a)?;
    let filter = taps
        .iter()
        .cartesian_product(taps.iter())
        .map(|(&row, &col)| row * col)
        .collect();
    Ok(filter)
}

#[derive(Debug, Clone)]
pub struct BicubicFilterInit {
    pub factor: usize,
    pub channels: usize,
    pub a: f64,
}

impl Default for BicubicFilterInit {
    fn default() -> Self {
        Self {
            factor: 2,
            channels: 3,
            a: DEFAULT_BICUBIC_A,
        }
    }
}

impl BicubicFilterInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>) -> Result<BicubicDownsample> {
        let path = path.borrow();
        let Self { factor, channels, a } = self;
        ensure!(channels > 0, "channels must be positive");

        let filter = bicubic_filter_2d(factor, a)?;
        let size = (factor * 4) as i64;
        let channels = channels as i64;

        // the filter is a buffer so that it follows the var store device
        let weight = {
            let kernel = Tensor::of_slice(&filter)
                .to_kind(Kind::Float)
                .view([1, 1, size, size])
                .expand(&[channels, 1, size, size], false);
            let mut weight = path.zeros_no_train("bicubic_filter", &[channels, 1, size, size]);
            tch::no_grad(|| weight.copy_(&kernel));
            weight
        };

        let pad = (size - factor as i64).max(0);
        let pad_begin = pad / 2;
        let pad_end = pad - pad_begin;

        Ok(BicubicDownsample {
            weight,
            factor: factor as i64,
            channels,
            padding: [pad_begin, pad_end, pad_begin, pad_end],
        })
    }
}

/// Depthwise bicubic downsampler with reflect padding.
#[derive(Debug)]
pub struct BicubicDownsample {
    weight: Tensor,
    factor: i64,
    channels: i64,
    padding: [i64; 4],
}

impl BicubicDownsample {
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn factor(&self) -> usize {
        self.factor as usize
    }

    /// Output spatial size for an input side of `size`.
    pub fn output_size(&self, size: i64) -> i64 {
        let [pad_l, pad_r, ..] = self.padding;
        let ksize = self.factor * 4;
        (size + pad_l + pad_r - ksize) / self.factor + 1
    }

    pub fn f_forward(&self, xs: &Tensor) -> Result<Tensor> {
        let Self {
            channels,
            padding: [pad_l, pad_r, pad_t, pad_b],
            ..
        } = *self;

        let (_, in_c, in_h, in_w) = xs.size4()?;
        ensure!(
            in_c == channels,
            "expect {} input channels, but get {}",
            channels,
            in_c
        );
        ensure!(
            in_h > pad_t.max(pad_b) && in_w > pad_l.max(pad_r),
            "input size {}x{} is too small for reflect padding {:?}",
            in_h,
            in_w,
            self.padding
        );

        Ok(self.forward(xs))
    }
}

impl nn::Module for BicubicDownsample {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let Self {
            ref weight,
            factor,
            channels,
            ref padding,
        } = *self;

        xs.reflection_pad2d(padding).conv2d::<&Tensor>(
            weight,
            None,
            &[factor, factor],
            &[0, 0],
            &[1, 1],
            channels,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn bicubic_kernel_test() {
        let a = DEFAULT_BICUBIC_A;

        assert_abs_diff_eq!(bicubic_kernel(0.0, a), 1.0);
        assert_abs_diff_eq!(bicubic_kernel(1.0, a), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bicubic_kernel(2.0, a), 0.0);
        assert_abs_diff_eq!(bicubic_kernel(3.5, a), 0.0);
        assert_abs_diff_eq!(bicubic_kernel(0.5, a), 0.5625, epsilon = 1e-12);
        assert_abs_diff_eq!(bicubic_kernel(-0.5, a), 0.5625, epsilon = 1e-12);
        assert_abs_diff_eq!(bicubic_kernel(1.5, a), -0.0625, epsilon = 1e-12);
    }

    #[test]
    fn bicubic_taps_test() -> Result<()> {
        for factor in 1..=4 {
            let taps = bicubic_taps(factor, DEFAULT_BICUBIC_A)?;
            ensure!(taps.len() == factor * 4, "incorrect number of taps");

            let sum: f64 = taps.iter().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);

            for (lhs, rhs) in izip!(taps.iter(), taps.iter().rev()) {
                assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-12);
            }
        }

        // taps sampled at half-pixel offsets (i - 4 + 0.5) / 2
        let taps = bicubic_taps(2, DEFAULT_BICUBIC_A)?;
        let half = [-0.01171875, -0.03515625, 0.11328125, 0.43359375];
        let expect: Vec<f64> = half.iter().chain(half.iter().rev()).cloned().collect();
        for (lhs, rhs) in izip!(taps.iter(), expect.iter()) {
            assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-12);
        }

        let filter = bicubic_filter_2d(2, DEFAULT_BICUBIC_A)?;
        assert_abs_diff_eq!(filter[3 * 8 + 4], 0.43359375 * 0.43359375, epsilon = 1e-12);
        ensure!(filter.len() == 64, "incorrect filter size");
        assert_abs_diff_eq!(filter.iter().sum::<f64>(), 1.0, epsilon = 1e-12);

        ensure!(bicubic_taps(0, DEFAULT_BICUBIC_A).is_err());
        Ok(())
    }

    #[test]
    fn bicubic_downsample_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let downsample = BicubicFilterInit {
            factor: 2,
            channels: 3,
            ..Default::default()
        }
        .build(&root / "downsample")?;
        ensure!(
            !downsample.weight().requires_grad(),
            "bicubic filter must not be trainable"
        );
        ensure!(downsample.weight().size() == vec![3, 1, 8, 8]);

        let input = Tensor::rand(&[2, 3, 16, 12], FLOAT_CPU).set_requires_grad(true);
        let output = downsample.f_forward(&input)?;
        ensure!(
            output.size() == vec![2, 3, 8, 6],
            "incorrect output shape {:?}",
            output.size()
        );
        ensure!(downsample.output_size(16) == 8 && downsample.output_size(12) == 6);

        output.sum(Kind::Float).backward();
        ensure!(input.grad().defined(), "gradient does not reach the input");

        Ok(())
    }

    #[test]
    fn bicubic_downsample_preserves_constant_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let downsample = BicubicFilterInit {
            factor: 4,
            channels: 2,
            ..Default::default()
        }
        .build(&root)?;

        let input = Tensor::ones(&[1, 2, 32, 32], FLOAT_CPU) * 0.25;
        let output = downsample.f_forward(&input)?;
        ensure!(output.size() == vec![1, 2, 8, 8]);

        let max_diff: f64 = (output - 0.25).abs().max().into();
        assert_abs_diff_eq!(max_diff, 0.0, epsilon = 1e-5);

        Ok(())
    }

    #[test]
    fn bicubic_downsample_rejects_bad_input_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let downsample = BicubicFilterInit::default().build(&vs.root())?;

        let wrong_channels = Tensor::rand(&[1, 4, 16, 16], FLOAT_CPU);
        ensure!(downsample.f_forward(&wrong_channels).is_err());

        let too_small = Tensor::rand(&[1, 3, 3, 16], FLOAT_CPU);
        ensure!(downsample.f_forward(&too_small).is_err());

        Ok(())
    }
}
