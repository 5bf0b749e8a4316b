//! Feature-adaptive de-normalization.

use super::{
    conv::{Conv2D, Conv2DInit},
    norm::{BatchNorm, BatchNormInit},
};
use crate::common::*;

/// Side-channel feature maps that modulate a [Fade] layer.
#[derive(Debug)]
pub struct FadeFeatures<'a> {
    pub scale: &'a Tensor,
    pub shift: &'a Tensor,
}

impl<'a> FadeFeatures<'a> {
    /// Uses the same map for both scale and shift.
    pub fn shared(features: &'a Tensor) -> Self {
        Self {
            scale: features,
            shift: features,
        }
    }

    fn check(&self, input: &Tensor, feature_c: i64) -> Result<()> {
        let (in_b, _, in_h, in_w) = input.size4()?;

        for (name, features) in [("scale", self.scale), ("shift", self.shift)] {
            let (b, c, h, w) = features.size4()?;
            ensure!(
                (b, h, w) == (in_b, in_h, in_w),
                "{} features of shape {:?} do not match input shape {:?}",
                name,
                features.size(),
                input.size()
            );
            ensure!(
                c == feature_c,
                "expect {} channels for {} features, but get {}",
                feature_c,
                name,
                c
            );
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FadeInit {
    /// Predict one modulation map per channel instead of a single map
    /// broadcast across channels.
    pub per_channel: bool,
    pub norm: BatchNormInit,
}

impl Default for FadeInit {
    fn default() -> Self {
        Self {
            per_channel: false,
            norm: Default::default(),
        }
    }
}

impl FadeInit {
    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        channels: usize,
        feature_c: usize,
    ) -> Result<Fade> {
        let path = path.borrow();
        let Self { per_channel, norm } = self;

        let modulation_c = if per_channel { channels } else { 1 };
        let norm = norm.build(path / "norm", channels)?;
        let scale_conv = Conv2DInit::new(1).build(path / "scale_conv", feature_c, modulation_c)?;
        let shift_conv = Conv2DInit::new(1).build(path / "shift_conv", feature_c, modulation_c)?;

        Ok(Fade {
            norm,
            scale_conv,
            shift_conv,
            feature_c: feature_c as i64,
        })
    }
}

#[derive(Debug)]
pub struct Fade {
    norm: BatchNorm,
    scale_conv: Conv2D,
    shift_conv: Conv2D,
    feature_c: i64,
}

impl Fade {
    pub fn forward_t(
        &mut self,
        input: &Tensor,
        features: &FadeFeatures<'_>,
        train: bool,
    ) -> Result<Tensor> {
        let Self {
            ref mut norm,
            ref scale_conv,
            ref shift_conv,
            feature_c,
        } = *self;
        features.check(input, feature_c)?;

        let xs = norm.forward_t(input, train)?;
        let scale = scale_conv.forward(features.scale);
        let shift = shift_conv.forward(features.shift);

        Ok(xs * scale + shift)
    }
}
