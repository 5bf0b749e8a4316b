use super::{
    activation::{leaky_relu, DEFAULT_LEAKY_SLOPE},
    conv::{Conv2D, Conv2DInit},
    fade::{Fade, FadeFeatures, FadeInit},
};
use crate::common::*;

/// Leaky ReLU followed by a convolution.
#[derive(Debug, Clone)]
pub struct FadeResInit {
    pub ksize: usize,
    pub slope: f64,
}

impl FadeResInit {
    pub fn new(ksize: usize) -> Self {
        Self {
            ksize,
            slope: DEFAULT_LEAKY_SLOPE,
        }
    }

    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        in_c: usize,
        out_c: usize,
    ) -> Result<FadeRes> {
        let path = path.borrow();
        let Self { ksize, slope } = self;
        let conv = Conv2DInit::new(ksize).build(path / "conv", in_c, out_c)?;
        Ok(FadeRes { conv, slope })
    }
}

#[derive(Debug)]
pub struct FadeRes {
    conv: Conv2D,
    slope: f64,
}

impl nn::Module for FadeRes {
    fn forward(&self, xs: &Tensor) -> Tensor {
        self.conv.forward(&leaky_relu(xs, self.slope))
    }
}

/// Decoder residual block modulated by FADE, followed by 2x bilinear
/// upsampling.
#[derive(Debug, Clone)]
pub struct FadeResBlockInit {
    pub per_channel: bool,
    pub upsample: bool,
}

impl Default for FadeResBlockInit {
    fn default() -> Self {
        Self {
            per_channel: false,
            upsample: true,
        }
    }
}

impl FadeResBlockInit {
    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        in_c: usize,
        out_c: usize,
        feature_c: usize,
    ) -> Result<FadeResBlock> {
        let path = path.borrow();
        let Self {
            per_channel,
            upsample,
        } = self;

        let fade_init = FadeInit {
            per_channel,
            ..Default::default()
        };

        let branch_fade_in = fade_init
            .clone()
            .build(path / "branch_fade_in", in_c, feature_c)?;
        let branch_in = FadeResInit::new(3).build(path / "branch_in", in_c, in_c)?;
        let branch_fade_out = fade_init
            .clone()
            .build(path / "branch_fade_out", in_c, feature_c)?;
        let branch_out = FadeResInit::new(3).build(path / "branch_out", in_c, out_c)?;
        let shortcut_fade = fade_init.build(path / "shortcut_fade", in_c, feature_c)?;
        let shortcut = FadeResInit::new(1).build(path / "shortcut", in_c, out_c)?;

        Ok(FadeResBlock {
            branch_fade_in,
            branch_in,
            branch_fade_out,
            branch_out,
            shortcut_fade,
            shortcut,
            upsample,
        })
    }
}

#[derive(Debug)]
pub struct FadeResBlock {
    branch_fade_in: Fade,
    branch_in: FadeRes,
    branch_fade_out: Fade,
    branch_out: FadeRes,
    shortcut_fade: Fade,
    shortcut: FadeRes,
    upsample: bool,
}

impl FadeResBlock {
    pub fn forward_t(
        &mut self,
        input: &Tensor,
        features: &FadeFeatures<'_>,
        train: bool,
    ) -> Result<Tensor> {
        let Self {
            ref mut branch_fade_in,
            ref branch_in,
            ref mut branch_fade_out,
            ref branch_out,
            ref mut shortcut_fade,
            ref shortcut,
            upsample,
        } = *self;

        let branch = branch_fade_in.forward_t(input, features, train)?;
        let branch = branch_in.forward(&branch);
        let branch = branch_fade_out.forward_t(&branch, features, train)?;
        let branch = branch_out.forward(&branch);

        let shortcut_xs = shortcut_fade.forward_t(input, features, train)?;
        let shortcut = shortcut.forward(&shortcut_xs);

        let xs = branch + shortcut;

        let output = if upsample {
            let (_, _, h, w) = xs.size4()?;
            xs.upsample_bilinear2d(&[h * 2, w * 2], false, None::<f64>, None::<f64>)
        } else {
            xs
        };

        Ok(output)
    }
}
