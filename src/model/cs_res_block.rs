use super::{
    activation::{leaky_relu, DEFAULT_LEAKY_SLOPE},
    bicubic::{BicubicDownsample, BicubicFilterInit, DEFAULT_BICUBIC_A},
    conv::{Conv2D, Conv2DInit},
    norm::{Norm, NormKind},
};
use crate::common::*;

/// Convolution, normalization and leaky ReLU.
#[derive(Debug, Clone)]
pub struct CsResInit {
    pub ksize: usize,
    pub norm_kind: NormKind,
    pub slope: f64,
}

impl CsResInit {
    pub fn new(ksize: usize) -> Self {
        Self {
            ksize,
            norm_kind: NormKind::InstanceNorm,
            slope: DEFAULT_LEAKY_SLOPE,
        }
    }

    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        in_c: usize,
        out_c: usize,
    ) -> Result<CsRes> {
        let path = path.borrow();
        let Self {
            ksize,
            norm_kind,
            slope,
        } = self;

        let conv = Conv2DInit::new(ksize).build(path / "conv", in_c, out_c)?;
        let norm = norm_kind.build(path / "norm", out_c)?;

        Ok(CsRes { conv, norm, slope })
    }
}

#[derive(Debug)]
pub struct CsRes {
    conv: Conv2D,
    norm: Norm,
    slope: f64,
}

impl CsRes {
    pub fn forward_t(&mut self, input: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            ref conv,
            ref mut norm,
            slope,
        } = *self;

        let xs = conv.forward(input);
        let xs = norm.forward_t(&xs, train)?;
        Ok(leaky_relu(&xs, slope))
    }
}

/// Residual block of the content and style streams.
///
/// The input is bicubic-downsampled first. The residual branch runs two 3x3
/// [CsRes] layers and the shortcut a single 1x1 [CsRes] layer.
#[derive(Debug, Clone)]
pub struct CsResBlockInit {
    pub downsample_factor: usize,
    pub bicubic_a: f64,
    pub norm_kind: NormKind,
}

impl Default for CsResBlockInit {
    fn default() -> Self {
        Self {
            downsample_factor: 2,
            bicubic_a: DEFAULT_BICUBIC_A,
            norm_kind: NormKind::InstanceNorm,
        }
    }
}

impl CsResBlockInit {
    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        in_c: usize,
        out_c: usize,
    ) -> Result<CsResBlock> {
        let path = path.borrow();
        let Self {
            downsample_factor,
            bicubic_a,
            norm_kind,
        } = self;

        let downsample = BicubicFilterInit {
            factor: downsample_factor,
            channels: in_c,
            a: bicubic_a,
        }
        .build(path / "downsample")?;

        let branch_in = CsResInit {
            norm_kind,
            ..CsResInit::new(3)
        }
        .build(path / "branch_in", in_c, in_c)?;
        let branch_out = CsResInit {
            norm_kind,
            ..CsResInit::new(3)
        }
        .build(path / "branch_out", in_c, out_c)?;
        let shortcut = CsResInit {
            norm_kind,
            ..CsResInit::new(1)
        }
        .build(path / "shortcut", in_c, out_c)?;

        Ok(CsResBlock {
            downsample,
            branch_in,
            branch_out,
            shortcut,
        })
    }
}

#[derive(Debug)]
pub struct CsResBlock {
    downsample: BicubicDownsample,
    branch_in: CsRes,
    branch_out: CsRes,
    shortcut: CsRes,
}

impl CsResBlock {
    pub fn downsample_factor(&self) -> usize {
        self.downsample.factor()
    }

    pub fn forward_t(&mut self, input: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            ref downsample,
            ref mut branch_in,
            ref mut branch_out,
            ref mut shortcut,
        } = *self;

        let xs = downsample
            .f_forward(input)
            .context("bicubic downsampling failed")?;

        let branch = branch_in.forward_t(&xs, train)?;
        let branch = branch_out.forward_t(&branch, train)?;
        let shortcut = shortcut.forward_t(&xs, train)?;

        Ok(branch + shortcut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cs_res_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let mut layer = CsResInit::new(3).build(&vs.root(), 3, 5)?;

        let input = Tensor::randn(&[2, 3, 10, 10], FLOAT_CPU);
        let output = layer.forward_t(&input, true)?;
        ensure!(output.size() == vec![2, 5, 10, 10], "incorrect output shape");

        // zero-mean normalized maps have a positive mean after leaky ReLU
        let min_mean: f64 = output
            .mean_dim(&[2, 3], false, Kind::Float)
            .min()
            .into();
        ensure!(min_mean > 0.0, "unexpected channel mean {}", min_mean);

        Ok(())
    }

    #[test]
    fn cs_res_block_test() -> Result<()> {
        let bs = 2;
        let in_c = 3;
        let out_c = 8;

        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let mut block = CsResBlockInit::default().build(&root / "block", in_c, out_c)?;
        ensure!(block.downsample_factor() == 2);

        let input = Tensor::rand(&[bs, in_c as i64, 16, 24], FLOAT_CPU);
        let output = block.forward_t(&input, true)?;
        ensure!(
            output.size() == vec![bs, out_c as i64, 8, 12],
            "incorrect output shape {:?}",
            output.size()
        );

        // the bicubic filter is a buffer, the rest is trainable
        let num_trainable = vs.trainable_variables().len();
        ensure!(
            num_trainable == 3 * 4,
            "expect 12 trainable variables, get {}",
            num_trainable
        );

        Ok(())
    }

    #[test]
    fn cs_res_block_factor_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);

        let mut block = CsResBlockInit {
            downsample_factor: 4,
            ..Default::default()
        }
        .build(&vs.root(), 2, 4)?;

        let input = Tensor::rand(&[1, 2, 32, 32], FLOAT_CPU);
        let output = block.forward_t(&input, false)?;
        ensure!(output.size() == vec![1, 4, 8, 8], "incorrect output shape");

        let wrong_channels = Tensor::rand(&[1, 3, 32, 32], FLOAT_CPU);
        ensure!(block.forward_t(&wrong_channels, false).is_err());

        Ok(())
    }
}
