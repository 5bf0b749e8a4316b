use crate::common::*;

#[derive(Debug, Clone)]
pub struct Conv2DInit {
    pub ksize: usize,
    pub stride: usize,
    /// Zero padding on every side, `None` pads by `ksize / 2`.
    pub padding: Option<usize>,
    pub dilation: usize,
    pub groups: usize,
    pub bias: bool,
    pub ws_init: nn::Init,
    pub bs_init: nn::Init,
}

impl Conv2DInit {
    pub fn new(ksize: usize) -> Self {
        Self {
            ksize,
            stride: 1,
            padding: None,
            dilation: 1,
            groups: 1,
            bias: true,
            ws_init: nn::Init::KaimingUniform,
            bs_init: nn::Init::Const(0.0),
        }
    }

    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        in_c: usize,
        out_c: usize,
    ) -> Result<Conv2D> {
        let path = path.borrow();
        let Self {
            ksize,
            stride,
            padding,
            dilation,
            groups,
            bias,
            ws_init,
            bs_init,
        } = self;

        ensure!(ksize > 0, "ksize must be positive");
        ensure!(stride > 0, "stride must be positive");
        ensure!(dilation > 0, "dilation must be positive");
        ensure!(in_c > 0 && out_c > 0, "channels must be positive");
        ensure!(
            groups > 0 && in_c % groups == 0 && out_c % groups == 0,
            "in_c and out_c must be multiples of groups"
        );

        let padding = padding.unwrap_or(ksize / 2) as i64;
        let ksize = ksize as i64;
        let in_c = in_c as i64;
        let out_c = out_c as i64;
        let groups = groups as i64;

        let bias = bias.then(|| path.var("bias", &[out_c], bs_init));
        let weight = path.var("weight", &[out_c, in_c / groups, ksize, ksize], ws_init);

        Ok(Conv2D {
            stride: [stride as i64; 2],
            padding: [padding; 2],
            dilation: [dilation as i64; 2],
            groups,
            weight,
            bias,
        })
    }
}

#[derive(Debug)]
pub struct Conv2D {
    stride: [i64; 2],
    padding: [i64; 2],
    dilation: [i64; 2],
    groups: i64,
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Conv2D {
    pub fn set_trainable(&self, trainable: bool) {
        let Self { weight, bias, .. } = self;
        let _ = weight.set_requires_grad(trainable);
        if let Some(bias) = bias {
            let _ = bias.set_requires_grad(trainable);
        }
    }

    pub fn in_channels(&self) -> i64 {
        self.weight.size()[1] * self.groups
    }

    pub fn out_channels(&self) -> i64 {
        self.weight.size()[0]
    }
}

impl nn::Module for Conv2D {
    fn forward(&self, input: &Tensor) -> Tensor {
        let Self {
            ref stride,
            ref padding,
            ref dilation,
            groups,
            ref weight,
            ref bias,
        } = *self;

        input.conv2d(weight, bias.as_ref(), stride, padding, dilation, groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv2d_same_padding_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let conv = Conv2DInit::new(3).build(&root / "conv3", 4, 6)?;
        ensure!(conv.in_channels() == 4 && conv.out_channels() == 6);

        let input = Tensor::rand(&[2, 4, 11, 13], FLOAT_CPU);
        let output = conv.forward(&input);
        ensure!(
            output.size() == vec![2, 6, 11, 13],
            "incorrect output shape"
        );

        let strided = Conv2DInit {
            stride: 2,
            padding: Some(0),
            ..Conv2DInit::new(1)
        }
        .build(&root / "strided", 4, 4)?;
        ensure!(strided.forward(&input).size() == vec![2, 4, 6, 7]);

        Ok(())
    }

    #[test]
    fn conv2d_set_trainable_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let conv = Conv2DInit::new(1).build(&vs.root(), 2, 2)?;

        conv.set_trainable(false);
        ensure!(vs.trainable_variables().iter().all(|var| !var.requires_grad()));
        conv.set_trainable(true);
        ensure!(vs.trainable_variables().iter().all(|var| var.requires_grad()));

        Ok(())
    }

    #[test]
    fn conv2d_invalid_groups_test() {
        let vs = nn::VarStore::new(Device::Cpu);
        let result = Conv2DInit {
            groups: 3,
            ..Conv2DInit::new(3)
        }
        .build(&vs.root(), 4, 6);
        assert!(result.is_err());
    }
}
