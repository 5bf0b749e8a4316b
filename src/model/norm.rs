use crate::common::*;

#[cfg(debug_assertions)]
static SMALL_VAR_WARN: Once = Once::new();
#[cfg(debug_assertions)]
static SMALL_SCALING_WARN: Once = Once::new();

#[derive(Debug, Clone)]
pub struct BatchNormInit {
    pub cudnn_enabled: bool,
    pub eps: f64,
    pub momentum: f64,
    pub affine: bool,
    pub ws_init: nn::Init,
    pub bs_init: nn::Init,
    pub var_min: Option<f64>,
    pub var_max: Option<f64>,
}

impl Default for BatchNormInit {
    fn default() -> Self {
        Self {
            cudnn_enabled: true,
            eps: 1e-3,
            momentum: 0.01,
            affine: true,
            ws_init: nn::Init::Const(1.0),
            bs_init: nn::Init::Const(0.0),
            var_min: None,
            var_max: None,
        }
    }
}

impl BatchNormInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, channels: usize) -> Result<BatchNorm> {
        let path = path.borrow();
        let Self {
            cudnn_enabled,
            eps,
            momentum,
            affine,
            ws_init,
            bs_init,
            var_min,
            var_max,
        } = self;
        ensure!(channels > 0, "channels must be positive");
        ensure!(eps > 0.0, "eps must be positive");
        ensure!(
            (0.0..=1.0).contains(&momentum),
            "momentum must be in range [0, 1]"
        );
        if let (Some(min), Some(max)) = (var_min, var_max) {
            ensure!(min <= max, "var_min must not exceed var_max");
        }

        let channels = channels as i64;
        let (ws, bs) = if affine {
            (
                Some(path.var("weight", &[channels], ws_init)),
                Some(path.var("bias", &[channels], bs_init)),
            )
        } else {
            (None, None)
        };

        Ok(BatchNorm {
            channels,
            running_mean: path.zeros_no_train("running_mean", &[channels]),
            running_var: path.ones_no_train("running_var", &[channels]),
            ws,
            bs,
            cudnn_enabled,
            eps,
            momentum,
            var_min,
            var_max,
        })
    }
}

#[derive(Debug)]
pub struct BatchNorm {
    channels: i64,
    running_mean: Tensor,
    running_var: Tensor,
    ws: Option<Tensor>,
    bs: Option<Tensor>,
    cudnn_enabled: bool,
    eps: f64,
    momentum: f64,
    var_min: Option<f64>,
    var_max: Option<f64>,
}

impl BatchNorm {
    pub fn running_mean(&self) -> &Tensor {
        &self.running_mean
    }

    pub fn running_var(&self) -> &Tensor {
        &self.running_var
    }

    pub fn forward_t(&mut self, input: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            channels,
            ref running_mean,
            ref mut running_var,
            ref ws,
            ref bs,
            momentum,
            eps,
            cudnn_enabled,
            var_min,
            var_max,
        } = *self;

        ensure!(
            input.dim() == 4,
            "expected an input tensor with 4 dims, got {:?}",
            input.size()
        );
        ensure!(
            input.size()[1] == channels,
            "expect {} input channels, but get {:?}",
            channels,
            input.size()
        );

        let output = Tensor::batch_norm(
            input,
            ws.as_ref(),
            bs.as_ref(),
            Some(running_mean),
            Some(&*running_var),
            train,
            momentum,
            eps,
            cudnn_enabled,
        );

        // clip running_var
        tch::no_grad(|| match (var_min, var_max) {
            (Some(min), Some(max)) => {
                let _ = running_var.clamp_(min, max);
            }
            (None, Some(max)) => {
                let _ = running_var.clamp_max_(max);
            }
            (Some(min), None) => {
                let _ = running_var.clamp_min_(min);
            }
            (None, None) => {}
        });

        #[cfg(debug_assertions)]
        {
            let has_small_var = bool::from(running_var.abs().le(1e-15).any());
            let small_ws = ws
                .as_ref()
                .filter(|ws| bool::from(ws.abs().le(1e-15).any()));

            if has_small_var {
                SMALL_VAR_WARN.call_once(|| {
                    warn!(
                        "running variance {} is too small",
                        f64::from(running_var.abs().min())
                    );
                });
            }

            if let Some(ws) = small_ws {
                SMALL_SCALING_WARN.call_once(|| {
                    warn!("scaling factor {} is too small", f64::from(ws.abs().min()));
                });
            }
        }

        Ok(output)
    }
}

#[derive(Debug, Clone)]
pub struct InstanceNormInit {
    pub cudnn_enabled: bool,
    pub eps: f64,
    pub affine: bool,
    pub ws_init: nn::Init,
    pub bs_init: nn::Init,
}

impl Default for InstanceNormInit {
    fn default() -> Self {
        Self {
            cudnn_enabled: true,
            eps: 1e-3,
            affine: true,
            ws_init: nn::Init::Const(1.0),
            bs_init: nn::Init::Const(0.0),
        }
    }
}

impl InstanceNormInit {
    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        channels: usize,
    ) -> Result<InstanceNorm> {
        let path = path.borrow();
        let Self {
            cudnn_enabled,
            eps,
            affine,
            ws_init,
            bs_init,
        } = self;
        ensure!(channels > 0, "channels must be positive");
        ensure!(eps > 0.0, "eps must be positive");

        let channels = channels as i64;
        let (ws, bs) = if affine {
            (
                Some(path.var("weight", &[channels], ws_init)),
                Some(path.var("bias", &[channels], bs_init)),
            )
        } else {
            (None, None)
        };

        Ok(InstanceNorm {
            channels,
            ws,
            bs,
            cudnn_enabled,
            eps,
        })
    }
}

/// Instance normalization over the spatial dims of NCHW inputs.
///
/// Statistics are always taken from the input, in training and in
/// evaluation alike.
#[derive(Debug)]
pub struct InstanceNorm {
    channels: i64,
    ws: Option<Tensor>,
    bs: Option<Tensor>,
    cudnn_enabled: bool,
    eps: f64,
}

impl InstanceNorm {
    pub fn forward_t(&self, input: &Tensor, _train: bool) -> Result<Tensor> {
        let Self {
            channels,
            ref ws,
            ref bs,
            cudnn_enabled,
            eps,
        } = *self;

        ensure!(
            input.dim() == 4,
            "expected an input tensor with 4 dims, got {:?}",
            input.size()
        );
        ensure!(
            input.size()[1] == channels,
            "expect {} input channels, but get {:?}",
            channels,
            input.size()
        );

        Ok(Tensor::instance_norm(
            input,
            ws.as_ref(),
            bs.as_ref(),
            None::<&Tensor>,
            None::<&Tensor>,
            true, // use_input_stats
            0.0,  // momentum
            eps,
            cudnn_enabled,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NormKind {
    BatchNorm,
    InstanceNorm,
    None,
}

impl NormKind {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, channels: usize) -> Result<Norm> {
        let norm = match self {
            Self::BatchNorm => Norm::BatchNorm(BatchNormInit::default().build(path, channels)?),
            Self::InstanceNorm => {
                Norm::InstanceNorm(InstanceNormInit::default().build(path, channels)?)
            }
            Self::None => Norm::None,
        };
        Ok(norm)
    }
}

#[derive(Debug)]
pub enum Norm {
    BatchNorm(BatchNorm),
    InstanceNorm(InstanceNorm),
    None,
}

impl Norm {
    pub fn forward_t(&mut self, input: &Tensor, train: bool) -> Result<Tensor> {
        match self {
            Self::BatchNorm(norm) => norm.forward_t(input, train),
            Self::InstanceNorm(norm) => norm.forward_t(input, train),
            Self::None => Ok(input.shallow_clone()),
        }
    }
}
