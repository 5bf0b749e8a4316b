//! Adaptive instance normalization.

use crate::common::*;

pub const DEFAULT_ADAIN_EPS: f64 = 1e-5;

/// Per-sample, per-channel mean and biased variance over the spatial dims.
pub fn spatial_moments(xs: &Tensor) -> Result<(Tensor, Tensor)> {
    ensure!(
        xs.dim() == 4,
        "expected an input tensor with 4 dims, got {:?}",
        xs.size()
    );

    let mean = xs.mean_dim(&[2, 3], true, xs.kind());
    let centered = xs - &mean;
    let var = (&centered * &centered).mean_dim(&[2, 3], true, xs.kind());
    Ok((mean, var))
}

/// Renormalizes `content` to the channel statistics of `style`.
///
/// The result is blended with the untouched content by `alpha`, where
/// `alpha = 1` yields the fully stylized features.
pub fn adain(content: &Tensor, style: &Tensor, alpha: f64, eps: f64) -> Result<Tensor> {
    ensure!(
        (0.0..=1.0).contains(&alpha),
        "alpha must be in range [0, 1], but get {}",
        alpha
    );
    ensure!(eps >= 0.0, "eps must be non-negative");

    let (content_b, content_c, _, _) = content.size4()?;
    let (style_b, style_c, _, _) = style.size4()?;
    ensure!(
        content_b == style_b && content_c == style_c,
        "content shape {:?} and style shape {:?} disagree in batch or channels",
        content.size(),
        style.size()
    );

    let (content_mean, content_var) = spatial_moments(content)?;
    let (style_mean, style_var) = spatial_moments(style)?;

    let normalized = (content - content_mean) * (content_var + eps).rsqrt() * style_var.sqrt()
        + style_mean;

    let output = if alpha == 1.0 {
        normalized
    } else {
        normalized * alpha + content * (1.0 - alpha)
    };

    Ok(output)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaInInit {
    pub alpha: R64,
    pub eps: R64,
}

impl Default for AdaInInit {
    fn default() -> Self {
        Self {
            alpha: r64(1.0),
            eps: r64(DEFAULT_ADAIN_EPS),
        }
    }
}

impl AdaInInit {
    pub fn build(self) -> Result<AdaIn> {
        let Self { alpha, eps } = self;
        let alpha = alpha.raw();
        let eps = eps.raw();

        ensure!(
            (0.0..=1.0).contains(&alpha),
            "alpha must be in range [0, 1], but get {}",
            alpha
        );
        ensure!(eps >= 0.0, "eps must be non-negative");

        Ok(AdaIn { alpha, eps })
    }
}

#[derive(Debug, Clone)]
pub struct AdaIn {
    alpha: f64,
    eps: f64,
}

impl AdaIn {
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn forward(&self, content: &Tensor, style: &Tensor) -> Result<Tensor> {
        adain(content, style, self.alpha, self.eps)
    }
}
