use super::{
    adain::{AdaIn, AdaInInit},
    bicubic::DEFAULT_BICUBIC_A,
    conv::{Conv2D, Conv2DInit},
    cs_res_block::{CsResBlock, CsResBlockInit},
    fade::FadeFeatures,
    fade_res_block::{FadeResBlock, FadeResBlockInit},
    norm::NormKind,
};
use crate::common::*;

/// Every stream level halves the resolution, every decoder level doubles it.
const LEVEL_SCALE: i64 = 2;

#[derive(Debug, Clone)]
pub struct TranslatorInit {
    pub input_channels: usize,
    pub output_channels: usize,
    pub channels: Vec<usize>,
    pub bicubic_a: f64,
    pub norm_kind: NormKind,
    pub per_channel: bool,
    pub adain: AdaInInit,
}

impl Default for TranslatorInit {
    fn default() -> Self {
        Self {
            input_channels: 3,
            output_channels: 3,
            channels: vec![32, 64, 128],
            bicubic_a: DEFAULT_BICUBIC_A,
            norm_kind: NormKind::InstanceNorm,
            per_channel: false,
            adain: Default::default(),
        }
    }
}

impl TranslatorInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>) -> Result<Translator> {
        let path = path.borrow();
        let Self {
            input_channels,
            output_channels,
            channels,
            bicubic_a,
            norm_kind,
            per_channel,
            adain,
        } = self;

        ensure!(!channels.is_empty(), "zero depth is not allowed");
        ensure!(
            input_channels > 0 && output_channels > 0 && channels.iter().all(|&c| c > 0),
            "channels must be positive"
        );
        let first_channels = channels[0];

        let stream_init = CsResBlockInit {
            downsample_factor: LEVEL_SCALE as usize,
            bicubic_a,
            norm_kind,
        };
        let build_stream = |name: &str| -> Result<Vec<CsResBlock>> {
            izip!(
                iter::once(input_channels).chain(channels.iter().cloned()),
                channels.iter().cloned()
            )
            .enumerate()
            .map(|(index, (in_c, out_c))| {
                stream_init
                    .clone()
                    .build(path.sub(name).sub(format!("block_{}", index)), in_c, out_c)
            })
            .try_collect()
        };

        let content_stream = build_stream("content_stream")?;
        let style_stream = build_stream("style_stream")?;

        // decoder levels mirror the stream levels, deepest first
        let decoder: Vec<_> = izip!(
            channels.iter().cloned().rev(),
            channels
                .iter()
                .cloned()
                .rev()
                .skip(1)
                .chain(iter::once(first_channels)),
        )
        .enumerate()
        .map(|(index, (in_c, out_c))| {
            FadeResBlockInit {
                per_channel,
                upsample: true,
            }
            .build(
                path.sub("decoder").sub(format!("block_{}", index)),
                in_c,
                out_c,
                in_c,
            )
        })
        .try_collect()?;

        let last_conv = Conv2DInit::new(1).build(path / "last_conv", first_channels, output_channels)?;
        let adain = adain.build()?;

        debug!(
            "built translator with {} levels, channels = {:?}",
            channels.len(),
            channels
        );

        Ok(Translator {
            input_channels: input_channels as i64,
            content_stream,
            style_stream,
            decoder,
            adain,
            last_conv,
        })
    }
}

#[derive(Debug)]
pub struct Translator {
    input_channels: i64,
    content_stream: Vec<CsResBlock>,
    style_stream: Vec<CsResBlock>,
    decoder: Vec<FadeResBlock>,
    adain: AdaIn,
    last_conv: Conv2D,
}

impl Translator {
    pub fn num_levels(&self) -> usize {
        self.decoder.len()
    }

    /// Image sides must be divisible by this number.
    pub fn size_divisor(&self) -> i64 {
        LEVEL_SCALE.pow(self.num_levels() as u32)
    }

    pub fn forward_t(&mut self, content: &Tensor, style: &Tensor, train: bool) -> Result<Tensor> {
        let divisor = self.size_divisor();
        let Self {
            input_channels,
            ref mut content_stream,
            ref mut style_stream,
            ref mut decoder,
            ref adain,
            ref last_conv,
        } = *self;

        let (content_b, content_c, content_h, content_w) = content.size4()?;
        let (style_b, style_c, _, _) = style.size4()?;
        ensure!(
            content_c == input_channels && style_c == input_channels,
            "expect {} input channels, but get content {} and style {}",
            input_channels,
            content_c,
            style_c
        );
        ensure!(
            content_b == style_b,
            "content batch size {} does not match style batch size {}",
            content_b,
            style_b
        );
        ensure!(
            content_h % divisor == 0 && content_w % divisor == 0,
            "content size {}x{} is not divisible by {}",
            content_h,
            content_w,
            divisor
        );

        let content_features = encode(content_stream, content, train).context("content stream")?;
        let style_features = encode(style_stream, style, train).context("style stream")?;

        let fused_features: Vec<_> = izip!(&content_features, &style_features)
            .map(|(content, style)| adain.forward(content, style))
            .try_collect()?;

        let top = match fused_features.last() {
            Some(top) => top.shallow_clone(),
            None => bail!("translator has no levels"),
        };

        let xs = izip!(
            decoder.iter_mut(),
            content_features.iter().rev(),
            fused_features.iter().rev()
        )
        .try_fold(top, |xs, (block, content, fused)| -> Result<_> {
            let features = FadeFeatures {
                scale: content,
                shift: fused,
            };
            block.forward_t(&xs, &features, train)
        })?;

        Ok(last_conv.forward(&xs).tanh())
    }
}

/// Runs a stream and collects the output of every level.
fn encode(stream: &mut [CsResBlock], input: &Tensor, train: bool) -> Result<Vec<Tensor>> {
    let mut features = Vec::with_capacity(stream.len());
    let mut xs = input.shallow_clone();

    for (index, block) in stream.iter_mut().enumerate() {
        xs = block
            .forward_t(&xs, train)
            .with_context(|| format!("level {} failed", index))?;
        features.push(xs.shallow_clone());
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translator_test() -> Result<()> {
        let bs = 2;
        let cx = 3;
        let cy = 2;

        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let mut translator = TranslatorInit {
            input_channels: cx,
            output_channels: cy,
            channels: vec![8, 16],
            ..Default::default()
        }
        .build(&root / "translator")?;
        ensure!(translator.num_levels() == 2 && translator.size_divisor() == 4);

        let content = Tensor::rand(&[bs, cx as i64, 16, 20], FLOAT_CPU);
        let style = Tensor::rand(&[bs, cx as i64, 24, 24], FLOAT_CPU);
        let output = translator.forward_t(&content, &style, true)?;

        ensure!(
            output.size() == vec![bs, cy as i64, 16, 20],
            "incorrect output shape {:?}",
            output.size()
        );

        let max: f64 = output.abs().max().into();
        ensure!(max <= 1.0, "output exceeds the tanh range");

        let eval_output = translator.forward_t(&content, &style, false)?;
        ensure!(eval_output.size() == output.size());

        Ok(())
    }

    #[test]
    fn translator_backward_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let mut translator = TranslatorInit {
            channels: vec![4],
            ..Default::default()
        }
        .build(&vs.root())?;

        let content = Tensor::rand(&[2, 3, 8, 8], FLOAT_CPU);
        let style = Tensor::rand(&[2, 3, 8, 8], FLOAT_CPU);
        let output = translator.forward_t(&content, &style, true)?;
        output.mean(Kind::Float).backward();

        let num_with_grad = vs
            .trainable_variables()
            .iter()
            .filter(|var| var.grad().defined())
            .count();
        ensure!(num_with_grad > 0, "no gradient reaches the parameters");

        Ok(())
    }

    #[test]
    fn translator_invalid_input_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let mut translator = TranslatorInit {
            channels: vec![4, 8],
            ..Default::default()
        }
        .build(&vs.root())?;

        let style = Tensor::rand(&[1, 3, 16, 16], FLOAT_CPU);
        let odd_content = Tensor::rand(&[1, 3, 18, 16], FLOAT_CPU);
        ensure!(translator.forward_t(&odd_content, &style, true).is_err());

        let gray_content = Tensor::rand(&[1, 1, 16, 16], FLOAT_CPU);
        ensure!(translator.forward_t(&gray_content, &style, true).is_err());

        let batch_mismatch = Tensor::rand(&[2, 3, 16, 16], FLOAT_CPU);
        ensure!(translator.forward_t(&batch_mismatch, &style, true).is_err());

        ensure!(TranslatorInit {
            channels: vec![],
            ..Default::default()
        }
        .build(&vs.root() / "empty")
        .is_err());

        Ok(())
    }
}
