use crate::{
    common::*,
    model::{AdaInInit, NormKind, TranslatorInit, DEFAULT_ADAIN_EPS, DEFAULT_BICUBIC_A},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: Model,
    pub run: Run,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config: Self = json5::from_str(&text)
            .with_context(|| format!("unable to parse config file {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub input_channels: NonZeroUsize,
    pub output_channels: NonZeroUsize,
    pub channels: Vec<NonZeroUsize>,
    #[serde(default = "default_bicubic_a")]
    pub bicubic_a: R64,
    #[serde(default = "default_norm_kind")]
    pub norm_kind: NormKind,
    #[serde(default)]
    pub per_channel: bool,
    #[serde(default = "default_alpha")]
    pub alpha: R64,
    #[serde(default = "default_eps")]
    pub eps: R64,
}

impl Model {
    pub fn translator_init(&self) -> TranslatorInit {
        let Self {
            input_channels,
            output_channels,
            ref channels,
            bicubic_a,
            norm_kind,
            per_channel,
            alpha,
            eps,
        } = *self;

        TranslatorInit {
            input_channels: input_channels.get(),
            output_channels: output_channels.get(),
            channels: channels.iter().map(|channels| channels.get()).collect(),
            bicubic_a: bicubic_a.raw(),
            norm_kind,
            per_channel,
            adain: AdaInInit { alpha, eps },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    #[serde(with = "tch_serde::serde_device")]
    pub device: Device,
    pub batch_size: NonZeroUsize,
    pub content_size: [NonZeroUsize; 2],
    pub style_size: [NonZeroUsize; 2],
    pub steps: NonZeroUsize,
    #[serde(default)]
    pub train: bool,
    pub seed: Option<i64>,
    pub output_dir: Option<PathBuf>,
}

fn default_bicubic_a() -> R64 {
    r64(DEFAULT_BICUBIC_A)
}

fn default_norm_kind() -> NormKind {
    NormKind::InstanceNorm
}

fn default_alpha() -> R64 {
    r64(1.0)
}

fn default_eps() -> R64 {
    r64(DEFAULT_ADAIN_EPS)
}
