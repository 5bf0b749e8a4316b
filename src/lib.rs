pub mod common;
pub mod config;
pub mod model;

pub(crate) const FILE_STRFTIME: &str = "%Y-%m-%d-%H-%M-%S.%3f%z";

use crate::{common::*, model::Translator};
use chrono::Local;
use std::time::Instant;

/// Builds the translator described by the config and runs it on random
/// content and style batches.
pub fn start(config: config::Config) -> Result<()> {
    let config::Config { model, run } = config;
    let config::Run {
        device,
        batch_size,
        content_size: [content_h, content_w],
        style_size: [style_h, style_w],
        steps,
        train,
        seed,
        output_dir,
    } = run;

    let seed = seed.unwrap_or_else(rand::random);
    tch::manual_seed(seed);
    info!("using device {:?}, seed = {}", device, seed);

    let vs = nn::VarStore::new(device);
    let mut translator = model.translator_init().build(&vs.root() / "translator")?;
    info!(
        "translator has {} levels, {} trainable tensors",
        translator.num_levels(),
        vs.trainable_variables().len()
    );

    let content_shape = [
        batch_size.get() as i64,
        model.input_channels.get() as i64,
        content_h.get() as i64,
        content_w.get() as i64,
    ];
    let style_shape = [
        batch_size.get() as i64,
        model.input_channels.get() as i64,
        style_h.get() as i64,
        style_w.get() as i64,
    ];

    for step in 0..steps.get() {
        let since = Instant::now();
        let output = run_step(&mut translator, &content_shape, &style_shape, device, train)?;
        info!(
            "step {}: output shape = {:?}, elapsed = {:?}",
            step,
            output.size(),
            since.elapsed()
        );
    }

    if let Some(output_dir) = output_dir {
        fs::create_dir_all(&output_dir)?;
        let path = output_dir.join(format!(
            "translator_{}.ot",
            Local::now().format(FILE_STRFTIME)
        ));
        vs.save(&path)
            .with_context(|| format!("unable to save weights to {}", path.display()))?;
        info!("weights saved to {}", path.display());
    }

    Ok(())
}

fn run_step(
    translator: &mut Translator,
    content_shape: &[i64],
    style_shape: &[i64],
    device: Device,
    train: bool,
) -> Result<Tensor> {
    let content = Tensor::rand(content_shape, (Kind::Float, device)) * 2.0 - 1.0;
    let style = Tensor::rand(style_shape, (Kind::Float, device)) * 2.0 - 1.0;

    if train {
        let output = translator.forward_t(&content, &style, true)?;
        ensure!(
            bool::from(output.isfinite().all()),
            "non-finite values in the output"
        );
        Ok(output)
    } else {
        tch::no_grad(|| translator.forward_t(&content, &style, false))
    }
}
