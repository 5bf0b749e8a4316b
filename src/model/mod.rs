mod activation;
mod adain;
mod bicubic;
mod conv;
mod cs_res_block;
mod fade;
mod fade_res_block;
mod norm;
mod translator;

pub use activation::*;
pub use adain::*;
pub use bicubic::*;
pub use conv::*;
pub use cs_res_block::*;
pub use fade::*;
pub use fade_res_block::*;
pub use norm::*;
pub use translator::*;
