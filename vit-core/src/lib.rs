//! Native Vision Transformer image classifier.
//!
//! An image is cut into square patches, each patch is linearly embedded, a
//! learned classification token and positional embedding are added, and the
//! sequence runs through a stack of pre-norm transformer blocks. The final
//! classification-token state is projected to per-class logits.
//!
//! ```no_run
//! use ndarray::Array3;
//! use vit_core::{ViTConfig, ViTModel};
//!
//! let config = ViTConfig::from_yaml("configs/vit.yaml")?;
//! let model = ViTModel::with_seed(config, 0)?;
//! let logits = model.infer(&Array3::<f32>::zeros((3, 400, 400)))?;
//! assert_eq!(logits.len(), 6);
//! # Ok::<(), vit_core::Error>(())
//! ```

mod attention;
mod block;
mod config;
mod encoder;
mod error;
mod feed_forward;
mod head;
mod model;
pub mod nn;
mod patch;
mod position;

pub use attention::MultiHeadSelfAttention;
pub use block::TransformerBlock;
pub use config::{Activation, ModelSummary, Pool, ViTConfig};
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use feed_forward::FeedForward;
pub use head::ClassificationHead;
pub use model::{ForwardTrace, ViTModel};
pub use nn::{Mode, Parameters};
pub use patch::PatchEmbedding;
pub use position::PositionalEncoder;
