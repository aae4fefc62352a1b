//! ComfyUI text-to-image workflow graph.
//!
//! ComfyUI's `/prompt` endpoint takes an API-format graph: a map of node id
//! to `{class_type, inputs}`, where a link to another node's output is the
//! pair `[node_id, output_index]`.  The graph here is the stock txt2img
//! pipeline:
//!
//! ```text
//! 4 CheckpointLoaderSimple ─┬─ model ─────────────┐
//!                           ├─ clip ─ 6 positive ─┤
//!                           ├─ clip ─ 7 negative ─┼─ 3 KSampler ─ 8 VAEDecode ─ 9 SaveImage
//! 5 EmptyLatentImage ───────┼─────────────────────┘       │
//!                           └─ vae ───────────────────────┘
//! ```

use serde_json::{Value, json};

use crate::config::ImageConfig;

/// Node whose outputs hold the finished image in `/history`.
pub const OUTPUT_NODE: &str = "9";

const FILENAME_PREFIX: &str = "ComfyUI";

/// Sampling parameters for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowParams {
    pub checkpoint: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg: f32,
    pub seed: u64,
    pub negative_prompt: String,
}

impl From<&ImageConfig> for WorkflowParams {
    fn from(c: &ImageConfig) -> Self {
        Self {
            checkpoint: c.checkpoint.clone(),
            width: c.width,
            height: c.height,
            steps: c.steps,
            cfg: c.cfg,
            seed: c.seed,
            negative_prompt: c.negative_prompt.clone(),
        }
    }
}

/// Build the API-format graph for `prompt`.
pub fn build(prompt: &str, params: &WorkflowParams) -> Value {
    json!({
        "3": {
            "class_type": "KSampler",
            "inputs": {
                "seed": params.seed,
                "steps": params.steps,
                "cfg": params.cfg,
                "sampler_name": "euler",
                "scheduler": "normal",
                "denoise": 1,
                "model": ["4", 0],
                "positive": ["6", 0],
                "negative": ["7", 0],
                "latent_image": ["5", 0]
            }
        },
        "4": {
            "class_type": "CheckpointLoaderSimple",
            "inputs": { "ckpt_name": params.checkpoint }
        },
        "5": {
            "class_type": "EmptyLatentImage",
            "inputs": { "width": params.width, "height": params.height, "batch_size": 1 }
        },
        "6": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": prompt, "clip": ["4", 1] }
        },
        "7": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": params.negative_prompt, "clip": ["4", 1] }
        },
        "8": {
            "class_type": "VAEDecode",
            "inputs": { "samples": ["3", 0], "vae": ["4", 2] }
        },
        OUTPUT_NODE: {
            "class_type": "SaveImage",
            "inputs": { "filename_prefix": FILENAME_PREFIX, "images": ["8", 0] }
        }
    })
}
