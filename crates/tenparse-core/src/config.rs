//! Parser configuration
//!
//! [`ParserConfig`] carries every knob of a training run: the tensor shape
//! (mode, rank, optional label and lexical leaves), the optimizer, the
//! flat/tensor mixing coefficient and the warm-start decomposition settings.
//!
//! # Examples
//!
//! ```
//! use tenparse_core::{ParserConfig, TensorMode, UpdateMode};
//!
//! let config = ParserConfig::hierarchical()
//!     .rank(50)
//!     .learn_label(true)
//!     .update_mode(UpdateMode::Mira)
//!     .gamma(0.3);
//!
//! assert_eq!(config.tensor_mode, TensorMode::Hierarchical);
//! assert!(config.validate().is_ok());
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TensorError, TensorResult};

/// Default number of hashed flat arc-feature buckets
pub const DEFAULT_HASH_BUCKETS: usize = 115_911_564;

/// Shape family of the parameter tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorMode {
    /// head window × modifier window × distance (× label)
    Threeway,
    /// head × modifier × head context × modifier context × distance (× label)
    Multiway,
    /// contexts × (typology + head × modifier × typed distance), nested under labels
    Hierarchical,
    /// flat product with typed contexts, typed distance and an all-typology leaf
    ExtendedMultiway,
}

/// Online update rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateMode {
    AdaGrad,
    Mira,
}

/// Configuration for a training or parsing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Number of latent components R
    pub rank: usize,
    /// Lexical sub-components per rank (blocked dot product width)
    pub extra_rank: usize,
    pub tensor_mode: TensorMode,
    pub update_mode: UpdateMode,
    /// Add label leaves and predict labels
    pub learn_label: bool,
    /// Add head/modifier word-embedding leaves
    pub lexical: bool,
    /// Emit language-class typed copies of flat arc templates
    pub typed: bool,
    /// Mixing coefficient: `gamma·flat + (1 − gamma)·tensor`
    pub gamma: f64,
    pub ada_alpha: f64,
    pub ada_eps: f64,
    /// MIRA step clamp C
    pub mira_c: f64,
    /// Average MIRA parameters at evaluation time
    pub average: bool,
    /// Scale of the uniform random initialization
    pub init_scale: f64,
    pub seed: u64,
    /// Training epochs
    pub max_iters: usize,
    /// Sentences per optimizer step (AdaGrad only)
    pub batch_size: usize,
    /// Warm-start the tensor from a pretrained flat model
    pub pretrain: bool,
    pub pretrain_alpha: f64,
    pub pretrain_iters: usize,
    pub hash_buckets: usize,
    pub eval_with_punc: bool,
    /// Power-iteration sweep limit per rank
    pub max_decomp_iters: usize,
    /// Power-iteration convergence threshold on the monitor norm
    pub decomp_tolerance: f64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::hierarchical()
    }
}

impl ParserConfig {
    fn base(tensor_mode: TensorMode) -> Self {
        Self {
            rank: 100,
            extra_rank: 1,
            tensor_mode,
            update_mode: UpdateMode::AdaGrad,
            learn_label: false,
            lexical: false,
            typed: false,
            gamma: 1.0,
            ada_alpha: 0.001,
            ada_eps: 1e-5,
            mira_c: 1.0,
            average: true,
            init_scale: 0.01,
            seed: 0,
            max_iters: 10,
            batch_size: 1,
            pretrain: true,
            pretrain_alpha: 0.01,
            pretrain_iters: 1,
            hash_buckets: DEFAULT_HASH_BUCKETS,
            eval_with_punc: false,
            max_decomp_iters: 1000,
            decomp_tolerance: 1e-6,
        }
    }

    /// Three-way (head window, modifier window, distance) configuration
    pub fn threeway() -> Self {
        Self::base(TensorMode::Threeway)
    }

    /// Multi-way configuration with separate context leaves
    pub fn multiway() -> Self {
        Self::base(TensorMode::Multiway)
    }

    /// Hierarchical configuration with typology-aware grouping nodes
    pub fn hierarchical() -> Self {
        Self::base(TensorMode::Hierarchical)
    }

    /// Extended multi-way configuration with an all-typology leaf
    pub fn extended() -> Self {
        Self::base(TensorMode::ExtendedMultiway)
    }

    pub fn rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    pub fn extra_rank(mut self, extra_rank: usize) -> Self {
        self.extra_rank = extra_rank;
        self
    }

    pub fn tensor_mode(mut self, mode: TensorMode) -> Self {
        self.tensor_mode = mode;
        self
    }

    pub fn update_mode(mut self, mode: UpdateMode) -> Self {
        self.update_mode = mode;
        self
    }

    pub fn learn_label(mut self, learn_label: bool) -> Self {
        self.learn_label = learn_label;
        self
    }

    pub fn lexical(mut self, lexical: bool) -> Self {
        self.lexical = lexical;
        self
    }

    pub fn typed(mut self, typed: bool) -> Self {
        self.typed = typed;
        self
    }

    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the AdaGrad learning rate and epsilon
    pub fn ada_grad(mut self, alpha: f64, eps: f64) -> Self {
        self.ada_alpha = alpha;
        self.ada_eps = eps;
        self
    }

    pub fn mira_c(mut self, c: f64) -> Self {
        self.mira_c = c;
        self
    }

    pub fn average(mut self, average: bool) -> Self {
        self.average = average;
        self
    }

    pub fn init_scale(mut self, scale: f64) -> Self {
        self.init_scale = scale;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn max_iters(mut self, iters: usize) -> Self {
        self.max_iters = iters;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable flat pretraining with the given AdaGrad alpha and epoch count
    pub fn pretrain(mut self, alpha: f64, iters: usize) -> Self {
        self.pretrain = true;
        self.pretrain_alpha = alpha;
        self.pretrain_iters = iters;
        self
    }

    pub fn no_pretrain(mut self) -> Self {
        self.pretrain = false;
        self
    }

    pub fn hash_buckets(mut self, buckets: usize) -> Self {
        self.hash_buckets = buckets;
        self
    }

    pub fn eval_with_punc(mut self, with_punc: bool) -> Self {
        self.eval_with_punc = with_punc;
        self
    }

    /// Set the power-iteration limits
    pub fn decomposition(mut self, max_iters: usize, tolerance: f64) -> Self {
        self.max_decomp_iters = max_iters;
        self.decomp_tolerance = tolerance;
        self
    }

    /// Check ranges of every field
    pub fn validate(&self) -> TensorResult<()> {
        if self.rank == 0 {
            return Err(TensorError::InvalidRank(self.rank));
        }
        if self.extra_rank == 0 {
            return Err(TensorError::InvalidConfig(
                "extra_rank must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(TensorError::InvalidConfig(format!(
                "gamma must lie in [0, 1], got {}",
                self.gamma
            )));
        }
        if self.ada_alpha <= 0.0 || self.ada_eps <= 0.0 {
            return Err(TensorError::InvalidConfig(format!(
                "AdaGrad alpha and eps must be positive, got {} and {}",
                self.ada_alpha, self.ada_eps
            )));
        }
        if self.mira_c <= 0.0 {
            return Err(TensorError::InvalidConfig(format!(
                "MIRA clamp must be positive, got {}",
                self.mira_c
            )));
        }
        if self.batch_size == 0 {
            return Err(TensorError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.hash_buckets == 0 {
            return Err(TensorError::InvalidConfig(
                "hash_buckets must be at least 1".to_string(),
            ));
        }
        if self.decomp_tolerance <= 0.0 || self.max_decomp_iters == 0 {
            return Err(TensorError::InvalidConfig(
                "decomposition needs a positive tolerance and at least one sweep".to_string(),
            ));
        }
        Ok(())
    }

    /// True if the tensor contributes to arc scores at all
    pub fn uses_tensor(&self) -> bool {
        self.gamma < 1.0
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> TensorResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> TensorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> TensorResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> TensorResult<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}
