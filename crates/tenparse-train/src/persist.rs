//! Whole-model persistence
//!
//! File layout:
//!
//! ```text
//! "TNPB" | version: u32 (LE) | bincode(standard) payload of the model bundle
//! ```
//!
//! The bundle carries everything parsing needs without the training corpus:
//! the configuration, both alphabets, the typology table and embeddings when
//! present, the flat weights with their code set, and the parameter tree in
//! its own "TNPM" snapshot.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tenparse_core::{ParameterNode, ParserConfig};
use tenparse_features::{Embeddings, FeatureEncoder, Typology, Vocabulary};

use crate::flat::FlatModel;
use crate::model::Model;

const MAGIC: &[u8; 4] = b"TNPB";
const VERSION: u32 = 1;

#[derive(Serialize)]
struct BundleRef<'a> {
    config: &'a ParserConfig,
    vocab: &'a Vocabulary,
    typology: Option<&'a Typology>,
    embeddings: Option<&'a Embeddings>,
    flat: &'a FlatModel,
    tree: Vec<u8>,
}

#[derive(Deserialize)]
struct Bundle {
    config: ParserConfig,
    vocab: Vocabulary,
    typology: Option<Typology>,
    embeddings: Option<Embeddings>,
    flat: FlatModel,
    tree: Vec<u8>,
}

impl Model {
    /// Serialize the complete model into `writer`
    pub fn save_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let bundle = BundleRef {
            config: &self.config,
            vocab: self.encoder.vocab(),
            typology: self.encoder.typology(),
            embeddings: self.encoder.embeddings(),
            flat: &self.flat,
            tree: self.tree.to_bytes()?,
        };
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        bincode::serde::encode_into_std_write(&bundle, &mut writer, bincode::config::standard())
            .context("encoding model bundle")?;
        writer.flush()?;
        Ok(())
    }

    /// Deserialize a model written by [`save_to`](Self::save_to).
    ///
    /// The feature encoder is rebuilt from the stored alphabets and the tree
    /// is checked against its widths before the model is returned.
    pub fn load_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).context("reading model header")?;
        if &magic != MAGIC {
            bail!("not a model file: invalid magic bytes");
        }
        let mut version = [0u8; 4];
        reader.read_exact(&mut version)?;
        let version = u32::from_le_bytes(version);
        if version != VERSION {
            bail!("unsupported model version: {}", version);
        }

        let bundle: Bundle = bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
            .context("decoding model bundle")?;
        let Bundle {
            config,
            mut vocab,
            typology,
            embeddings,
            flat,
            tree,
        } = bundle;
        config.validate().context("stored configuration is invalid")?;
        ensure!(
            flat.buckets() == config.hash_buckets,
            "flat model has {} buckets, configuration says {}",
            flat.buckets(),
            config.hash_buckets
        );

        vocab.reindex();
        let encoder = FeatureEncoder::new(&config, vocab, typology, embeddings)?;
        let tree = ParameterNode::from_bytes(&tree)?;
        encoder
            .check_tree(&tree)
            .context("stored tree does not match the stored alphabets")?;

        log::info!(
            "loaded {:?} model: {} nodes, {} tags, {} labels, {} weighted buckets",
            config.tensor_mode,
            tree.node_count(),
            encoder.dims().tags,
            encoder.dims().labels,
            flat.touched()
        );
        Ok(Self {
            config,
            encoder,
            tree,
            flat,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.save_to(&mut out)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::load_from(bytes)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        self.save_to(BufWriter::new(file))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::load_from(BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenparse_features::Sentence;

    fn model() -> Model {
        let corpus = vec![Sentence::from_tokens(
            "en",
            &[("dogs", "NOUN", 2, "nsubj"), ("bark", "VERB", 0, "root")],
        )];
        let config = ParserConfig::threeway().rank(2).learn_label(true).hash_buckets(1 << 12);
        Model::build(config, &corpus, None, None).unwrap().0
    }

    #[test]
    fn test_bundle_restores_every_part() {
        let original = model();
        let loaded = Model::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(loaded.config, original.config);
        assert_eq!(loaded.tree, original.tree);
        assert_eq!(loaded.flat, original.flat);
        assert_eq!(loaded.encoder.vocab(), original.encoder.vocab());
        assert_eq!(loaded.encoder.vocab().labels.get("nsubj"), original.encoder.vocab().labels.get("nsubj"));
    }

    #[test]
    fn test_rejects_tree_snapshot() {
        let bytes = model().tree.to_bytes().unwrap();
        assert!(Model::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_rejects_truncated_bundle() {
        let bytes = model().to_bytes().unwrap();
        assert!(Model::from_bytes(&bytes[..bytes.len() / 2]).is_err());
    }
}
