//! Decoders that rebuild fitted transformers from persisted artifacts.
//!
//! Loading a [`PipelineModel`](crate::model::PipelineModel) never re-fits:
//! each artifact is handed to the decoder registered for its `kind`. The
//! built-in stages are registered by [`StageRegistry::builtin`]; custom stages
//! can be added with [`StageRegistry::register`].

use crate::classification::GradientBoostedModel;
use crate::error::{Error, Result};
use crate::features::{
    Binarizer, ColumnSelector, CountVectorizerModel, IdfModel, RegexTokenizer, RowFilter,
    SeasonBucketizer, StopWordsRemover, Tokenizer,
};
use crate::stage::Transformer;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Decoder = Arc<dyn Fn(Json) -> Result<Arc<dyn Transformer>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct StageRegistry {
    decoders: HashMap<String, Decoder>,
}

impl StageRegistry {
    /// A registry with no decoders.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry that knows every stage shipped with this crate.
    pub fn builtin() -> Self {
        let mut r = Self::empty();
        r.register::<Tokenizer>(Tokenizer::KIND);
        r.register::<RegexTokenizer>(RegexTokenizer::KIND);
        r.register::<StopWordsRemover>(StopWordsRemover::KIND);
        r.register::<CountVectorizerModel>(CountVectorizerModel::KIND);
        r.register::<IdfModel>(IdfModel::KIND);
        r.register::<Binarizer>(Binarizer::KIND);
        r.register::<SeasonBucketizer>(SeasonBucketizer::KIND);
        r.register::<ColumnSelector>(ColumnSelector::KIND);
        r.register::<RowFilter>(RowFilter::KIND);
        r.register::<GradientBoostedModel>(GradientBoostedModel::KIND);
        r
    }

    /// Decode artifacts of `kind` by deserializing them into `T`.
    pub fn register<T>(&mut self, kind: &str)
    where
        T: Transformer + DeserializeOwned + 'static,
    {
        self.register_fn(kind, |artifact| {
            let t: T = serde_json::from_value(artifact)?;
            Ok(Arc::new(t) as Arc<dyn Transformer>)
        });
    }

    /// Decode artifacts of `kind` with a custom function.
    pub fn register_fn<F>(&mut self, kind: &str, decode: F)
    where
        F: Fn(Json) -> Result<Arc<dyn Transformer>> + Send + Sync + 'static,
    {
        self.decoders.insert(kind.to_string(), Arc::new(decode));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    pub fn decode(&self, kind: &str, artifact: Json) -> Result<Arc<dyn Transformer>> {
        let decoder = self
            .decoders
            .get(kind)
            .ok_or_else(|| Error::InvalidData(format!("no decoder registered for stage kind `{kind}`")))?;
        decoder(artifact)
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().collect();
        kinds.sort();
        f.debug_struct("StageRegistry").field("kinds", &kinds).finish()
    }
}
