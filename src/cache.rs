use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::assets::AssetLoader;
use crate::ast::Ast;
use crate::error::Result;
use crate::parser::{ConditionGrammar, Parser};

/// Parsed node sources keyed by asset path.
///
/// Owned by the caller and shared by reference; safe to use from several
/// threads. Only successful parses are stored. Two threads missing on the
/// same path may both parse it; the first insert wins.
#[derive(Debug, Default)]
pub struct AstCache {
    entries: Mutex<HashMap<String, Arc<Ast>>>,
}

impl AstCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Arc<Ast>> {
        self.lock().get(path).cloned()
    }

    /// Cached tree for `path`, loading and parsing it on a miss.
    pub fn get_or_parse(
        &self,
        path: &str,
        loader: &dyn AssetLoader,
        grammar: ConditionGrammar,
    ) -> Result<Arc<Ast>> {
        if let Some(ast) = self.get(path) {
            return Ok(ast);
        }
        let ast = Arc::new(load_and_parse(path, loader, grammar)?);
        let mut entries = self.lock();
        Ok(entries.entry(path.to_string()).or_insert(ast).clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().contains_key(path)
    }

    pub fn invalidate(&self, path: &str) -> bool {
        self.lock().remove(path).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Ast>>> {
        // Entries are immutable once inserted, so a poisoned map is still
        // consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Load `path` through `loader` and parse it, bypassing any cache.
pub fn load_and_parse(path: &str, loader: &dyn AssetLoader, grammar: ConditionGrammar) -> Result<Ast> {
    let source = loader.load_text(path)?;
    log::debug!("parsing {path} ({} bytes)", source.len());
    Parser::new(path, &source, grammar).parse()
}
