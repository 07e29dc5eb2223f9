use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use super::{compile, Vocabulary};
use crate::errors::EngineError;
use crate::executor::types::Program;

/// Compiled programs keyed by a hash of name and source text.
///
/// Re-running the same script, or loading the same file again, reuses the
/// compiled program instead of parsing it again.
#[derive(Default)]
pub struct ProgramCache {
    programs: HashMap<[u8; 32], Arc<Program>>,
}

impl ProgramCache {
    pub fn get_or_compile(
        &mut self,
        name: &str,
        source: &str,
        vocabulary: &Vocabulary,
    ) -> Result<Arc<Program>, EngineError> {
        let key = cache_key(name, source);
        if let Some(program) = self.programs.get(&key) {
            trace!(name, "program cache hit");
            return Ok(program.clone());
        }
        let program = Arc::new(compile(name, source, vocabulary)?);
        self.programs.insert(key, program.clone());
        Ok(program)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn clear(&mut self) {
        self.programs.clear();
    }
}

fn cache_key(name: &str, source: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(source.as_bytes());
    hasher.finalize().into()
}
