//! Memory store implementations for agentloop.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::{FileExperienceStore, FileMemoryStore};
pub use in_memory::{InMemoryExperienceStore, InMemoryMemoryStore};

use agentloop_config::MemoryConfig;
use agentloop_core::memory::{ExperienceStore, MemoryStore};
use std::sync::Arc;

/// The pair of stores a session reads from and consolidates into.
#[derive(Clone)]
pub struct Stores {
    pub memory: Arc<dyn MemoryStore>,
    pub experience: Arc<dyn ExperienceStore>,
}

/// Build the stores selected by `[memory] backend`.
pub fn open_stores(config: &MemoryConfig) -> Stores {
    match config.backend.as_str() {
        "in_memory" => Stores {
            memory: Arc::new(InMemoryMemoryStore::new()),
            experience: Arc::new(InMemoryExperienceStore::with_cap(config.experience_cap)),
        },
        _ => {
            let dir = config.resolved_dir();
            tracing::debug!(dir = %dir.display(), "Opening file memory stores");
            Stores {
                memory: Arc::new(FileMemoryStore::in_dir(&dir)),
                experience: Arc::new(FileExperienceStore::new(
                    dir.join(file_backend::EXPERIENCE_FILE),
                    config.experience_cap,
                )),
            }
        }
    }
}
