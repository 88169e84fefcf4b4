pub mod hosting_repository;
pub mod openai_synthesis_backend;
pub mod piper_synthesis_backend;
pub mod synthesis_backend;

pub use hosting_repository::{artifact_name, HostingRepository, StorageError};
pub use openai_synthesis_backend::{OpenAiSynthesisBackend, RemoteLimits};
pub use piper_synthesis_backend::{PiperSynthesisBackend, PiperVoice};
pub use synthesis_backend::{SynthesisBackend, SynthesisError};
