//! CiteForge Context Engine
//!
//! Assembles a cited, priority-ordered context for one user message:
//! - Query enhancement into a fixed number of search variants
//! - Source-type classification of retrieved passages
//! - Citation numbering and context rendering
//! - Progress reporting while a request runs

pub mod assembler;
pub mod classifier;
pub mod engine;
pub mod enhancer;
pub mod progress;

pub use assembler::CitationAssembler;
pub use classifier::SourceClassifier;
pub use engine::{ContextEngine, SearchOutcome};
pub use enhancer::{EnhancementGateway, HttpEnhancementGateway, QueryEnhancer};
pub use progress::{PipelineStage, ProgressEvent, ProgressObserver, ProgressUpdate};
