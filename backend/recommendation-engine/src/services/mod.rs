pub mod collaborative;
pub mod content_based;
pub mod diversity;
pub mod hybrid;
pub mod novelty;
pub mod preference;
pub mod training;

pub use collaborative::CollaborativeModel;
pub use content_based::ContentBasedModel;
pub use hybrid::{HybridEngine, RecommendError};
pub use preference::PreferenceModel;
pub use training::{TrainingOutcome, TrainingService};
