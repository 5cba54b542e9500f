// data module
pub mod data {
    pub mod timeseries;
    pub mod firings;
    pub mod templates;
}

// algorithm module
pub mod algorithm {
    pub mod score;
    pub mod selector;
    pub mod kernel;
    pub mod shells;
    pub mod template_provider;
}

// fit stage module
pub mod fit {
    pub mod options;
    pub mod progress;
    pub mod driver;
    pub mod stage;
}

pub mod error;

// Re-export commonly used types
pub use error::FitError;
pub use fit::options::FitOptions;
pub use fit::stage::{fit_stage, FitStageOutput, FitSummary};
