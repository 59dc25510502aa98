// Scoring-core modules and shared errors/models
pub mod encoder {
    pub use crate::encoder::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod scoring {
    pub use crate::scoring::*;
}

pub mod simulation {
    pub use crate::simulation::*;
}

pub mod errors {
    pub use crate::errors::*;
}
