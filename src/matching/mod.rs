//! Feature matching and pose optimization (pipeline stages E-F).

pub mod kdtree;
pub mod matcher;
pub mod optimizer;
pub mod pca;
pub mod residual;

pub use kdtree::PointIndex;
pub use matcher::{MatchContext, MotionMode, RegistrationTarget};
pub use optimizer::{register, RegistrationOutcome};
pub use pca::NeighborhoodPca;
pub use residual::ResidualBlock;
