pub mod blocked;
pub mod dense;
pub mod sparse;
pub mod storage;

pub use blocked::{BlockedSparse, UniformBlockDiagonal};
pub use sparse::TripletBuilder;
pub use storage::BlockMatrix;
