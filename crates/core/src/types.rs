/// Sparse matrix type. Adjoint designs and sparse cross products are kept
/// column-compressed (CSC).
pub type SparseMat = sprs::CsMat<f64>;
