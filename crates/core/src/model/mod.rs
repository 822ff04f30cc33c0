mod femat;

pub use femat::FeMat;
