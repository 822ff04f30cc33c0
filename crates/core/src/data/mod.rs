mod factor;

pub use factor::GroupingFactor;
