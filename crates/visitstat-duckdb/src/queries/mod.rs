pub mod listings;
pub mod rollup;
