pub mod sample_catalog;

pub use sample_catalog::seed_sample_data;
