pub mod codebook;
pub mod distance_table;
pub mod generic;
pub mod pq;
pub mod pq_builder;
pub mod pqkmeans;
pub mod quantization;
