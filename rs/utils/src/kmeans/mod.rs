pub mod kmeans;
pub mod lloyd;
