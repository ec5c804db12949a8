pub mod builder;
pub mod index;
pub mod ivfpq;
pub mod rii;
pub mod search;
