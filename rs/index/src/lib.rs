pub mod index;
pub mod ivf;
pub mod posting_list;
pub mod utils;
