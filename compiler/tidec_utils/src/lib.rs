pub mod idx;
pub mod index_slice;
pub mod index_vec;
pub mod variadic_log_macros;
