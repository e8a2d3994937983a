pub mod fir_store;
pub mod session_store;
