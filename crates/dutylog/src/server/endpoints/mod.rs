pub mod journals;
pub mod status;
