pub mod cleanup;
pub mod deploy;
pub mod endpoint;
pub mod status;
