pub mod client;
pub mod envelope;
pub mod protocol;
pub mod server;
pub mod state;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod test_utils;
