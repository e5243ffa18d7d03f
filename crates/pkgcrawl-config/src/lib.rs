pub mod annotations;
pub mod channel;
pub mod config;
pub mod error;
pub mod secrets;
pub mod settings;

#[cfg(test)]
pub mod test_utils;
