pub mod sim;
pub mod solve;
