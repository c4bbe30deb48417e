pub mod generate;
pub mod key;
