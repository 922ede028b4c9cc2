pub mod decisions;
pub mod goals;
pub mod simulate;
