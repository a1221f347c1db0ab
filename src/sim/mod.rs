pub mod clock;
pub mod config;
pub mod top;
pub mod trace;

#[cfg(test)]
mod tests;
