pub mod api;
pub mod jobs;
pub mod messages;
pub mod store;

#[cfg(test)]
mod testing;
