pub mod engine;
pub mod message;
pub mod subscription;

pub use engine::Broker;
pub use message::Message;
pub use subscription::Subscription;

#[cfg(test)]
mod tests;
