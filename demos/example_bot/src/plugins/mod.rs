mod example;
mod webhook;

pub use example::ExamplePlugin;
pub use webhook::WebhookExample;
