pub mod dispatcher;
pub mod gateway;
pub mod timer;

pub use dispatcher::Dispatcher;
pub use gateway::{GatewayError, NotificationGateway, SendOutcome, WebhookGateway};
