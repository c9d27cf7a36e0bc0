mod core;
mod models;

pub use self::core::{
    BoxedChatModel, ChatGateway, ChatGatewayBuilder, ChatModel, validate_user_text,
};
pub use self::models::Transcript;

#[cfg(test)]
pub(crate) use self::core::tests::FakeModel;
