mod action;
mod client;
mod dispatch;
mod render;
mod reply;
mod update;
mod views;

pub use client::{ChatClient, TelegramClient, deliver_all};
pub use dispatch::handle_update;
pub use update::Update;
pub use views::SessionViews;

#[cfg(test)]
pub use client::testing;
