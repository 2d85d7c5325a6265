use serde::Serialize;

use super::action::Callback;
use super::views::{MessageHandle, ViewKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, callback: &Callback) -> Self {
        Button {
            text: text.into(),
            callback_data: callback.to_string(),
        }
    }
}

/// Telegram `InlineKeyboardMarkup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Keyboard {
    pub inline_keyboard: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.inline_keyboard.push(buttons);
        self
    }

    pub fn button(self, text: impl Into<String>, callback: &Callback) -> Self {
        self.row(vec![Button::new(text, callback)])
    }

    pub fn is_empty(&self) -> bool {
        self.inline_keyboard.is_empty()
    }
}

/// Rendered message text plus its buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub text: String,
    pub keyboard: Keyboard,
}

impl Screen {
    pub fn new(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Screen {
            text: text.into(),
            keyboard,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Screen::new(text, Keyboard::new())
    }
}

/// One Bot API call produced by dispatching an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Send {
        chat_id: i64,
        screen: Screen,
        /// Remember the sent message as this owner's view.
        track: Option<(i64, ViewKind)>,
    },
    Edit {
        handle: MessageHandle,
        screen: Screen,
    },
    Answer {
        callback_query_id: String,
        text: Option<String>,
        show_alert: bool,
    },
}

impl Outbound {
    pub fn send(chat_id: i64, screen: Screen) -> Self {
        Outbound::Send {
            chat_id,
            screen,
            track: None,
        }
    }

    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Outbound::send(chat_id, Screen::plain(text))
    }

    pub fn tracked(chat_id: i64, screen: Screen, owner: i64, kind: ViewKind) -> Self {
        Outbound::Send {
            chat_id,
            screen,
            track: Some((owner, kind)),
        }
    }

    pub fn edit(handle: MessageHandle, screen: Screen) -> Self {
        Outbound::Edit { handle, screen }
    }

    pub fn answer(callback_query_id: &str, text: impl Into<String>) -> Self {
        Outbound::Answer {
            callback_query_id: callback_query_id.to_string(),
            text: Some(text.into()),
            show_alert: false,
        }
    }

    pub fn alert(callback_query_id: &str, text: impl Into<String>) -> Self {
        Outbound::Answer {
            callback_query_id: callback_query_id.to_string(),
            text: Some(text.into()),
            show_alert: true,
        }
    }

    /// Chat this call targets, if any.
    #[cfg(test)]
    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Outbound::Send { chat_id, .. } => Some(*chat_id),
            Outbound::Edit { handle, .. } => Some(handle.chat_id),
            Outbound::Answer { .. } => None,
        }
    }

    #[cfg(test)]
    pub fn body(&self) -> Option<&str> {
        match self {
            Outbound::Send { screen, .. } | Outbound::Edit { screen, .. } => Some(&screen.text),
            Outbound::Answer { text, .. } => text.as_deref(),
        }
    }
}
