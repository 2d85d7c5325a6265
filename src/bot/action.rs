use std::fmt;
use std::str::FromStr;

use common::{Role, TipResult};
use rust_decimal::Decimal;

/// A text message, decoded once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Balance,
    Tipsters,
    NewTip(String),
    PendingUsers,
    PendingTips,
    Credits,
    /// Anything that is not a slash command. Only meaningful as the
    /// answer to an admin's pending credit prompt.
    Text(String),
}

impl Command {
    /// Returns `None` for unknown slash commands.
    pub fn parse(text: &str) -> Option<Command> {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Some(Command::Text(text.to_string()));
        };

        let (head, payload) = match rest.split_once(char::is_whitespace) {
            Some((head, payload)) => (head, payload.trim()),
            None => (rest, ""),
        };
        // `/cmd@BotName` in group chats.
        let name = head.split('@').next().unwrap_or(head);

        let command = match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "balance" => Command::Balance,
            "tipsters" => Command::Tipsters,
            "newtip" => Command::NewTip(payload.to_string()),
            "pending_users" => Command::PendingUsers,
            "pending_tips" | "tips" => Command::PendingTips,
            "credits" => Command::Credits,
            _ => return None,
        };
        Some(command)
    }
}

/// Inline-button payload, encoded as `NAME[:arg[:arg]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    RequestRole(Role),
    Subscribe(i64),
    Unsubscribe(i64),
    PendingShow(i64),
    PendingBack,
    SetRole { user_id: i64, role: Role },
    Reject(i64),
    TipShow(i64),
    TipsBack,
    CloseTip { tip_id: i64, result: TipResult },
    CreditsUser(i64),
    CreditsAdd(i64),
    CreditsRemove(i64),
    CreditsBack,
    ConfirmBet { tip_id: i64, stake: Decimal },
    SkipBet(i64),
}

impl Callback {
    /// Whether only the configured admin may press this button.
    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Callback::PendingShow(_)
                | Callback::PendingBack
                | Callback::SetRole { .. }
                | Callback::Reject(_)
                | Callback::TipShow(_)
                | Callback::TipsBack
                | Callback::CloseTip { .. }
                | Callback::CreditsUser(_)
                | Callback::CreditsAdd(_)
                | Callback::CreditsRemove(_)
                | Callback::CreditsBack
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("unknown callback `{0}`")]
    Unknown(String),
    #[error("malformed callback `{0}`")]
    Malformed(String),
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::RequestRole(role) => write!(f, "REQ_ROLE:{role}"),
            Callback::Subscribe(id) => write!(f, "SUBSCRIBE:{id}"),
            Callback::Unsubscribe(id) => write!(f, "UNSUBSCRIBE:{id}"),
            Callback::PendingShow(id) => write!(f, "PENDING_SHOW:{id}"),
            Callback::PendingBack => f.write_str("PENDING_BACK"),
            Callback::SetRole { user_id, role } => write!(f, "SET_ROLE:{user_id}:{role}"),
            Callback::Reject(id) => write!(f, "REJECT:{id}"),
            Callback::TipShow(id) => write!(f, "TIP_SHOW:{id}"),
            Callback::TipsBack => f.write_str("TIPS_BACK"),
            Callback::CloseTip { tip_id, result } => write!(f, "CLOSE_TIP:{tip_id}:{result}"),
            Callback::CreditsUser(id) => write!(f, "CREDITS_USER:{id}"),
            Callback::CreditsAdd(id) => write!(f, "CREDITS_ADD:{id}"),
            Callback::CreditsRemove(id) => write!(f, "CREDITS_REMOVE:{id}"),
            Callback::CreditsBack => f.write_str("CREDITS_BACK"),
            Callback::ConfirmBet { tip_id, stake } => {
                write!(f, "CONFIRM_BET:{tip_id}:{}", stake.normalize())
            }
            Callback::SkipBet(id) => write!(f, "SKIP_BET:{id}"),
        }
    }
}

impl FromStr for Callback {
    type Err = CallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CallbackError::Malformed(s.to_string());
        let mut parts = s.split(':');
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let id = |index: usize| -> Result<i64, CallbackError> {
            args.get(index)
                .and_then(|raw| raw.parse::<i64>().ok())
                .filter(|id| *id > 0)
                .ok_or_else(malformed)
        };
        let arity = |expected: usize| -> Result<(), CallbackError> {
            if args.len() == expected {
                Ok(())
            } else {
                Err(malformed())
            }
        };

        let callback = match name {
            "REQ_ROLE" => {
                arity(1)?;
                Callback::RequestRole(args[0].parse().map_err(|_| malformed())?)
            }
            "SUBSCRIBE" => {
                arity(1)?;
                Callback::Subscribe(id(0)?)
            }
            "UNSUBSCRIBE" => {
                arity(1)?;
                Callback::Unsubscribe(id(0)?)
            }
            "PENDING_SHOW" => {
                arity(1)?;
                Callback::PendingShow(id(0)?)
            }
            "PENDING_BACK" => {
                arity(0)?;
                Callback::PendingBack
            }
            "SET_ROLE" => {
                arity(2)?;
                Callback::SetRole {
                    user_id: id(0)?,
                    role: args[1].parse().map_err(|_| malformed())?,
                }
            }
            "REJECT" => {
                arity(1)?;
                Callback::Reject(id(0)?)
            }
            "TIP_SHOW" => {
                arity(1)?;
                Callback::TipShow(id(0)?)
            }
            "TIPS_BACK" => {
                arity(0)?;
                Callback::TipsBack
            }
            "CLOSE_TIP" => {
                arity(2)?;
                Callback::CloseTip {
                    tip_id: id(0)?,
                    result: args[1].parse().map_err(|_| malformed())?,
                }
            }
            "CREDITS_USER" => {
                arity(1)?;
                Callback::CreditsUser(id(0)?)
            }
            "CREDITS_ADD" => {
                arity(1)?;
                Callback::CreditsAdd(id(0)?)
            }
            "CREDITS_REMOVE" => {
                arity(1)?;
                Callback::CreditsRemove(id(0)?)
            }
            "CREDITS_BACK" => {
                arity(0)?;
                Callback::CreditsBack
            }
            "CONFIRM_BET" => {
                arity(2)?;
                Callback::ConfirmBet {
                    tip_id: id(0)?,
                    stake: Decimal::from_str(args[1]).map_err(|_| malformed())?,
                }
            }
            "SKIP_BET" => {
                arity(1)?;
                Callback::SkipBet(id(0)?)
            }
            _ => return Err(CallbackError::Unknown(s.to_string())),
        };
        Ok(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn commands_are_decoded_with_payload_and_bot_suffix() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/credits@FlashTipBot"), Some(Command::Credits));
        assert_eq!(
            Command::parse("/newtip AB12CD3 2.10 100"),
            Some(Command::NewTip("AB12CD3 2.10 100".to_string()))
        );
        assert_eq!(Command::parse("/newtip"), Some(Command::NewTip(String::new())));
        assert_eq!(Command::parse(" 500 "), Some(Command::Text("500".to_string())));
        assert_eq!(Command::parse("/launch"), None);
    }

    #[test]
    fn callbacks_decode_what_they_encode() {
        let samples = [
            Callback::RequestRole(Role::Tipster),
            Callback::SetRole {
                user_id: 4,
                role: Role::User,
            },
            Callback::CloseTip {
                tip_id: 9,
                result: TipResult::Lose,
            },
            Callback::ConfirmBet {
                tip_id: 12,
                stake: dec!(10.50),
            },
            Callback::CreditsBack,
        ];
        for callback in samples {
            let encoded = callback.to_string();
            assert!(encoded.len() <= 64, "{encoded}");
            assert_eq!(encoded.parse::<Callback>().unwrap(), callback);
        }
        assert_eq!(
            Callback::ConfirmBet {
                tip_id: 12,
                stake: dec!(10.00)
            }
            .to_string(),
            "CONFIRM_BET:12:10"
        );
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(matches!(
            "CLOSE_TIP:5:DRAW".parse::<Callback>(),
            Err(CallbackError::Malformed(_))
        ));
        assert!(matches!(
            "CLOSE_TIP:0:WIN".parse::<Callback>(),
            Err(CallbackError::Malformed(_))
        ));
        assert!(matches!(
            "SUBSCRIBE:abc".parse::<Callback>(),
            Err(CallbackError::Malformed(_))
        ));
        assert!(matches!(
            "PENDING_BACK:1".parse::<Callback>(),
            Err(CallbackError::Malformed(_))
        ));
        assert!(matches!(
            "APPROVE:1".parse::<Callback>(),
            Err(CallbackError::Unknown(_))
        ));
    }
}
